use log::{error, info};
use relay::Manager;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting notification relay [{}] on {}",
        config.runtime_env(),
        config.bind_address()
    );

    // One registry and delivery engine for the life of the process
    let relay = Arc::new(Manager::new());
    let app_state = AppState::new(config, &relay);

    if let Err(e) = web::init_server(app_state).await {
        error!("Notification relay stopped: {e}");
        std::process::exit(1);
    }

    info!("Notification relay shut down");
}
