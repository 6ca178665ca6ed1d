//! HTTP and WebSocket surface of the notification relay.
//!
//! [`attach`] wires the relay onto an already-bound listener; [`init_server`]
//! binds one from the configuration first. Neither owns any state beyond the
//! router: the registry and delivery engine come in through [`AppState`].

use log::*;
use std::future::Future;
use tokio::net::TcpListener;

pub use service::AppState;

mod controller;
pub mod error;
pub mod router;
pub mod ws;

use error::Result;

/// Bind the configured interface and port, then serve until Ctrl-C or SIGTERM.
pub async fn init_server(app_state: AppState) -> Result<()> {
    let address = app_state.config.bind_address();
    let listener = TcpListener::bind(&address).await?;

    info!(
        "Notification relay listening on {address} (WebSocket path {})",
        app_state.config.ws_path()
    );

    attach(listener, app_state, shutdown_signal()).await
}

/// Attach the relay's routes to `listener` and serve until `shutdown`
/// resolves. Live connections are closed before the server drains.
pub async fn attach<F>(listener: TcpListener, app_state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let relay = app_state.relay.clone();
    let router = router::define_routes(app_state)?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, closing live connections");
            relay.shutdown();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
