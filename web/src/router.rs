use crate::controller::health_check_controller;
use crate::error::Result;
use crate::ws::handler::ws_handler;
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use service::AppState;
use tower_http::cors::CorsLayer;

pub fn define_routes(app_state: AppState) -> Result<Router> {
    let cors = cors_layer(&app_state.config.allowed_origins)?;

    Ok(Router::new()
        .merge(health_routes())
        .merge(ws_routes(app_state))
        .layer(cors))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn ws_routes(app_state: AppState) -> Router {
    let path = app_state.config.ws_path();
    Router::new()
        .route(&path, get(ws_handler))
        .with_state(app_state)
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_credentials(true))
}
