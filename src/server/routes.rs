//! Router assembly: health check, the `/ws` upgrade endpoint, and the
//! shared state every connection handler closes over.

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::registry::Registry;

use super::logging::log_requests;
use super::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

pub fn build_router(registry: Arc<Registry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(AppState { registry })
}

async fn health() -> &'static str {
    "ok"
}
