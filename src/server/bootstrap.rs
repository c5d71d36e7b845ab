//! Process bootstrap: builds the registry and router, then serves until a
//! shutdown signal arrives.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Timing;
use crate::registry::Registry;

use super::routes::build_router;

const LOG_TARGET: &str = "server::bootstrap";

pub struct ServerConfig {
    pub bind: String,
    pub timing: Timing,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let registry = Registry::new(config.timing);
    let router = build_router(registry);

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(target = LOG_TARGET, %local_addr, "okey101 server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = LOG_TARGET, error = %err, "failed to install ctrl-c handler");
    }
    info!(target = LOG_TARGET, "shutdown signal received");
}
