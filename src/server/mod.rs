// src/server/mod.rs

//! HTTP surface for the UI layer.

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::{info, warn};

use crate::engine::Orchestrator;

pub use api::{api_router, AppState, SharedState};

/// Build the full application router.
pub fn build_router(orchestrator: Orchestrator) -> Router {
    let state = Arc::new(AppState { orchestrator });
    api_router().with_state(state)
}

/// Serve the API until Ctrl-C.
pub async fn start_server(orchestrator: Orchestrator, bind: &str) -> Result<()> {
    let app = build_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "runctl API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested; running phase processes will be killed");
}
