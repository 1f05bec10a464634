use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use writeflow_core::observability::{ObservabilityConfig, init_observability};
use writeflow_server::{AppState, ServerConfig, build_app, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    let config = ServerConfig::parse();
    init_observability(&ObservabilityConfig::from_env().diagnostics(config.diagnostics));

    let state = AppState::from_config(&config).context("failed to configure writeflow")?;
    let app = build_app(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(event = "server.listening", domain = "http", addr = %config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!(event = "server.stopped", domain = "http");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
