//! MCP server binary entry point.

use anyhow::{Context, Result};
use dbproxy_mcp::{
    config::{LoggingConfig, ProxyConfig},
    protocol::McpServer,
    server::{McpHandler, ServerState},
};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::builder()
        .from_env()?
        .build()
        .context("Invalid proxy configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let state = Arc::new(
        ServerState::builder()
            .config(config)
            .build()
            .context("Failed to initialize server state")?,
    );
    info!("Server state initialized with {} tools", state.tools.len());

    let name = state.config.name.to_string();
    McpServer::new(name, McpHandler::new(Arc::clone(&state)))
        .run()
        .await?;

    state.current.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// JSON logs to stderr (stdout carries the protocol) plus an optional daily file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("dbproxy_mcp={},warn", config.level)))
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .with_filter(filter());

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "dbproxy-mcp.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
