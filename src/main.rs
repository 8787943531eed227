//! TweekIT MCP Server - Entry point
//!
//! Serves the TweekIT conversion tools over stdio.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tweekit_mcp::run_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the MCP protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tweekit_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting TweekIT MCP Server");

    run_server().await
}
