//! Consequences host binary
//!
//! Usage: `consequences [CONFIG_DIR]` (defaults to the current directory)

use std::path::PathBuf;

use anyhow::{Context, Result};
use cq_config::ConsequencesConfig;
use cq_server::Consequences;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = ConsequencesConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {:?}", config_dir))?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .context("invalid log_level")?,
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!(config_dir = ?config_dir, "Starting Consequences");

    let host = Consequences::new(config);
    host.start().await?;

    let mut passes = host.automations().subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match passes.recv().await {
                Ok(pass) if pass.report.is_clean() => {
                    debug!(listener_id = %pass.listener_id, "Automation pass finished");
                }
                Ok(pass) => {
                    for failure in &pass.report.failures {
                        warn!(listener_id = %pass.listener_id, "{}", failure);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Automation reports lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    host.shutdown();
    reporter.abort();

    Ok(())
}
