//! # Cadence Server
//!
//! Shared focus-timer session broker.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! cadence
//!
//! # Run with custom config
//! cadence  # reads cadence.toml when present
//!
//! # Run with environment variables
//! PORT=8080 HOST=0.0.0.0 CLEANUP_INTERVAL=60000 cadence
//! ```

mod broker;
mod config;
mod http;
mod metrics;
mod ws;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::load()?;

    if config.log.enabled {
        let default_filter = match config.log.level.as_deref() {
            Some(level) => level.to_string(),
            None if config.is_production() => {
                "cadence_server=info,cadence_core=info,cadence_protocol=info".to_string()
            }
            None => "cadence_server=debug,cadence_core=debug,cadence_protocol=debug".to_string(),
        };
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_filter)),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        "Starting Cadence broker on {}:{} ({})",
        config.host,
        config.port,
        config.environment
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    http::run_server(config).await?;

    Ok(())
}
