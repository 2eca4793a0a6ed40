//! # Beacon Server
//!
//! Realtime presence and room fan-out server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! beacon
//!
//! # Config is read from ./beacon.toml, /etc/beacon/beacon.toml or
//! # ~/.config/beacon/beacon.toml
//!
//! # Run with environment overrides
//! BEACON_PORT=8080 BEACON_HOST=0.0.0.0 beacon
//! ```

use anyhow::Result;
use beacon_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| beacon_server::DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Beacon server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
