//! # Ferry Server
//!
//! Serves a Ferry application: server-rendered pages, cross-realm module
//! stubs and the live channel for hot reloading.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings in the app directory
//! ferry
//!
//! # Run with environment overrides
//! FERRY_PORT=8080 FERRY_APP__PAGES_DIR=pages ferry
//! ```

mod app;
mod config;
mod exports;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Ferry server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
