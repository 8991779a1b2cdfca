//! # Rendezvous Server
//!
//! WebRTC signaling relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! rendezvous
//!
//! # Run with a config file (rendezvous.toml in the working directory,
//! # /etc/rendezvous/ or ~/.config/rendezvous/)
//! rendezvous
//!
//! # Run with environment variables
//! RENDEZVOUS_PORT=8080 RENDEZVOUS_HOST=0.0.0.0 rendezvous
//! ```

use anyhow::Result;
use rendezvous_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rendezvous_server=debug,rendezvous_core=debug,rendezvous_transport=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Starting Rendezvous server on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
