//! Standalone REST server
//!
//! Serves the API with the built-in driver and no config file. `PORT` and
//! `HOST` override the listen address.

use senserecord_core::DefaultDriver;
use senserecord_server::{AppState, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(
                    "senserecord=info"
                        .parse()
                        .unwrap_or_else(|_| LevelFilter::INFO.into()),
                ),
        )
        .init();

    let defaults = ServerConfig::default();
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults.port);
    let bind_addr = std::env::var("HOST").unwrap_or(defaults.bind_addr);

    let config = ServerConfig { port, bind_addr };
    let state = AppState::with_driver(Arc::new(DefaultDriver), config);

    tracing::info!(port, version = senserecord_core::VERSION, "API server starting");

    if let Err(e) = senserecord_server::start_server(state).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
