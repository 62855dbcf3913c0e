//! Sense Record Web Server - Axum REST API
//!
//! Exposes the recording lifecycle of every catalog board over HTTP. The
//! server owns one [`SessionRegistry`] so a board started by one request can
//! be stopped by a later one.

pub mod api;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use senserecord_core::config::ServerSection;
use senserecord_core::{DeviceDriver, SessionRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions, one per board
    pub registry: Arc<SessionRegistry>,
    /// Server configuration
    pub config: ServerConfig,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_addr: "127.0.0.1".to_string(),
        }
    }
}

impl From<&ServerSection> for ServerConfig {
    fn from(section: &ServerSection) -> Self {
        Self {
            port: section.port,
            bind_addr: section.host.clone(),
        }
    }
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, config: ServerConfig) -> Self {
        Self { registry, config }
    }

    /// State with a fresh registry over `driver`
    pub fn with_driver(driver: Arc<dyn DeviceDriver>, config: ServerConfig) -> Self {
        Self::new(Arc::new(SessionRegistry::new(driver)), config)
    }
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/boards", get(api::list_boards))
        .route("/api/v1/sessions", get(api::list_sessions))
        .route("/api/v1/status/{board}", get(api::board_status))
        .route("/api/v1/start/{board}", post(api::start_recording))
        .route("/api/v1/stop/{board}", post(api::stop_recording))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Serve on an already bound listener until the process is interrupted
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let registry = Arc::clone(&state.registry);
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the last registry handle stops any recording still running
    let active = registry.identities();
    if !active.is_empty() {
        tracing::warn!(boards = ?active, "Shutting down with tracked sessions");
    }
    Ok(())
}

/// Start the web server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Sense Record API listening");
    serve(listener, state).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
