//! HTTP and WebSocket handlers for the Rendezvous server.
//!
//! Upgraded sockets are split into reader and writer halves and handed to
//! the core session loop; everything after the upgrade happens there.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, Metered};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rendezvous_core::{Hub, HubHandle};
use rendezvous_protocol::EnvelopeCodec;
use rendezvous_transport::ws;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Plain-text response for `GET /`.
pub const BANNER: &str = "WebRTC Signaling Server";

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Shared server state.
pub struct AppState {
    /// Handle to the running hub.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Config,
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state around a running hub.
    #[must_use]
    pub fn new(config: Config, hub: HubHandle) -> Self {
        Self {
            hub,
            config,
            connections: AtomicUsize::new(0),
        }
    }

    /// Get the number of open WebSocket connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    fn acquire_slot(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.limits.max_connections;
        let previous = self.connections.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            self.connections.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(ConnectionSlot(Arc::clone(self)))
    }
}

/// One unit of the connection cap, released on drop.
struct ConnectionSlot(Arc<AppState>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route("/", get(banner_handler))
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve the router on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let hub = Hub::spawn(config.hub_config());

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
        metrics::spawn_hub_sampler(hub.clone(), SAMPLE_INTERVAL);
    }

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Rendezvous server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config, hub))).await
}

/// Banner handler.
async fn banner_handler() -> &'static str {
    BANNER
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": stats.session_count,
            "rooms": stats.room_count,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unavailable",
                    "version": env!("CARGO_PKG_VERSION"),
                })),
            )
                .into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(slot) = state.acquire_slot() else {
        warn!(remote = %remote, "Connection limit reached, rejecting");
        metrics::record_rejection();
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let max_size = state.config.limits.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let _metrics_guard = ConnectionMetricsGuard::new();

            let (reader, writer) =
                ws::split(socket, EnvelopeCodec::new(max_size), Some(remote.to_string()));
            let id = rendezvous_core::serve(Metered(reader), Metered(writer), state.hub.clone())
                .await;

            debug!(session = %id, remote = %remote, "WebSocket disconnected");
        })
}
