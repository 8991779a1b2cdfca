//! Metrics collection and export for Rendezvous.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use async_trait::async_trait;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use rendezvous_core::HubHandle;
use rendezvous_protocol::Envelope;
use rendezvous_transport::{SignalReader, SignalWriter, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "rendezvous_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "rendezvous_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "rendezvous_connections_rejected_total";
    pub const MESSAGES_TOTAL: &str = "rendezvous_messages_total";
    pub const SESSIONS_ACTIVE: &str = "rendezvous_sessions_active";
    pub const ROOMS_ACTIVE: &str = "rendezvous_rooms_active";
    pub const DELIVERED_TOTAL: &str = "rendezvous_delivered_total";
    pub const ROUTES_DROPPED_TOTAL: &str = "rendezvous_routes_dropped_total";
    pub const OUTBOUND_DROPS_TOTAL: &str = "rendezvous_outbound_drops_total";
    pub const ERRORS_TOTAL: &str = "rendezvous_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused because the server was full"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Envelopes read or written, by kind");
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Sessions currently in a room");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of non-empty rooms");
    metrics::describe_counter!(
        names::DELIVERED_TOTAL,
        "Envelopes handed to session outbound queues"
    );
    metrics::describe_counter!(
        names::ROUTES_DROPPED_TOTAL,
        "Relayed messages with no matching recipient or room"
    );
    metrics::describe_counter!(
        names::OUTBOUND_DROPS_TOTAL,
        "Envelopes dropped because a session's outbound queue was full"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a refused connection.
pub fn record_rejection() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Record an envelope.
pub fn record_message(kind: &'static str, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "kind" => kind, "direction" => direction).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Periodically copy hub statistics into gauges and counters.
///
/// Stops when the hub does.
pub fn spawn_hub_sampler(hub: HubHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let Ok(stats) = hub.stats().await else {
                debug!("Hub stopped, ending metrics sampler");
                break;
            };

            gauge!(names::SESSIONS_ACTIVE).set(stats.session_count as f64);
            gauge!(names::ROOMS_ACTIVE).set(stats.room_count as f64);
            counter!(names::DELIVERED_TOTAL).absolute(stats.delivered);
            counter!(names::ROUTES_DROPPED_TOTAL).absolute(stats.dropped_routes);
            counter!(names::OUTBOUND_DROPS_TOTAL).absolute(stats.outbound_drops);
        }
    })
}

/// Transport half wrapper that counts envelopes as they pass.
pub struct Metered<T>(pub T);

#[async_trait]
impl<T: SignalReader> SignalReader for Metered<T> {
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        let result = self.0.recv().await;
        match &result {
            Ok(Some(envelope)) => record_message(envelope.kind().as_str(), "inbound"),
            Ok(None) => {}
            Err(e) if e.is_recoverable() => record_error("malformed"),
            Err(_) => record_error("transport"),
        }
        result
    }

    fn remote_addr(&self) -> Option<String> {
        self.0.remote_addr()
    }
}

#[async_trait]
impl<T: SignalWriter> SignalWriter for Metered<T> {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let kind = envelope.kind().as_str();
        self.0.send(envelope).await?;
        record_message(kind, "outbound");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await
    }

    fn is_open(&self) -> bool {
        self.0.is_open()
    }
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
