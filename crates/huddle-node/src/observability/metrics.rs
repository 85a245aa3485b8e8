//! Prometheus metrics collection.
//!
//! Provides metrics for:
//! - HTTP request latency and counts
//! - WebSocket sessions and how they ended
//! - Relay throughput and drops
//! - Current rooms and clients, refreshed from the hub at scrape time

use huddle_hub::{HubStats, SessionSummary};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path pattern
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Session labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SessionLabels {
    /// Why the session ended.
    pub reason: String,
}

/// Global metrics state.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// HTTP requests in flight.
    pub http_active_connections: Gauge,
    /// Open WebSocket connections.
    pub websocket_connections: Gauge,
    /// Failed WebSocket upgrades.
    pub websocket_upgrade_failures: Counter,
    /// Rooms created through the API.
    pub rooms_created: Counter,
    /// Ended sessions by close reason.
    pub sessions_ended: Family<SessionLabels, Counter>,
    /// Messages read from clients.
    pub messages_received: Counter,
    /// Per-recipient deliveries dropped on full queues.
    pub messages_dropped: Counter,
    /// Registered rooms.
    pub rooms_active: Gauge,
    /// Clients joined to a room.
    pub clients_active: Gauge,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // HTTP metrics
        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "huddle_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "huddle_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_active_connections = Gauge::default();
        registry.register(
            "huddle_http_active_connections",
            "Number of HTTP requests in flight",
            http_active_connections.clone(),
        );

        // WebSocket metrics
        let websocket_connections = Gauge::default();
        registry.register(
            "huddle_websocket_connections",
            "Active WebSocket connections",
            websocket_connections.clone(),
        );

        let websocket_upgrade_failures = Counter::default();
        registry.register(
            "huddle_websocket_upgrade_failures",
            "Failed WebSocket upgrades",
            websocket_upgrade_failures.clone(),
        );

        // Relay metrics
        let rooms_created = Counter::default();
        registry.register(
            "huddle_rooms_created",
            "Rooms created",
            rooms_created.clone(),
        );

        let sessions_ended = Family::<SessionLabels, Counter>::default();
        registry.register(
            "huddle_sessions_ended",
            "Client sessions ended, by reason",
            sessions_ended.clone(),
        );

        let messages_received = Counter::default();
        registry.register(
            "huddle_messages_received",
            "Messages read from clients",
            messages_received.clone(),
        );

        let messages_dropped = Counter::default();
        registry.register(
            "huddle_messages_dropped",
            "Deliveries dropped because a recipient queue was full",
            messages_dropped.clone(),
        );

        let rooms_active = Gauge::default();
        registry.register("huddle_rooms", "Registered rooms", rooms_active.clone());

        let clients_active = Gauge::default();
        registry.register(
            "huddle_clients",
            "Clients joined to a room",
            clients_active.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_active_connections,
            websocket_connections,
            websocket_upgrade_failures,
            rooms_created,
            sessions_ended,
            messages_received,
            messages_dropped,
            rooms_active,
            clients_active,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a finished client session.
    pub fn record_session(&self, summary: &SessionSummary) {
        let labels = SessionLabels {
            reason: summary.reason.as_str().to_string(),
        };
        self.sessions_ended.get_or_create(&labels).inc();
        self.messages_received.inc_by(summary.received);
        self.messages_dropped.inc_by(summary.dropped);
    }

    /// Copy current hub gauges.
    pub fn refresh_hub(&self, stats: &HubStats) {
        self.rooms_active.set(stats.current_rooms as i64);
        self.clients_active.set(stats.current_clients as i64);
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &registry) {
            tracing::error!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

/// Normalize path for metrics (replace room ids).
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    let normalized: Vec<&str> = parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if part.is_empty() {
                return *part;
            }
            if is_dynamic_segment(i, &parts) {
                ":id"
            } else {
                *part
            }
        })
        .collect();
    normalized.join("/")
}

/// A segment directly after `/room` or `/ws` is a room id.
fn is_dynamic_segment(index: usize, parts: &[&str]) -> bool {
    index >= 1
        && parts
            .get(index - 1)
            .is_some_and(|parent| *parent == "room" || *parent == "ws")
}
