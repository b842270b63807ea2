//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, protocol errors, connections)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Track resolution cache effectiveness
//!
//! # Metrics
//! - `app_router_requests_total` (counter): requests by method, status, application
//! - `app_router_request_duration_seconds` (histogram): dispatch latency
//! - `app_router_protocol_errors_total` (counter): rejected request heads
//! - `app_router_handler_failures_total` (counter): component errors and panics
//! - `app_router_active_connections` (gauge): connections currently open
//! - `app_router_cache_lookups_total` (counter): cache hits/misses by level
//!
//! # Design Decisions
//! - Without an installed recorder every call is a no-op
//! - Labels are low-cardinality (context path, not request path)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a dispatched request.
pub fn record_request(method: &str, status: u16, app: &str, start: Instant) {
    counter!(
        "app_router_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "app" => app.to_string()
    )
    .increment(1);
    histogram!("app_router_request_duration_seconds", "app" => app.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_protocol_error() {
    counter!("app_router_protocol_errors_total").increment(1);
}

pub fn record_handler_failure(app: &str) {
    counter!("app_router_handler_failures_total", "app" => app.to_string()).increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("app_router_active_connections").set(count as f64);
}

/// `level` is `"server"` for application lookup, `"app"` for servlet lookup.
pub fn record_cache_lookup(level: &'static str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!("app_router_cache_lookups_total", "level" => level, "outcome" => outcome).increment(1);
}
