//! Metrics collection and exposition.
//!
//! # Metrics
//! - `header_hooks_requests_total` (counter): requests by protocol, status
//! - `header_hooks_request_duration_seconds` (histogram): handler latency
//! - `header_hooks_processors_created_total` (counter): processors by kind
//! - `header_hooks_active_connections` (gauge): current connection count
//! - `header_hooks_rejected_requests_total` (counter): heads rejected by reason
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a completed request and record how long the handler took.
pub fn record_request(protocol: &'static str, status: u16, start: Instant) {
    counter!(
        "header_hooks_requests_total",
        "protocol" => protocol,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("header_hooks_request_duration_seconds", "protocol" => protocol)
        .record(start.elapsed().as_secs_f64());
}

/// Count one processor built by a factory. `kind` is `header` or `request`.
pub fn record_processor_created(kind: &'static str) {
    counter!("header_hooks_processors_created_total", "kind" => kind).increment(1);
}

/// Count a request answered with an error status before reaching the router.
pub fn record_rejected(reason: &'static str) {
    counter!("header_hooks_rejected_requests_total", "reason" => reason).increment(1);
}

/// Increment the active connection gauge.
pub fn connection_opened() {
    gauge!("header_hooks_active_connections").increment(1.0);
}

/// Decrement the active connection gauge.
pub fn connection_closed() {
    gauge!("header_hooks_active_connections").decrement(1.0);
}
