//! Metrics collection and exposition.
//!
//! # Metrics
//! - `forwarder_requests_total` (counter): requests by route, method, status
//! - `forwarder_request_duration_seconds` (histogram): latency by route
//! - `forwarder_upstream_errors_total` (counter): pipeline failures by route, kind

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished request.
pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "forwarder_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("forwarder_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a pipeline failure (`method_not_allowed`, `timeout`, `transform`, ...).
pub fn record_error(route: &str, kind: &'static str) {
    metrics::counter!(
        "forwarder_upstream_errors_total",
        "route" => route.to_string(),
        "kind" => kind
    )
    .increment(1);
}
