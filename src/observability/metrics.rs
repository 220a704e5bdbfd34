//! Metrics collection and exposition.
//!
//! # Metrics
//! - `feed_requests_total` (counter): requests by resource and status
//! - `feed_request_duration_seconds` (histogram): dispatch latency by resource
//! - `feed_packages_published_total` (counter): accepted packages
//! - `feed_cache_hits_total` / `feed_cache_misses_total` (counters)
//!
//! # Design Decisions
//! - `resource` is the name of the handler that claimed the request, `none` if unmatched
//! - Labels kept to resource and status code (bounded cardinality)
//! - Exporter is optional; without it every call is a no-op

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one dispatched request.
pub fn record_request(resource: &'static str, status: u16, start: Instant) {
    metrics::counter!("feed_requests_total", "resource" => resource, "status" => status.to_string()).increment(1);
    metrics::histogram!("feed_request_duration_seconds", "resource" => resource)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_publish() {
    metrics::counter!("feed_packages_published_total").increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        metrics::counter!("feed_cache_hits_total").increment(1);
    } else {
        metrics::counter!("feed_cache_misses_total").increment(1);
    }
}
