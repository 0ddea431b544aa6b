//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): total requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): admissions rejected, by reason
//! - `gateway_auth_failures_total` (counter): token verifications failed
//! - `gateway_rate_limit_buckets` (gauge): live bucket count
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Prometheus exposition on a dedicated listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
}

/// Record one rejected admission.
pub fn record_rate_limited(reason: &'static str) {
    metrics::counter!("gateway_rate_limited_total", "reason" => reason).increment(1);
}

/// Record one failed token verification.
pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}

/// Record the current number of live rate-limit buckets.
pub fn record_bucket_count(count: usize) {
    metrics::gauge!("gateway_rate_limit_buckets").set(count as f64);
}
