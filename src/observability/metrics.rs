//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hybrid_requests_total` (counter): requests by dispatch, status
//! - `hybrid_request_duration_seconds` (histogram): latency by dispatch
//! - `hybrid_isr_cache_total` (counter): cache lookups by result
//!   (hit, disk, miss, bypass)
//! - `hybrid_isr_cache_bytes` (gauge): bytes held in the memory cache
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! deployments without the exporter pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Record one served request.
pub fn record_request(dispatch: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "hybrid_requests_total",
        "dispatch" => dispatch,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("hybrid_request_duration_seconds", "dispatch" => dispatch)
        .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of an ISR cache lookup.
pub fn record_isr(result: &'static str) {
    ::metrics::counter!("hybrid_isr_cache_total", "result" => result).increment(1);
}

/// Current size of the ISR memory cache.
pub fn record_isr_bytes(bytes: u64) {
    ::metrics::gauge!("hybrid_isr_cache_bytes").set(bytes as f64);
}
