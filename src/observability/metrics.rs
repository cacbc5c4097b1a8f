//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by method, status
//! - `bridge_request_duration_seconds` (histogram): latency distribution
//! - `bridge_spooled_bytes_total` (counter): multipart bytes written to disk
//! - `bridge_spool_cleanups_total` (counter): temp files removed
//! - `bridge_ingest_rejections_total` (counter): bodies refused, by reason
//! - `bridge_dispatch_errors_total` (counter): application failures by status
//! - `bridge_memory_bytes` (gauge): last supervisor sample, by kind
//! - `bridge_memory_reclaims_total` (counter): advisory reclaim runs

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    metrics::counter!("bridge_requests_total", &labels).increment(1);
    metrics::histogram!("bridge_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_spooled(bytes: u64) {
    metrics::counter!("bridge_spooled_bytes_total").increment(bytes);
}

pub fn record_spool_cleanup() {
    metrics::counter!("bridge_spool_cleanups_total").increment(1);
}

pub fn record_ingest_rejection(reason: &'static str) {
    metrics::counter!("bridge_ingest_rejections_total", "reason" => reason).increment(1);
}

pub fn record_dispatch_error(status: u16) {
    metrics::counter!("bridge_dispatch_errors_total", "status" => status.to_string()).increment(1);
}

pub fn record_memory(kind: &'static str, bytes: u64) {
    metrics::gauge!("bridge_memory_bytes", "kind" => kind).set(bytes as f64);
}

pub fn record_reclaim() {
    metrics::counter!("bridge_memory_reclaims_total").increment(1);
}
