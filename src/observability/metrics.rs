//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route kind and status
//! - `gateway_request_duration_seconds` (histogram): latency by route kind
//! - `gateway_clusters` (gauge): configured clusters by origin
//! - `gateway_reconciliations_total` (counter): kubeconfig reload outcomes
//! - `gateway_external_proxy_rejected_total` (counter): allow-list rejections

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    metrics::counter!("gateway_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_clusters(origin: &'static str, count: usize) {
    metrics::gauge!("gateway_clusters", "origin" => origin).set(count as f64);
}

pub fn record_reconciliation(result: &'static str) {
    metrics::counter!("gateway_reconciliations_total", "result" => result).increment(1);
}

pub fn record_external_proxy_rejected() {
    metrics::counter!("gateway_external_proxy_rejected_total").increment(1);
}
