//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_auth_total` (counter): authentication attempts by strategy, outcome
//! - `gateway_rate_limited_total` (counter): requests rejected by a rate limiter
//! - `gateway_errors_total` (counter): error responses by status
//! - `gateway_pow_total` (counter): proof-of-work submissions by outcome
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_auth(strategy: &str, outcome: &'static str) {
    ::metrics::counter!(
        "gateway_auth_total",
        "strategy" => strategy.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_error(status: u16) {
    ::metrics::counter!("gateway_errors_total", "status" => status.to_string()).increment(1);
}

pub fn record_pow(outcome: &'static str) {
    ::metrics::counter!("gateway_pow_total", "outcome" => outcome).increment(1);
}
