//! Prometheus metrics for the wallet server.
//!
//! Metrics are recorded through the `metrics` facade and exported in
//! Prometheus text format by a dedicated listener. Without an installed
//! exporter every call here is a no-op.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and durations by route
//! - **Payment Metrics**: Deposits created, charge results, webhook outcomes
//! - **Ledger Metrics**: Transfers and withdrawals
//! - **Alert Metrics**: Alerts raised by kind and severity
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use perlas_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/payments/card", 200);
//! metrics::webhook_outcomes_total("duplicate");
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use perlas_wallet::monitoring::{Alert, AlertSink};
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Payment Metrics
// ============================================================================

/// Increment deposits created, by payment method.
pub fn deposits_created_total(method: &str) {
    metrics::counter!("deposits_created_total", "method" => method.to_string()).increment(1);
}

/// Increment charge attempts, by payment method and whether the gateway accepted it.
pub fn charges_total(method: &str, success: bool) {
    metrics::counter!("charges_total",
        "method" => method.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment webhook deliveries, by outcome label.
pub fn webhook_outcomes_total(outcome: &str) {
    metrics::counter!("webhook_outcomes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Increment deposit approvals, by trigger.
pub fn deposits_approved_total(trigger: &str) {
    metrics::counter!("deposits_approved_total", "trigger" => trigger.to_string()).increment(1);
}

// ============================================================================
// Ledger Metrics
// ============================================================================

/// Increment ledger entries posted through the API, by direction.
pub fn ledger_entries_total(direction: &str) {
    metrics::counter!("ledger_entries_total", "direction" => direction.to_string()).increment(1);
}

/// Increment withdrawal requests.
pub fn withdrawals_requested_total() {
    metrics::counter!("withdrawals_requested_total").increment(1);
}

// ============================================================================
// Alert Metrics
// ============================================================================

/// Increment alerts raised, by kind and severity.
pub fn alerts_raised_total(kind: &str, severity: &str) {
    metrics::counter!("alerts_raised_total",
        "kind" => kind.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

/// Alert sink that counts alerts; combine with a logging sink via
/// [`perlas_wallet::monitoring::FanOutAlertSink`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsAlertSink;

impl AlertSink for MetricsAlertSink {
    fn raise(&self, alert: &Alert) {
        alerts_raised_total(&alert.kind.to_string(), &alert.severity.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_a_no_op() {
        http_requests_total("GET", "/health", 200);
        http_request_duration_ms("GET", "/health", 1.5);
        webhook_outcomes_total("updated");
        charges_total("CARD", false);
    }
}
