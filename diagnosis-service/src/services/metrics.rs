//! Metrics collection and Prometheus export.
//!
//! Initializes the metrics exporter, serves the /metrics payload and offers
//! helpers for the diagnosis-specific series.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Safe to call more than once; only the first call installs a recorder.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            tracing::info!("Prometheus metrics initialized");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
        }
    }
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record a completed diagnosis by generation outcome.
pub fn record_diagnosis(outcome: &str) {
    counter!("diagnosis_requests_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record latency of one outbound provider call.
pub fn record_provider_latency(provider: &str, operation: &'static str, duration_secs: f64) {
    histogram!(
        "provider_latency_seconds",
        "provider" => provider.to_string(),
        "operation" => operation
    )
    .record(duration_secs);
}

/// Record a provider error.
pub fn record_provider_error(provider: &str, error_type: &'static str) {
    counter!(
        "provider_errors_total",
        "provider" => provider.to_string(),
        "error_type" => error_type
    )
    .increment(1);
}

/// Record an entity extraction that degraded to an empty set.
pub fn record_extraction_failure() {
    counter!("disease_extraction_failures_total").increment(1);
}

/// Record the result of one record append.
pub fn record_persistence(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("records_persisted_total", "result" => result).increment(1);
}
