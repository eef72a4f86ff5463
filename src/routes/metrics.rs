//! Prometheus metrics endpoint
//!
//! Exposes relay metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    let _ = &*PROMETHEUS_HANDLE;
    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "relay_requests_total",
        "Total number of chat completion requests by mode and outcome"
    );
    metrics::describe_histogram!(
        "relay_request_duration_seconds",
        "Time until the response (or the first byte of a stream) was ready"
    );
    metrics::describe_counter!(
        "relay_upstream_errors_total",
        "Upstream failures by kind"
    );
    metrics::describe_counter!(
        "relay_auth_failures_total",
        "Rejected credentials by reason"
    );
    metrics::describe_counter!(
        "relay_stream_frames_total",
        "Event stream frames written, sentinel included"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record a handled request. `mode` is `stream` or `json`.
pub fn record_request(mode: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!("relay_requests_total", "mode" => mode.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    metrics::histogram!("relay_request_duration_seconds", "mode" => mode.to_string())
        .record(duration_secs);
}

pub fn record_upstream_error(kind: &str) {
    metrics::counter!("relay_upstream_errors_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_auth_failure(reason: &str) {
    metrics::counter!("relay_auth_failures_total", "reason" => reason.to_string()).increment(1);
}

/// Record the frames of one finished event stream
pub fn record_stream_frames(count: u64) {
    metrics::counter!("relay_stream_frames_total").increment(count);
}
