use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Describe every metric the orchestrator records. Call once after installing the recorder.
pub fn describe_metrics() {
    metrics::describe_counter!("jobs_created_total", "Jobs created with an upload grant");
    metrics::describe_counter!(
        "classification_callbacks_total",
        "Classification callbacks handled, by outcome"
    );
    metrics::describe_counter!("jobs_completed_total", "Jobs completed, by decision action");
    metrics::describe_counter!("jobs_failed_total", "Jobs that ended in the failed state");
    metrics::describe_histogram!(
        "job_processing_seconds",
        "Time from entering processing to a terminal state"
    );
    metrics::describe_counter!("device_events_total", "Device events received, by type");
    metrics::describe_counter!("devices_registered_total", "Devices registered");
}

/// Prometheus metrics scrape endpoint.
/// Returns metrics in Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
