use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

/// Register descriptions for the prediction metrics.
pub fn describe_metrics() {
    metrics::describe_counter!("prediction_jobs_total", "Prediction jobs created");
    metrics::describe_counter!(
        "prediction_jobs_completed",
        "Prediction jobs that reached COMPLETED"
    );
    metrics::describe_counter!(
        "prediction_jobs_failed",
        "Prediction jobs that reached FAILED, by reason"
    );
    metrics::describe_histogram!(
        "prediction_relay_seconds",
        "Round trip time of calls to the inference service"
    );
    metrics::describe_counter!(
        "prediction_jobs_reconciled_total",
        "Abandoned jobs closed by reconciliation"
    );
}

/// `GET /metrics` with its own state.
pub fn router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(handle)
}

/// Prometheus text exposition.
async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
