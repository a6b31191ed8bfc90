use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::app_state::AppState;
use crate::models::metrics::{HealthReport, MetricsSnapshot};

/// GET /api/v1/metrics — cumulative pipeline counters.
pub async fn pipeline_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.monitor.snapshot())
}

/// GET /api/v1/metrics/health — threshold-based health classification.
pub async fn pipeline_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.monitor.health())
}

/// POST /api/v1/metrics/reset — zero all counters.
pub async fn reset_metrics(State(state): State<AppState>) -> StatusCode {
    state.monitor.reset().await;
    StatusCode::NO_CONTENT
}

/// Prometheus metrics scrape endpoint.
/// Returns metrics in Prometheus text exposition format.
pub async fn prometheus_metrics(
    axum::extract::State(handle): axum::extract::State<Arc<PrometheusHandle>>,
) -> impl IntoResponse {
    handle.render()
}
