use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::job::{JobOptions, JobPriority, JobProgress, JobRecord, QueueCounts};
use crate::services::queue::QueueError;

fn internal_error(e: QueueError) -> StatusCode {
    tracing::error!(error = %e, "Job queue operation failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateJobOptions {
    pub priority: Option<JobPriority>,
    pub requested_by: Option<String>,
}

impl CreateJobOptions {
    fn into_options(self) -> JobOptions {
        JobOptions {
            priority: self.priority,
            requested_by: self.requested_by,
            ..JobOptions::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub product_ids: Vec<String>,
    pub batch_size: Option<usize>,
    #[serde(flatten)]
    pub options: CreateJobOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateBackfillRequest {
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
    #[serde(flatten)]
    pub options: CreateJobOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateValidateRequest {
    pub product_ids: Option<Vec<String>>,
    #[serde(flatten)]
    pub options: CreateJobOptions,
}

#[derive(Serialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub status: String,
}

fn created(job_id: String) -> Json<JobCreatedResponse> {
    Json(JobCreatedResponse {
        job_id,
        status: "queued".to_string(),
    })
}

/// POST /api/v1/jobs/products/{product_id} — enqueue a single-product
/// embedding job (idempotent per product).
pub async fn create_product_job(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    body: Option<Json<CreateJobOptions>>,
) -> Result<Json<JobCreatedResponse>, StatusCode> {
    let options = body.map(|Json(b)| b).unwrap_or_default().into_options();
    let job_id = state
        .jobs
        .create_embedding_job(&product_id, options)
        .await
        .map_err(internal_error)?;
    Ok(created(job_id))
}

/// POST /api/v1/jobs/batch — enqueue a batch embedding job.
pub async fn create_batch_job(
    State(state): State<AppState>,
    Json(body): Json<CreateBatchRequest>,
) -> Result<Json<JobCreatedResponse>, StatusCode> {
    if body.product_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let job_id = state
        .jobs
        .create_batch_job(body.product_ids, body.batch_size, body.options.into_options())
        .await
        .map_err(internal_error)?;
    Ok(created(job_id))
}

/// POST /api/v1/jobs/backfill — embed all products missing embeddings.
pub async fn create_backfill_job(
    State(state): State<AppState>,
    body: Option<Json<CreateBackfillRequest>>,
) -> Result<Json<JobCreatedResponse>, StatusCode> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let job_id = state
        .jobs
        .create_backfill_job(body.limit, body.batch_size, body.options.into_options())
        .await
        .map_err(internal_error)?;
    Ok(created(job_id))
}

/// POST /api/v1/jobs/products/{product_id}/update — regenerate after a
/// product change.
pub async fn create_update_job(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    body: Option<Json<CreateJobOptions>>,
) -> Result<Json<JobCreatedResponse>, StatusCode> {
    let options = body.map(|Json(b)| b).unwrap_or_default().into_options();
    let job_id = state
        .jobs
        .create_update_job(&product_id, options)
        .await
        .map_err(internal_error)?;
    Ok(created(job_id))
}

/// POST /api/v1/jobs/validate — validate stored embeddings.
pub async fn create_validate_job(
    State(state): State<AppState>,
    body: Option<Json<CreateValidateRequest>>,
) -> Result<Json<JobCreatedResponse>, StatusCode> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let job_id = state
        .jobs
        .create_validation_job(body.product_ids, body.options.into_options())
        .await
        .map_err(internal_error)?;
    Ok(created(job_id))
}

/// GET /api/v1/jobs/{id} — job status, progress, and result.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, StatusCode> {
    match state.jobs.get_job(&id).await.map_err(internal_error)? {
        Some(job) => Ok(Json(job)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /api/v1/jobs/{id}/progress — typed progress, null when absent.
pub async fn get_job_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<JobProgress>>, StatusCode> {
    Ok(Json(
        state.jobs.get_progress(&id).await.map_err(internal_error)?,
    ))
}

/// GET /api/v1/jobs/stats — per-state queue counts.
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueCounts>, StatusCode> {
    Ok(Json(state.jobs.queue_counts().await.map_err(internal_error)?))
}

/// GET /api/v1/jobs/active
pub async fn active_jobs(
    State(state): State<AppState>,
) -> Result<Json<Vec<JobRecord>>, StatusCode> {
    Ok(Json(state.jobs.active_jobs().await.map_err(internal_error)?))
}

#[derive(Debug, Deserialize)]
pub struct FailedJobsParams {
    #[serde(default)]
    pub offset: isize,
    #[serde(default = "default_failed_limit")]
    pub limit: isize,
}

fn default_failed_limit() -> isize {
    20
}

/// GET /api/v1/jobs/failed?offset=&limit= — one page, most recent first.
pub async fn failed_jobs(
    State(state): State<AppState>,
    Query(params): Query<FailedJobsParams>,
) -> Result<Json<Vec<JobRecord>>, StatusCode> {
    Ok(Json(
        state
            .jobs
            .failed_jobs(params.offset.max(0), params.limit.clamp(1, 100))
            .await
            .map_err(internal_error)?,
    ))
}

/// POST /api/v1/jobs/{id}/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    if state.jobs.retry_job(&id).await.map_err(internal_error)? {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// DELETE /api/v1/jobs/{id}
pub async fn remove_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    if state.jobs.remove_job(&id).await.map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Serialize)]
pub struct QueueControlResponse {
    pub paused: bool,
}

/// POST /api/v1/queue/pause — stop dequeuing; queued jobs remain.
pub async fn pause_queue(
    State(state): State<AppState>,
) -> Result<Json<QueueControlResponse>, StatusCode> {
    state.jobs.pause_queue().await.map_err(internal_error)?;
    Ok(Json(QueueControlResponse { paused: true }))
}

/// POST /api/v1/queue/resume
pub async fn resume_queue(
    State(state): State<AppState>,
) -> Result<Json<QueueControlResponse>, StatusCode> {
    state.jobs.resume_queue().await.map_err(internal_error)?;
    Ok(Json(QueueControlResponse { paused: false }))
}
