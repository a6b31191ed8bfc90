use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::validation::{CoverageReport, DimensionMismatch, ValidationResult};

fn internal_error(e: sqlx::Error) -> StatusCode {
    tracing::error!(error = %e, "Validation query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// GET /api/v1/validation/coverage — percentage of products with an
/// embedding (capped scan).
pub async fn coverage(
    State(state): State<AppState>,
) -> Result<Json<CoverageReport>, StatusCode> {
    Ok(Json(state.validator.coverage().await.map_err(internal_error)?))
}

/// GET /api/v1/validation/mismatches — stored embeddings with unexpected
/// dimension counts.
pub async fn dimension_mismatches(
    State(state): State<AppState>,
) -> Result<Json<Vec<DimensionMismatch>>, StatusCode> {
    Ok(Json(
        state
            .validator
            .dimension_mismatches()
            .await
            .map_err(internal_error)?,
    ))
}

/// GET /api/v1/validation/products/{product_id} — validate one product's
/// stored embedding.
pub async fn validate_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ValidationResult>, StatusCode> {
    Ok(Json(
        state
            .validator
            .validate_product(&product_id)
            .await
            .map_err(internal_error)?,
    ))
}
