use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::time::Instant;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// Redis queue connectivity plus its control state: the pause flag and the
/// number of jobs waiting to be picked up (waiting + delayed).
#[derive(Serialize)]
pub struct QueueHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
}

/// GET /health — dependency status plus queue backlog.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_start = Instant::now();
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(db_start.elapsed().as_millis() as u64),
        },
        Err(_) => ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        },
    };

    let queue_start = Instant::now();
    let queue = match state.queue.health_check().await {
        Ok(()) => QueueHealth {
            status: "ok".to_string(),
            latency_ms: Some(queue_start.elapsed().as_millis() as u64),
            // A paused queue is healthy but worth surfacing to operators.
            paused: state.queue.is_paused().await.ok(),
            depth: state.queue.queue_depth().await.ok(),
        },
        Err(_) => QueueHealth {
            status: "error".to_string(),
            latency_ms: None,
            paused: None,
            depth: None,
        },
    };

    let all_healthy = database.status == "ok" && queue.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { database, queue },
    };

    (status_code, Json(response))
}
