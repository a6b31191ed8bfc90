use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::app_state::AppState;
use crate::models::cost::{
    BatchCostEstimate, BudgetStatus, Budgets, CostProjection, PeriodCosts, SessionCosts,
};

/// GET /api/v1/costs/session — totals since process start (or restore).
pub async fn session_costs(State(state): State<AppState>) -> Json<SessionCosts> {
    Json(state.costs.session_costs())
}

/// GET /api/v1/costs/daily — today's totals.
pub async fn daily_costs(State(state): State<AppState>) -> Json<PeriodCosts> {
    Json(state.costs.daily_costs())
}

/// GET /api/v1/costs/monthly — this month's totals.
pub async fn monthly_costs(State(state): State<AppState>) -> Json<PeriodCosts> {
    Json(state.costs.monthly_costs())
}

/// GET /api/v1/costs/breakdown — this month's spend per job type.
pub async fn monthly_breakdown(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, PeriodCosts>> {
    Json(state.costs.monthly_breakdown())
}

/// GET /api/v1/costs/projection — extrapolated month-end spend.
pub async fn monthly_projection(State(state): State<AppState>) -> Json<CostProjection> {
    Json(state.costs.monthly_projection())
}

/// GET /api/v1/costs/budget — current budgets and usage.
pub async fn get_budget(State(state): State<AppState>) -> Json<BudgetStatus> {
    Json(state.costs.budget_status())
}

/// PUT /api/v1/costs/budget — update budgets at runtime.
pub async fn set_budget(
    State(state): State<AppState>,
    Json(budgets): Json<Budgets>,
) -> Json<BudgetStatus> {
    state.costs.set_budgets(budgets).await;
    Json(state.costs.budget_status())
}

#[derive(Debug, Deserialize)]
pub struct EstimateParams {
    pub count: u64,
}

/// GET /api/v1/costs/estimate?count=n — pre-enqueue batch estimate.
pub async fn estimate_batch(
    State(state): State<AppState>,
    Query(params): Query<EstimateParams>,
) -> Json<BatchCostEstimate> {
    Json(state.costs.estimate_batch_cost(params.count))
}
