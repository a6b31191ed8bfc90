use serde::{Deserialize, Serialize};

use crate::models::job::JobKind;

/// One cost entry, appended when a job reports token usage. Immutable once
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// ISO-8601 UTC timestamp; daily/monthly totals filter on its prefix.
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    pub job_type: JobKind,
}

/// Daily and monthly spending ceilings in USD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Budgets {
    pub daily_budget: f64,
    pub monthly_budget: f64,
}

/// Session-level running totals since process start (or last restore).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionCosts {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub records: u64,
}

/// Aggregate over a day or month prefix of the history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeriodCosts {
    pub tokens_used: u64,
    pub estimated_cost: f64,
    pub records: u64,
}

/// Budget consumption for one period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub budget: f64,
    pub spent: f64,
    /// Clamped to [0, 100].
    pub percent_used: f64,
    /// Clamped to >= 0.
    pub remaining: f64,
}

/// Daily/monthly budget check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub within_daily_budget: bool,
    pub within_monthly_budget: bool,
    pub daily: BudgetUsage,
    pub monthly: BudgetUsage,
}

/// End-of-month spend projection from the trailing daily average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostProjection {
    pub spent_this_month: f64,
    pub daily_average: f64,
    pub days_elapsed: u32,
    pub days_remaining: u32,
    pub projected_month_cost: f64,
    pub will_exceed_budget: bool,
    /// Remaining budget spread over the remaining days, floored at 0.
    pub recommended_daily_limit: f64,
}

/// Cost estimate for an n-product batch before enqueueing it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchCostEstimate {
    pub product_count: u64,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
}
