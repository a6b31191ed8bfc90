use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::models::cost::{
    BatchCostEstimate, BudgetStatus, BudgetUsage, Budgets, CostProjection, CostRecord, PeriodCosts,
    SessionCosts,
};
use crate::services::cache::{self, KvCache};

/// Capped in-memory cost history; oldest entries drop off first.
const HISTORY_CAP: usize = 10_000;
/// How many recent records are persisted in the snapshot.
const SNAPSHOT_RECENT: usize = 1000;
/// Snapshot TTL in the durable cache.
const SNAPSHOT_TTL_SECS: u64 = 86_400;
const SNAPSHOT_KEY: &str = "embeddings:costs:snapshot";

/// Budget alert thresholds as fractions of the configured budget.
const BUDGET_WARNING_THRESHOLD: f64 = 0.8;
const BUDGET_CRITICAL_THRESHOLD: f64 = 1.0;

#[derive(Debug, Serialize, Deserialize)]
struct CostSnapshot {
    session: SessionCosts,
    budgets: Budgets,
    recent: Vec<CostRecord>,
}

struct CostState {
    session: SessionCosts,
    budgets: Budgets,
    history: VecDeque<CostRecord>,
}

/// Tracks embedding spend: session totals, a capped record history for
/// daily/monthly aggregation, and budget enforcement with threshold
/// alerting. State is owned by this instance and mirrored to the durable
/// cache opportunistically; it is not the system of record.
pub struct CostTracker {
    price_per_million_tokens: f64,
    avg_tokens_per_product: u64,
    state: Mutex<CostState>,
    cache: Arc<dyn KvCache>,
}

impl CostTracker {
    pub fn new(
        price_per_million_tokens: f64,
        avg_tokens_per_product: u64,
        budgets: Budgets,
        cache: Arc<dyn KvCache>,
    ) -> Self {
        Self {
            price_per_million_tokens,
            avg_tokens_per_product,
            state: Mutex::new(CostState {
                session: SessionCosts::default(),
                budgets,
                history: VecDeque::new(),
            }),
            cache,
        }
    }

    /// Restore session totals, budgets, and recent history from the durable
    /// cache. Absence is not an error.
    pub async fn restore(&self) {
        match cache::get_json::<CostSnapshot>(self.cache.as_ref(), SNAPSHOT_KEY).await {
            Ok(Some(snapshot)) => {
                let mut state = self.state.lock().unwrap();
                state.session = snapshot.session;
                state.budgets = snapshot.budgets;
                state.history = snapshot.recent.into();
                tracing::info!(
                    records = state.history.len(),
                    session_cost = state.session.total_cost,
                    "Restored cost state from cache"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to restore cost state, starting fresh"),
        }
    }

    /// Cost in USD for a token count, linear in tokens.
    pub fn calculate_cost(&self, tokens: u64) -> f64 {
        tokens as f64 / 1_000_000.0 * self.price_per_million_tokens
    }

    /// Pre-enqueue estimate for an n-product batch. The count is caller
    /// input, so the token math saturates instead of overflowing.
    pub fn estimate_batch_cost(&self, product_count: u64) -> BatchCostEstimate {
        let estimated_tokens = product_count.saturating_mul(self.avg_tokens_per_product);
        BatchCostEstimate {
            product_count,
            estimated_tokens,
            estimated_cost: self.calculate_cost(estimated_tokens),
        }
    }

    /// Timestamp format for cost records; daily/monthly aggregation matches
    /// on its prefix.
    pub fn record_date_now() -> String {
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Append a cost record, persist a snapshot, and re-evaluate budget
    /// alerts. Persistence failures are logged and swallowed.
    pub async fn record_cost(&self, record: CostRecord) {
        let snapshot = self.append(record);

        if let Err(e) =
            cache::set_json(self.cache.as_ref(), SNAPSHOT_KEY, &snapshot, SNAPSHOT_TTL_SECS).await
        {
            tracing::warn!(error = %e, "Failed to persist cost snapshot");
        }

        self.check_budget_alerts();
    }

    fn append(&self, record: CostRecord) -> CostSnapshot {
        let mut state = self.state.lock().unwrap();
        state.session.total_tokens += record.tokens_used;
        state.session.total_cost += record.estimated_cost;
        state.session.records += 1;
        state.history.push_back(record);
        while state.history.len() > HISTORY_CAP {
            state.history.pop_front();
        }
        Self::make_snapshot(&state)
    }

    fn make_snapshot(state: &CostState) -> CostSnapshot {
        let skip = state.history.len().saturating_sub(SNAPSHOT_RECENT);
        CostSnapshot {
            session: state.session,
            budgets: state.budgets,
            recent: state.history.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn session_costs(&self) -> SessionCosts {
        self.state.lock().unwrap().session
    }

    fn period_costs(&self, prefix: &str) -> PeriodCosts {
        let state = self.state.lock().unwrap();
        let mut period = PeriodCosts::default();
        for record in state.history.iter().filter(|r| r.date.starts_with(prefix)) {
            period.tokens_used += record.tokens_used;
            period.estimated_cost += record.estimated_cost;
            period.records += 1;
        }
        period
    }

    /// Today's totals (UTC day prefix over the history).
    pub fn daily_costs(&self) -> PeriodCosts {
        self.period_costs(&Utc::now().format("%Y-%m-%d").to_string())
    }

    /// This month's totals (UTC month prefix over the history).
    pub fn monthly_costs(&self) -> PeriodCosts {
        self.period_costs(&Utc::now().format("%Y-%m").to_string())
    }

    /// This month's spend broken down by job type.
    pub fn monthly_breakdown(&self) -> BTreeMap<String, PeriodCosts> {
        let prefix = Utc::now().format("%Y-%m").to_string();
        let state = self.state.lock().unwrap();
        let mut breakdown: BTreeMap<String, PeriodCosts> = BTreeMap::new();
        for record in state.history.iter().filter(|r| r.date.starts_with(&prefix)) {
            let entry = breakdown.entry(record.job_type.to_string()).or_default();
            entry.tokens_used += record.tokens_used;
            entry.estimated_cost += record.estimated_cost;
            entry.records += 1;
        }
        breakdown
    }

    fn usage(budget: f64, spent: f64) -> BudgetUsage {
        let percent_used = if budget > 0.0 {
            (spent / budget * 100.0).clamp(0.0, 100.0)
        } else if spent > 0.0 {
            100.0
        } else {
            0.0
        };
        BudgetUsage {
            budget,
            spent,
            percent_used,
            remaining: (budget - spent).max(0.0),
        }
    }

    pub fn budget_status(&self) -> BudgetStatus {
        let budgets = self.budgets();
        let daily = Self::usage(budgets.daily_budget, self.daily_costs().estimated_cost);
        let monthly = Self::usage(budgets.monthly_budget, self.monthly_costs().estimated_cost);
        BudgetStatus {
            within_daily_budget: daily.spent <= daily.budget,
            within_monthly_budget: monthly.spent <= monthly.budget,
            daily,
            monthly,
        }
    }

    pub fn is_within_budget(&self) -> BudgetStatus {
        self.budget_status()
    }

    /// Extrapolate month-end spend from the trailing daily average.
    pub fn monthly_projection(&self) -> CostProjection {
        let now = Utc::now();
        let spent = self.monthly_costs().estimated_cost;
        let budgets = self.budgets();

        let days_elapsed = chrono::Datelike::day(&now).max(1);
        let days_in_month = Self::days_in_month(&now);
        let days_remaining = days_in_month.saturating_sub(days_elapsed);

        let daily_average = spent / days_elapsed as f64;
        let projected = spent + daily_average * days_remaining as f64;

        let recommended_daily_limit = if days_remaining > 0 {
            ((budgets.monthly_budget - spent) / days_remaining as f64).max(0.0)
        } else {
            (budgets.monthly_budget - spent).max(0.0)
        };

        CostProjection {
            spent_this_month: spent,
            daily_average,
            days_elapsed,
            days_remaining,
            projected_month_cost: projected,
            will_exceed_budget: projected > budgets.monthly_budget,
            recommended_daily_limit,
        }
    }

    fn days_in_month(now: &chrono::DateTime<Utc>) -> u32 {
        use chrono::{Datelike, NaiveDate};
        let (year, month) = (now.year(), now.month());
        let first_next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        match (first_next, NaiveDate::from_ymd_opt(year, month, 1)) {
            (Some(next), Some(first)) => (next - first).num_days() as u32,
            _ => 30,
        }
    }

    pub fn budgets(&self) -> Budgets {
        self.state.lock().unwrap().budgets
    }

    /// Update budgets at runtime and persist them with the snapshot.
    pub async fn set_budgets(&self, budgets: Budgets) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.budgets = budgets;
            Self::make_snapshot(&state)
        };
        if let Err(e) =
            cache::set_json(self.cache.as_ref(), SNAPSHOT_KEY, &snapshot, SNAPSHOT_TTL_SECS).await
        {
            tracing::warn!(error = %e, "Failed to persist budgets");
        }
        self.check_budget_alerts();
    }

    /// Warn at >=80% and error at >=100% of either budget, independently.
    fn check_budget_alerts(&self) {
        let status = self.budget_status();
        for (period, usage) in [("daily", status.daily), ("monthly", status.monthly)] {
            if usage.budget <= 0.0 {
                continue;
            }
            let fraction = usage.spent / usage.budget;
            if fraction >= BUDGET_CRITICAL_THRESHOLD {
                tracing::error!(
                    period,
                    spent = usage.spent,
                    budget = usage.budget,
                    "Embedding budget exceeded"
                );
            } else if fraction >= BUDGET_WARNING_THRESHOLD {
                tracing::warn!(
                    period,
                    spent = usage.spent,
                    budget = usage.budget,
                    percent_used = usage.percent_used,
                    "Embedding budget nearing limit"
                );
            }
        }
    }
}
