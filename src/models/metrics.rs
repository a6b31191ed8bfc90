use serde::{Deserialize, Serialize};

/// Overall pipeline health, derived from failure rate and moving-average
/// latency. Critical wins over warning, warning over healthy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Cumulative pipeline counters plus the moving-average latency.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub products_processed: u64,
    pub total_tokens_used: u64,
    pub total_cost: f64,
    pub failure_rate: f64,
    pub average_duration_ms: f64,
}

/// Health classification with the alerts that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub failure_rate: f64,
    pub average_duration_ms: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub alerts: Vec<String>,
}
