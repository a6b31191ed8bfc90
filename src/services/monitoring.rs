use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::job::{JobKind, JobResult};
use crate::models::metrics::{HealthReport, HealthStatus, MetricsSnapshot};
use crate::services::cache::{self, KvCache};

/// Sliding window of recent job durations for the moving-average latency.
const DURATION_WINDOW: usize = 1000;

/// Failure-rate thresholds.
const FAILURE_WARNING_RATE: f64 = 0.05;
const FAILURE_CRITICAL_RATE: f64 = 0.10;

/// Moving-average latency thresholds.
const LATENCY_WARNING_MS: f64 = 5_000.0;
const LATENCY_CRITICAL_MS: f64 = 10_000.0;

/// Per-completion alert triggers.
const BATCH_FAILURE_ALERT_RATIO: f64 = 0.10;
const JOB_COST_ALERT_USD: f64 = 1.0;

const SNAPSHOT_KEY: &str = "embeddings:metrics:snapshot";
const SNAPSHOT_TTL_SECS: u64 = 86_400;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct MetricsState {
    jobs_processed: u64,
    jobs_failed: u64,
    products_processed: u64,
    total_tokens_used: u64,
    total_cost: f64,
    durations_ms: VecDeque<u64>,
}

/// Aggregates job outcomes into cumulative counters and a bounded latency
/// window, classifies pipeline health against thresholds, and raises
/// per-completion alerts. Mutated only from the job-completion/failure
/// path; snapshots mirror to the durable cache best-effort.
pub struct MonitoringService {
    state: Mutex<MetricsState>,
    cache: Arc<dyn KvCache>,
}

impl MonitoringService {
    pub fn new(cache: Arc<dyn KvCache>) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            cache,
        }
    }

    /// Reload the last persisted snapshot. Absence is not an error.
    pub async fn restore(&self) {
        match cache::get_json::<MetricsState>(self.cache.as_ref(), SNAPSHOT_KEY).await {
            Ok(Some(persisted)) => {
                let mut state = self.state.lock().unwrap();
                *state = persisted;
                tracing::info!(
                    jobs_processed = state.jobs_processed,
                    "Restored metrics from cache"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to restore metrics, starting fresh"),
        }
    }

    /// Record a terminal job outcome (success or failure) and raise
    /// per-completion alerts.
    pub async fn record_result(&self, kind: JobKind, result: &JobResult) {
        let persisted = {
            let mut state = self.state.lock().unwrap();
            state.jobs_processed += 1;
            if !result.success {
                state.jobs_failed += 1;
            }
            state.products_processed += result.processed_count;
            state.total_tokens_used += result.total_tokens_used;
            state.total_cost += result.estimated_cost;
            state.durations_ms.push_back(result.duration_ms);
            while state.durations_ms.len() > DURATION_WINDOW {
                state.durations_ms.pop_front();
            }
            state.clone()
        };

        let kind_label = kind.to_string();
        metrics::counter!("embedding_jobs_processed_total", "kind" => kind_label.clone())
            .increment(1);
        if !result.success {
            metrics::counter!("embedding_jobs_failed_total", "kind" => kind_label.clone())
                .increment(1);
        }
        metrics::counter!("embedding_tokens_used_total").increment(result.total_tokens_used);
        metrics::histogram!("embedding_job_duration_seconds", "kind" => kind_label)
            .record(result.duration_ms as f64 / 1000.0);

        for alert in Self::completion_alerts(result) {
            tracing::warn!(kind = %kind, %alert, "Job completion alert");
        }

        if let Err(e) =
            cache::set_json(self.cache.as_ref(), SNAPSHOT_KEY, &persisted, SNAPSHOT_TTL_SECS).await
        {
            tracing::warn!(error = %e, "Failed to persist metrics snapshot");
        }
    }

    /// Alerts raised for one terminal result, independent of the rolling
    /// health classification. A batch that failed everything (processed 0)
    /// still trips the failure-ratio alert.
    fn completion_alerts(result: &JobResult) -> Vec<String> {
        let mut alerts = Vec::new();
        if result.failed_count > 0
            && result.failed_count as f64
                > result.processed_count as f64 * BATCH_FAILURE_ALERT_RATIO
        {
            alerts.push(format!(
                "failure count {} exceeded 10% of {} processed products",
                result.failed_count, result.processed_count
            ));
        }
        if result.duration_ms as f64 >= LATENCY_CRITICAL_MS {
            alerts.push(format!(
                "duration {}ms reached the critical latency threshold",
                result.duration_ms
            ));
        }
        if result.estimated_cost > JOB_COST_ALERT_USD {
            alerts.push(format!(
                "single job cost ${:.2} exceeded ${JOB_COST_ALERT_USD}",
                result.estimated_cost
            ));
        }
        alerts
    }

    /// `failed / processed`, defined as 0 when nothing has been processed.
    pub fn failure_rate(&self) -> f64 {
        let state = self.state.lock().unwrap();
        Self::rate(&state)
    }

    fn rate(state: &MetricsState) -> f64 {
        if state.jobs_processed == 0 {
            0.0
        } else {
            state.jobs_failed as f64 / state.jobs_processed as f64
        }
    }

    fn average_duration(state: &MetricsState) -> f64 {
        if state.durations_ms.is_empty() {
            0.0
        } else {
            state.durations_ms.iter().sum::<u64>() as f64 / state.durations_ms.len() as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().unwrap();
        MetricsSnapshot {
            jobs_processed: state.jobs_processed,
            jobs_failed: state.jobs_failed,
            products_processed: state.products_processed,
            total_tokens_used: state.total_tokens_used,
            total_cost: state.total_cost,
            failure_rate: Self::rate(&state),
            average_duration_ms: Self::average_duration(&state),
        }
    }

    /// Classify health: critical wins if either check is critical, then
    /// warning, else healthy. Alerts describe each breached threshold.
    pub fn health(&self) -> HealthReport {
        let (failure_rate, avg_ms) = {
            let state = self.state.lock().unwrap();
            (Self::rate(&state), Self::average_duration(&state))
        };

        let mut alerts = Vec::new();
        let mut status = HealthStatus::Healthy;

        if failure_rate >= FAILURE_CRITICAL_RATE {
            status = HealthStatus::Critical;
            alerts.push(format!(
                "Failure rate {:.1}% at or above critical threshold {:.0}%",
                failure_rate * 100.0,
                FAILURE_CRITICAL_RATE * 100.0
            ));
        } else if failure_rate >= FAILURE_WARNING_RATE {
            status = HealthStatus::Warning;
            alerts.push(format!(
                "Failure rate {:.1}% at or above warning threshold {:.0}%",
                failure_rate * 100.0,
                FAILURE_WARNING_RATE * 100.0
            ));
        }

        if avg_ms >= LATENCY_CRITICAL_MS {
            status = HealthStatus::Critical;
            alerts.push(format!(
                "Average job duration {:.0}ms at or above critical threshold {:.0}ms",
                avg_ms, LATENCY_CRITICAL_MS
            ));
        } else if avg_ms >= LATENCY_WARNING_MS {
            if status != HealthStatus::Critical {
                status = HealthStatus::Warning;
            }
            alerts.push(format!(
                "Average job duration {:.0}ms at or above warning threshold {:.0}ms",
                avg_ms, LATENCY_WARNING_MS
            ));
        }

        HealthReport {
            status,
            failure_rate,
            average_duration_ms: avg_ms,
            alerts,
        }
    }

    /// Zero all counters and the latency window.
    pub async fn reset(&self) {
        {
            let mut state = self.state.lock().unwrap();
            *state = MetricsState::default();
        }
        if let Err(e) = self.cache.delete(SNAPSHOT_KEY).await {
            tracing::warn!(error = %e, "Failed to clear persisted metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::memory::MemoryCache;

    fn service() -> MonitoringService {
        MonitoringService::new(Arc::new(MemoryCache::default()))
    }

    fn result(success: bool, duration_ms: u64) -> JobResult {
        JobResult {
            success,
            processed_count: if success { 1 } else { 0 },
            failed_count: if success { 0 } else { 1 },
            total_tokens_used: 100,
            estimated_cost: 0.001,
            errors: Vec::new(),
            duration_ms,
        }
    }

    #[test]
    fn failure_rate_zero_when_nothing_processed() {
        assert_eq!(service().failure_rate(), 0.0);
    }

    #[tokio::test]
    async fn failure_rate_is_failed_over_processed() {
        let m = service();
        m.record_result(JobKind::GenerateEmbedding, &result(false, 10))
            .await;
        assert_eq!(m.failure_rate(), 1.0);

        for _ in 0..3 {
            m.record_result(JobKind::GenerateEmbedding, &result(true, 10))
                .await;
        }
        assert_eq!(m.failure_rate(), 0.25);
    }

    #[tokio::test]
    async fn health_critical_wins_over_warning() {
        let m = service();
        // 1 failure in 10 jobs => 10% failure rate (critical), fast jobs.
        m.record_result(JobKind::BatchGenerate, &result(false, 10))
            .await;
        for _ in 0..9 {
            m.record_result(JobKind::BatchGenerate, &result(true, 10))
                .await;
        }
        let report = m.health();
        assert_eq!(report.status, HealthStatus::Critical);
        assert!(!report.alerts.is_empty());
    }

    #[tokio::test]
    async fn slow_jobs_alone_degrade_health() {
        let m = service();
        for _ in 0..5 {
            m.record_result(JobKind::BackfillMissing, &result(true, 6000))
                .await;
        }
        let report = m.health();
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.failure_rate, 0.0);
    }

    #[tokio::test]
    async fn duration_window_is_bounded() {
        let m = service();
        for _ in 0..DURATION_WINDOW + 10 {
            let mut state = m.state.lock().unwrap();
            state.durations_ms.push_back(1);
            while state.durations_ms.len() > DURATION_WINDOW {
                state.durations_ms.pop_front();
            }
        }
        assert_eq!(m.state.lock().unwrap().durations_ms.len(), DURATION_WINDOW);
    }

    #[tokio::test]
    async fn reset_zeroes_everything() {
        let m = service();
        m.record_result(JobKind::UpdateEmbedding, &result(true, 10))
            .await;
        m.reset().await;
        let snapshot = m.snapshot();
        assert_eq!(snapshot.jobs_processed, 0);
        assert_eq!(snapshot.average_duration_ms, 0.0);
    }

    #[test]
    fn batch_with_every_chunk_failed_raises_failure_ratio_alert() {
        let r = JobResult {
            success: false,
            processed_count: 0,
            failed_count: 25,
            total_tokens_used: 0,
            estimated_cost: 0.0,
            errors: vec!["chunk 1: boom".to_string()],
            duration_ms: 10,
        };
        let alerts = MonitoringService::completion_alerts(&r);
        assert!(alerts.iter().any(|a| a.contains("failure count 25")));
    }

    #[test]
    fn clean_fast_cheap_job_raises_no_alerts() {
        let r = JobResult {
            success: true,
            processed_count: 50,
            failed_count: 0,
            total_tokens_used: 500,
            estimated_cost: 0.0001,
            errors: Vec::new(),
            duration_ms: 100,
        };
        assert!(MonitoringService::completion_alerts(&r).is_empty());
    }

    #[tokio::test]
    async fn restore_picks_up_persisted_counters() {
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::default());
        let m = MonitoringService::new(cache.clone());
        m.record_result(JobKind::GenerateEmbedding, &result(true, 10))
            .await;

        let fresh = MonitoringService::new(cache);
        fresh.restore().await;
        assert_eq!(fresh.snapshot().jobs_processed, 1);
    }
}
