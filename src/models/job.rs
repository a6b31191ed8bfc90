use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default number of products per embedding-API call.
pub const DEFAULT_CHUNK_SIZE: usize = 50;
/// Hard cap on products per embedding-API call.
pub const MAX_CHUNK_SIZE: usize = 100;
/// Hard cap on products selected by a single backfill job.
pub const MAX_BACKFILL_LIMIT: usize = 1000;
/// Hard cap on rows scanned by a corpus-wide validate job.
pub const MAX_VALIDATE_SCAN: usize = 1000;

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

/// Job priority, lower is more urgent. The discriminant feeds directly
/// into the queue's ordering score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPriority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Background = 4,
}

/// The five job variants and their payloads. The processor matches this
/// exhaustively, so adding a variant is a compile-time-checked change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    GenerateEmbedding {
        product_id: String,
    },
    BatchGenerate {
        product_ids: Vec<String>,
        batch_size: Option<usize>,
    },
    BackfillMissing {
        limit: Option<usize>,
        batch_size: Option<usize>,
    },
    UpdateEmbedding {
        product_id: String,
    },
    ValidateEmbeddings {
        /// Explicit ids to check, or None for a capped corpus scan.
        product_ids: Option<Vec<String>>,
    },
}

/// Discriminant-only view of [`JobPayload`], used for logging, metrics
/// labels, and the retry-policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    GenerateEmbedding,
    BatchGenerate,
    BackfillMissing,
    UpdateEmbedding,
    ValidateEmbeddings,
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::GenerateEmbedding { .. } => JobKind::GenerateEmbedding,
            JobPayload::BatchGenerate { .. } => JobKind::BatchGenerate,
            JobPayload::BackfillMissing { .. } => JobKind::BackfillMissing,
            JobPayload::UpdateEmbedding { .. } => JobKind::UpdateEmbedding,
            JobPayload::ValidateEmbeddings { .. } => JobKind::ValidateEmbeddings,
        }
    }

    /// Default priority per variant; callers may override at creation time.
    pub fn default_priority(&self) -> JobPriority {
        match self.kind() {
            JobKind::GenerateEmbedding | JobKind::BatchGenerate => JobPriority::Normal,
            JobKind::BackfillMissing => JobPriority::Background,
            JobKind::UpdateEmbedding => JobPriority::High,
            JobKind::ValidateEmbeddings => JobPriority::Low,
        }
    }
}

/// Whether a failed result for this job kind should re-enter the queue for
/// another attempt. Embedding-generating kinds fail mostly on transient
/// external-API errors; validation failures are findings, not errors.
pub fn retry_on_failure(kind: JobKind) -> bool {
    match kind {
        JobKind::GenerateEmbedding
        | JobKind::BatchGenerate
        | JobKind::BackfillMissing
        | JobKind::UpdateEmbedding => true,
        JobKind::ValidateEmbeddings => false,
    }
}

/// Job payload serialized into Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub requested_by: Option<String>,
}

/// Terminal outcome of a processed job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub processed_count: u64,
    pub failed_count: u64,
    pub total_tokens_used: u64,
    pub estimated_cost: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Progress published by the processor while a batch-shaped job runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobProgress {
    pub processed: u64,
    pub total: u64,
    pub percentage: u32,
    pub tokens_used: u64,
    pub errors: u64,
}

impl JobProgress {
    pub fn new(processed: u64, total: u64, tokens_used: u64, errors: u64) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((processed as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            processed,
            total,
            percentage,
            tokens_used,
            errors,
        }
    }
}

/// Options attached to a job at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub priority: Option<JobPriority>,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub requested_by: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: None,
            max_attempts: 3,
            backoff_base_ms: 1000,
            requested_by: None,
        }
    }
}

/// Full view of a job as stored in the queue, returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub requested_by: Option<String>,
    pub progress: Option<JobProgress>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

/// Per-state queue counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percentage_rounds() {
        let p = JobProgress::new(1, 3, 50, 0);
        assert_eq!(p.percentage, 33);
        let p = JobProgress::new(2, 3, 100, 0);
        assert_eq!(p.percentage, 67);
        let p = JobProgress::new(3, 3, 150, 0);
        assert_eq!(p.percentage, 100);
    }

    #[test]
    fn progress_empty_total_is_complete() {
        assert_eq!(JobProgress::new(0, 0, 0, 0).percentage, 100);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = JobPayload::GenerateEmbedding {
            product_id: "prod-1".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "generate_embedding");
        assert_eq!(json["product_id"], "prod-1");
    }

    #[test]
    fn validate_jobs_do_not_retry() {
        assert!(!retry_on_failure(JobKind::ValidateEmbeddings));
        assert!(retry_on_failure(JobKind::BatchGenerate));
    }

    #[test]
    fn default_priorities_per_kind() {
        let backfill = JobPayload::BackfillMissing {
            limit: None,
            batch_size: None,
        };
        assert_eq!(backfill.default_priority(), JobPriority::Background);
        let update = JobPayload::UpdateEmbedding {
            product_id: "p".to_string(),
        };
        assert_eq!(update.default_priority(), JobPriority::High);
    }
}
