use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::{
    JobOptions, JobPayload, JobProgress, JobRecord, QueueCounts, MAX_BACKFILL_LIMIT,
    MAX_CHUNK_SIZE,
};
use crate::services::queue::{JobQueue, QueueError};

/// Fixed prefixes for deterministic single-product job ids.
const PRODUCT_JOB_PREFIX: &str = "embed-product-";
const UPDATE_JOB_PREFIX: &str = "update-product-";

/// Public creation/query/control API over the job queue. One creation
/// operation per job variant; queries and queue control delegate to the
/// queue collaborator.
pub struct JobService {
    queue: Arc<JobQueue>,
}

impl JobService {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }

    /// Deterministic id for single-product jobs, so duplicate requests for
    /// the same product collapse onto one in-flight job.
    pub fn embedding_job_id(product_id: &str) -> String {
        format!("{PRODUCT_JOB_PREFIX}{product_id}")
    }

    /// Deterministic id for update jobs, same collapsing behavior.
    pub fn update_job_id(product_id: &str) -> String {
        format!("{UPDATE_JOB_PREFIX}{product_id}")
    }

    async fn enqueue(
        &self,
        id: String,
        payload: JobPayload,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        let priority = options.priority.unwrap_or_else(|| payload.default_priority());
        let enqueued = self.queue.enqueue(&payload, &id, priority, &options).await?;
        tracing::info!(
            job_id = %id,
            kind = %payload.kind(),
            priority = %priority,
            deduplicated = !enqueued,
            "Job creation requested"
        );
        Ok(id)
    }

    /// Generate one embedding for a single product.
    pub async fn create_embedding_job(
        &self,
        product_id: &str,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        self.enqueue(
            Self::embedding_job_id(product_id),
            JobPayload::GenerateEmbedding {
                product_id: product_id.to_string(),
            },
            options,
        )
        .await
    }

    /// Generate embeddings for an explicit product list in chunks.
    pub async fn create_batch_job(
        &self,
        product_ids: Vec<String>,
        batch_size: Option<usize>,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        self.enqueue(
            format!("batch-{}", Uuid::new_v4()),
            JobPayload::BatchGenerate {
                product_ids,
                batch_size: batch_size.map(|s| s.clamp(1, MAX_CHUNK_SIZE)),
            },
            options,
        )
        .await
    }

    /// Generate embeddings for products currently lacking one.
    pub async fn create_backfill_job(
        &self,
        limit: Option<usize>,
        batch_size: Option<usize>,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        self.enqueue(
            format!("backfill-{}", Uuid::new_v4()),
            JobPayload::BackfillMissing {
                limit: limit.map(|l| l.min(MAX_BACKFILL_LIMIT)),
                batch_size: batch_size.map(|s| s.clamp(1, MAX_CHUNK_SIZE)),
            },
            options,
        )
        .await
    }

    /// Regenerate the embedding for a product whose fields changed.
    pub async fn create_update_job(
        &self,
        product_id: &str,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        self.enqueue(
            Self::update_job_id(product_id),
            JobPayload::UpdateEmbedding {
                product_id: product_id.to_string(),
            },
            options,
        )
        .await
    }

    /// Validate stored embeddings for an id list, or the whole corpus when
    /// no ids are given.
    pub async fn create_validation_job(
        &self,
        product_ids: Option<Vec<String>>,
        options: JobOptions,
    ) -> Result<String, QueueError> {
        self.enqueue(
            format!("validate-{}", Uuid::new_v4()),
            JobPayload::ValidateEmbeddings { product_ids },
            options,
        )
        .await
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, QueueError> {
        self.queue.get_job(id).await
    }

    pub async fn get_progress(&self, id: &str) -> Result<Option<JobProgress>, QueueError> {
        self.queue.get_progress(id).await
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts, QueueError> {
        self.queue.counts().await
    }

    pub async fn active_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        self.queue.active_jobs().await
    }

    pub async fn failed_jobs(
        &self,
        offset: isize,
        limit: isize,
    ) -> Result<Vec<JobRecord>, QueueError> {
        self.queue.failed_jobs(offset, limit).await
    }

    pub async fn retry_job(&self, id: &str) -> Result<bool, QueueError> {
        self.queue.retry(id).await
    }

    pub async fn remove_job(&self, id: &str) -> Result<bool, QueueError> {
        self.queue.remove(id).await
    }

    /// Stop dequeuing; queued jobs remain, in-flight jobs finish.
    pub async fn pause_queue(&self) -> Result<(), QueueError> {
        tracing::warn!("Pausing embedding job queue");
        self.queue.pause().await
    }

    pub async fn resume_queue(&self) -> Result<(), QueueError> {
        tracing::info!("Resuming embedding job queue");
        self.queue.resume().await
    }
}
