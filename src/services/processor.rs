use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::db::products::ProductStore;
use crate::models::cost::CostRecord;
use crate::models::job::{
    JobPayload, JobProgress, JobResult, QueuedJob, DEFAULT_CHUNK_SIZE, MAX_BACKFILL_LIMIT,
    MAX_CHUNK_SIZE,
};
use crate::models::product::Product;
use crate::services::cache::KvCache;
use crate::services::cost::CostTracker;
use crate::services::embeddings::{EmbeddingBackend, EmbeddingError};
use crate::services::monitoring::MonitoringService;
use crate::services::queue::JobQueue;
use crate::services::validation::ValidationService;

/// Key prefix for per-product embedding cache entries invalidated on update.
const EMBEDDING_CACHE_PREFIX: &str = "embeddings:cache:";

/// Where in-flight progress updates go. The queue implements this; tests
/// use an in-memory collector.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, job_id: &str, progress: &JobProgress);
}

#[async_trait]
impl ProgressSink for JobQueue {
    async fn publish(&self, job_id: &str, progress: &JobProgress) {
        if let Err(e) = self.set_progress(job_id, progress).await {
            tracing::warn!(job_id, error = %e, "Failed to publish job progress");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("no products found for chunk")]
    EmptyChunk,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The single dispatch point of the pipeline: pulls apart the job payload,
/// runs the matching handler, converts every failure into a structured
/// result, and records cost and metrics. A bad job must never take the
/// worker process down.
pub struct JobProcessor {
    store: Arc<dyn ProductStore>,
    embeddings: Arc<dyn EmbeddingBackend>,
    costs: Arc<CostTracker>,
    monitor: Arc<MonitoringService>,
    validator: Arc<ValidationService>,
    cache: Arc<dyn KvCache>,
    progress: Arc<dyn ProgressSink>,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn ProductStore>,
        embeddings: Arc<dyn EmbeddingBackend>,
        costs: Arc<CostTracker>,
        monitor: Arc<MonitoringService>,
        validator: Arc<ValidationService>,
        cache: Arc<dyn KvCache>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            embeddings,
            costs,
            monitor,
            validator,
            cache,
            progress,
        }
    }

    /// Process one dequeued job to a terminal result. Handler errors are
    /// caught here and converted, never propagated.
    pub async fn process(&self, job: &QueuedJob) -> JobResult {
        let kind = job.payload.kind();
        tracing::info!(job_id = %job.id, kind = %kind, attempt = job.attempts, "Processing job");
        let started = Instant::now();

        let result = match self.execute(job).await {
            Ok(mut result) => {
                result.duration_ms = started.elapsed().as_millis() as u64;
                result
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, kind = %kind, error = %e, "Job handler failed");
                JobResult {
                    success: false,
                    processed_count: 0,
                    failed_count: 1,
                    total_tokens_used: 0,
                    estimated_cost: 0.0,
                    errors: vec![e.to_string()],
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        if result.success && result.total_tokens_used > 0 {
            self.costs
                .record_cost(CostRecord {
                    date: CostTracker::record_date_now(),
                    product_id: Self::single_product_id(&job.payload),
                    batch_id: Self::batch_id(&job.payload, &job.id),
                    tokens_used: result.total_tokens_used,
                    estimated_cost: result.estimated_cost,
                    job_type: kind,
                })
                .await;
        }

        self.monitor.record_result(kind, &result).await;

        tracing::info!(
            job_id = %job.id,
            kind = %kind,
            success = result.success,
            processed = result.processed_count,
            failed = result.failed_count,
            tokens = result.total_tokens_used,
            duration_ms = result.duration_ms,
            "Job finished"
        );
        result
    }

    fn single_product_id(payload: &JobPayload) -> Option<String> {
        match payload {
            JobPayload::GenerateEmbedding { product_id }
            | JobPayload::UpdateEmbedding { product_id } => Some(product_id.clone()),
            _ => None,
        }
    }

    fn batch_id(payload: &JobPayload, job_id: &str) -> Option<String> {
        match payload {
            JobPayload::BatchGenerate { .. } | JobPayload::BackfillMissing { .. } => {
                Some(job_id.to_string())
            }
            _ => None,
        }
    }

    async fn execute(&self, job: &QueuedJob) -> Result<JobResult, ProcessorError> {
        match &job.payload {
            JobPayload::GenerateEmbedding { product_id } => {
                self.handle_single(product_id).await
            }
            JobPayload::BatchGenerate {
                product_ids,
                batch_size,
            } => self.handle_batch(&job.id, product_ids, *batch_size).await,
            JobPayload::BackfillMissing { limit, batch_size } => {
                self.handle_backfill(&job.id, *limit, *batch_size).await
            }
            JobPayload::UpdateEmbedding { product_id } => self.handle_update(product_id).await,
            JobPayload::ValidateEmbeddings { product_ids } => {
                self.handle_validate(product_ids.as_deref()).await
            }
        }
    }

    async fn handle_single(&self, product_id: &str) -> Result<JobResult, ProcessorError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| ProcessorError::ProductNotFound(product_id.to_string()))?;

        let embedding = self.embeddings.embed(&product.embedding_text()).await?;
        self.store
            .store_embedding(&product.id, &embedding.vector)
            .await?;

        Ok(self.success_result(1, embedding.tokens_used, Vec::new()))
    }

    async fn handle_batch(
        &self,
        job_id: &str,
        product_ids: &[String],
        batch_size: Option<usize>,
    ) -> Result<JobResult, ProcessorError> {
        let chunk_size = resolve_chunk_size(batch_size);
        let total = product_ids.len() as u64;

        let mut processed = 0u64;
        let mut failed = 0u64;
        let mut tokens = 0u64;
        let mut errors = Vec::new();

        // Chunks run strictly sequentially to bound embedding-API
        // concurrency and keep progress deterministic.
        for (index, chunk) in product_ids.chunks(chunk_size).enumerate() {
            match self.embed_chunk_by_ids(chunk).await {
                Ok(chunk_tokens) => {
                    processed += chunk.len() as u64;
                    tokens += chunk_tokens;
                }
                Err(e) => {
                    failed += chunk.len() as u64;
                    errors.push(format!("chunk {}: {}", index + 1, e));
                    tracing::warn!(
                        job_id,
                        chunk = index + 1,
                        error = %e,
                        "Chunk failed, continuing with remaining chunks"
                    );
                }
            }

            self.progress
                .publish(
                    job_id,
                    &JobProgress::new(processed + failed, total, tokens, failed),
                )
                .await;
        }

        Ok(self.batch_result(processed, failed, tokens, errors))
    }

    async fn handle_backfill(
        &self,
        job_id: &str,
        limit: Option<usize>,
        batch_size: Option<usize>,
    ) -> Result<JobResult, ProcessorError> {
        let limit = limit.unwrap_or(MAX_BACKFILL_LIMIT).min(MAX_BACKFILL_LIMIT);
        let chunk_size = resolve_chunk_size(batch_size);

        let products = self.store.products_missing_embeddings(limit as i64).await?;
        let total = products.len() as u64;
        tracing::info!(job_id, candidates = total, "Backfill selected products without embeddings");

        let mut processed = 0u64;
        let mut failed = 0u64;
        let mut tokens = 0u64;
        let mut errors = Vec::new();

        for (index, chunk) in products.chunks(chunk_size).enumerate() {
            match self.embed_products(chunk).await {
                Ok(chunk_tokens) => {
                    processed += chunk.len() as u64;
                    tokens += chunk_tokens;
                }
                Err(e) => {
                    failed += chunk.len() as u64;
                    errors.push(format!("chunk {}: {}", index + 1, e));
                }
            }

            self.progress
                .publish(
                    job_id,
                    &JobProgress::new(processed + failed, total, tokens, failed),
                )
                .await;
        }

        Ok(self.batch_result(processed, failed, tokens, errors))
    }

    async fn handle_update(&self, product_id: &str) -> Result<JobResult, ProcessorError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| ProcessorError::ProductNotFound(product_id.to_string()))?;

        // Drop any cached vector before regenerating from current fields.
        let cache_key = format!("{EMBEDDING_CACHE_PREFIX}{product_id}");
        if let Err(e) = self.cache.delete(&cache_key).await {
            tracing::warn!(product_id, error = %e, "Failed to invalidate cached embedding");
        }

        let embedding = self.embeddings.embed(&product.embedding_text()).await?;
        self.store
            .store_embedding(&product.id, &embedding.vector)
            .await?;

        Ok(self.success_result(1, embedding.tokens_used, Vec::new()))
    }

    async fn handle_validate(
        &self,
        product_ids: Option<&[String]>,
    ) -> Result<JobResult, ProcessorError> {
        let results = match product_ids {
            Some(ids) => self.validator.validate_products(ids).await?,
            None => self.validator.validate_corpus().await?,
        };

        let errors: Vec<String> = results
            .iter()
            .filter(|r| !r.is_valid)
            .map(|r| format!("{}: {}", r.product_id, r.issues.join(", ")))
            .collect();
        let failed = errors.len() as u64;
        let processed = results.len() as u64 - failed;

        Ok(JobResult {
            success: failed == 0,
            processed_count: processed,
            failed_count: failed,
            total_tokens_used: 0,
            estimated_cost: 0.0,
            errors,
            duration_ms: 0,
        })
    }

    /// Fetch a chunk of products by id and embed them in one API call.
    async fn embed_chunk_by_ids(&self, ids: &[String]) -> Result<u64, ProcessorError> {
        let products = self.store.get_products(ids).await?;
        if products.is_empty() {
            return Err(ProcessorError::EmptyChunk);
        }
        self.embed_products(&products).await
    }

    /// Embed a chunk of already-fetched products; returns tokens used.
    async fn embed_products(&self, products: &[Product]) -> Result<u64, ProcessorError> {
        let texts: Vec<String> = products.iter().map(|p| p.embedding_text()).collect();
        let batch = self.embeddings.embed_batch(&texts).await?;
        for (product, vector) in products.iter().zip(batch.vectors.iter()) {
            self.store.store_embedding(&product.id, vector).await?;
        }
        Ok(batch.tokens_used)
    }

    fn success_result(&self, processed: u64, tokens: u64, errors: Vec<String>) -> JobResult {
        JobResult {
            success: true,
            processed_count: processed,
            failed_count: 0,
            total_tokens_used: tokens,
            estimated_cost: self.costs.calculate_cost(tokens),
            errors,
            duration_ms: 0,
        }
    }

    fn batch_result(
        &self,
        processed: u64,
        failed: u64,
        tokens: u64,
        errors: Vec<String>,
    ) -> JobResult {
        JobResult {
            success: failed == 0,
            processed_count: processed,
            failed_count: failed,
            total_tokens_used: tokens,
            estimated_cost: self.costs.calculate_cost(tokens),
            errors,
            duration_ms: 0,
        }
    }
}

/// Default 50, hard cap 100, minimum 1.
fn resolve_chunk_size(batch_size: Option<usize>) -> usize {
    batch_size.unwrap_or(DEFAULT_CHUNK_SIZE).clamp(1, MAX_CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cost::Budgets;
    use crate::models::job::{JobPriority, JobProgress};
    use crate::models::validation::{DimensionMismatch, EXPECTED_DIMENSIONS};
    use crate::services::cache::memory::MemoryCache;
    use crate::services::embeddings::{Embedding, EmbeddingBatch};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory product store.
    #[derive(Default)]
    struct FakeStore {
        products: Mutex<HashMap<String, Product>>,
        embeddings: Mutex<HashMap<String, Vec<f32>>>,
    }

    impl FakeStore {
        fn with_products(ids: &[&str]) -> Self {
            let store = Self::default();
            {
                let mut products = store.products.lock().unwrap();
                for id in ids {
                    products.insert(
                        id.to_string(),
                        Product {
                            id: id.to_string(),
                            title: format!("Gift {id}"),
                            description: "A thoughtful present".to_string(),
                            category: Some("gadgets".to_string()),
                        },
                    );
                }
            }
            store
        }

        fn set_embedding(&self, id: &str, vector: Vec<f32>) {
            self.embeddings.lock().unwrap().insert(id.to_string(), vector);
        }
    }

    #[async_trait]
    impl ProductStore for FakeStore {
        async fn get_product(&self, id: &str) -> Result<Option<Product>, sqlx::Error> {
            Ok(self.products.lock().unwrap().get(id).cloned())
        }

        async fn get_products(&self, ids: &[String]) -> Result<Vec<Product>, sqlx::Error> {
            let products = self.products.lock().unwrap();
            Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
        }

        async fn products_missing_embeddings(
            &self,
            limit: i64,
        ) -> Result<Vec<Product>, sqlx::Error> {
            let embeddings = self.embeddings.lock().unwrap();
            let mut missing: Vec<Product> = self
                .products
                .lock()
                .unwrap()
                .values()
                .filter(|p| !embeddings.contains_key(&p.id))
                .cloned()
                .collect();
            missing.sort_by(|a, b| a.id.cmp(&b.id));
            missing.truncate(limit as usize);
            Ok(missing)
        }

        async fn store_embedding(&self, id: &str, embedding: &[f32]) -> Result<(), sqlx::Error> {
            self.embeddings
                .lock()
                .unwrap()
                .insert(id.to_string(), embedding.to_vec());
            Ok(())
        }

        async fn fetch_embedding(&self, id: &str) -> Result<Option<Vec<f32>>, sqlx::Error> {
            Ok(self.embeddings.lock().unwrap().get(id).cloned())
        }

        async fn embedding_coverage(&self, limit: i64) -> Result<(u64, u64), sqlx::Error> {
            let total = self.products.lock().unwrap().len().min(limit as usize) as u64;
            let with = self.embeddings.lock().unwrap().len() as u64;
            Ok((total, with.min(total)))
        }

        async fn dimension_mismatches(
            &self,
            expected: i32,
            _limit: i64,
        ) -> Result<Vec<DimensionMismatch>, sqlx::Error> {
            Ok(self
                .embeddings
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, v)| v.len() != expected as usize)
                .map(|(id, v)| DimensionMismatch {
                    product_id: id.clone(),
                    dimensions: v.len(),
                    expected_dimensions: expected as usize,
                })
                .collect())
        }

        async fn ids_with_embeddings(&self, limit: i64) -> Result<Vec<String>, sqlx::Error> {
            let mut ids: Vec<String> = self.embeddings.lock().unwrap().keys().cloned().collect();
            ids.sort();
            ids.truncate(limit as usize);
            Ok(ids)
        }
    }

    /// Embedding backend that can be told to fail the nth batch call.
    #[derive(Default)]
    struct FakeBackend {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        tokens_per_text: u64,
    }

    impl FakeBackend {
        fn new(tokens_per_text: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on_call: None,
                tokens_per_text,
            }
        }

        fn failing_on(call: usize, tokens_per_text: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on_call: Some(call),
                tokens_per_text,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingBackend for FakeBackend {
        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(EmbeddingError::CountMismatch { expected: 1, got: 0 });
            }
            Ok(Embedding {
                vector: vec![0.1; EXPECTED_DIMENSIONS],
                tokens_used: self.tokens_per_text,
            })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    got: 0,
                });
            }
            Ok(EmbeddingBatch {
                vectors: vec![vec![0.1; EXPECTED_DIMENSIONS]; texts.len()],
                tokens_used: self.tokens_per_text * texts.len() as u64,
            })
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        updates: Mutex<Vec<JobProgress>>,
    }

    #[async_trait]
    impl ProgressSink for CollectingSink {
        async fn publish(&self, _job_id: &str, progress: &JobProgress) {
            self.updates.lock().unwrap().push(progress.clone());
        }
    }

    struct Harness {
        processor: JobProcessor,
        store: Arc<FakeStore>,
        backend: Arc<FakeBackend>,
        sink: Arc<CollectingSink>,
        costs: Arc<CostTracker>,
        monitor: Arc<MonitoringService>,
        cache: Arc<MemoryCache>,
    }

    fn harness(store: FakeStore, backend: FakeBackend) -> Harness {
        let store = Arc::new(store);
        let backend = Arc::new(backend);
        let sink = Arc::new(CollectingSink::default());
        let cache = Arc::new(MemoryCache::default());
        let costs = Arc::new(CostTracker::new(
            0.02,
            120,
            Budgets {
                daily_budget: 1.0,
                monthly_budget: 20.0,
            },
            cache.clone(),
        ));
        let monitor = Arc::new(MonitoringService::new(cache.clone()));
        let validator = Arc::new(ValidationService::new(store.clone()));
        let processor = JobProcessor::new(
            store.clone(),
            backend.clone(),
            costs.clone(),
            monitor.clone(),
            validator,
            cache.clone(),
            sink.clone(),
        );
        Harness {
            processor,
            store,
            backend,
            sink,
            costs,
            monitor,
            cache,
        }
    }

    fn job(id: &str, payload: JobPayload) -> QueuedJob {
        QueuedJob {
            id: id.to_string(),
            payload,
            priority: JobPriority::Normal,
            attempts: 1,
            max_attempts: 3,
            created_at: Utc::now(),
            requested_by: None,
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i:03}")).collect()
    }

    #[tokio::test]
    async fn single_job_embeds_and_records_cost() {
        let h = harness(FakeStore::with_products(&["p1"]), FakeBackend::new(100));
        let result = h
            .processor
            .process(&job(
                "embed-product-p1",
                JobPayload::GenerateEmbedding {
                    product_id: "p1".to_string(),
                },
            ))
            .await;

        assert!(result.success);
        assert_eq!(result.processed_count, 1);
        assert_eq!(result.total_tokens_used, 100);
        assert!(h.store.fetch_embedding("p1").await.unwrap().is_some());
        assert_eq!(h.costs.session_costs().total_tokens, 100);
        assert_eq!(h.monitor.snapshot().jobs_processed, 1);
    }

    #[tokio::test]
    async fn missing_product_becomes_failed_result_not_panic() {
        let h = harness(FakeStore::default(), FakeBackend::new(100));
        let result = h
            .processor
            .process(&job(
                "embed-product-ghost",
                JobPayload::GenerateEmbedding {
                    product_id: "ghost".to_string(),
                },
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.processed_count, 0);
        assert_eq!(result.failed_count, 1);
        assert!(result.errors[0].contains("ghost"));
        assert_eq!(h.monitor.snapshot().jobs_failed, 1);
        // Failed jobs route no tokens to the cost tracker.
        assert_eq!(h.costs.session_costs().records, 0);
    }

    #[tokio::test]
    async fn batch_splits_25_products_into_3_chunks_with_increasing_progress() {
        let id_list = ids(25);
        let id_refs: Vec<&str> = id_list.iter().map(|s| s.as_str()).collect();
        let h = harness(FakeStore::with_products(&id_refs), FakeBackend::new(10));

        let result = h
            .processor
            .process(&job(
                "batch-1",
                JobPayload::BatchGenerate {
                    product_ids: id_list,
                    batch_size: Some(10),
                },
            ))
            .await;

        assert!(result.success);
        assert_eq!(result.processed_count, 25);
        assert_eq!(result.failed_count, 0);
        assert_eq!(h.backend.call_count(), 3);
        // 25 texts at 10 tokens each across chunks of 10, 10, 5.
        assert_eq!(result.total_tokens_used, 250);

        let updates = h.sink.updates.lock().unwrap();
        let percentages: Vec<u32> = updates.iter().map(|p| p.percentage).collect();
        assert_eq!(percentages, vec![40, 80, 100]);
        assert!(percentages.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn failed_chunk_does_not_abort_remaining_chunks() {
        let id_list = ids(25);
        let id_refs: Vec<&str> = id_list.iter().map(|s| s.as_str()).collect();
        let h = harness(
            FakeStore::with_products(&id_refs),
            FakeBackend::failing_on(2, 10),
        );

        let result = h
            .processor
            .process(&job(
                "batch-2",
                JobPayload::BatchGenerate {
                    product_ids: id_list,
                    batch_size: Some(10),
                },
            ))
            .await;

        // Chunks 1 and 3 still execute; chunk 2's 10 products count as failed.
        assert_eq!(h.backend.call_count(), 3);
        assert!(!result.success);
        assert_eq!(result.processed_count, 15);
        assert_eq!(result.failed_count, 10);
        assert_eq!(result.processed_count + result.failed_count, 25);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("chunk 2:"));

        // Progress still reaches 100% and stays monotone.
        let updates = h.sink.updates.lock().unwrap();
        let percentages: Vec<u32> = updates.iter().map(|p| p.percentage).collect();
        assert_eq!(*percentages.last().unwrap(), 100);
        assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(updates.last().unwrap().errors, 10);
    }

    #[tokio::test]
    async fn backfill_embeds_only_missing_products() {
        let h = harness(
            FakeStore::with_products(&["a", "b", "c", "d"]),
            FakeBackend::new(10),
        );
        h.store.set_embedding("a", vec![0.1; EXPECTED_DIMENSIONS]);

        let result = h
            .processor
            .process(&job(
                "backfill-1",
                JobPayload::BackfillMissing {
                    limit: None,
                    batch_size: Some(2),
                },
            ))
            .await;

        assert!(result.success);
        assert_eq!(result.processed_count, 3);
        for id in ["b", "c", "d"] {
            assert!(h.store.fetch_embedding(id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn update_invalidates_cached_embedding_and_regenerates() {
        let h = harness(FakeStore::with_products(&["p1"]), FakeBackend::new(50));
        h.cache
            .set_raw("embeddings:cache:p1", "stale", 60)
            .await
            .unwrap();

        let result = h
            .processor
            .process(&job(
                "update-1",
                JobPayload::UpdateEmbedding {
                    product_id: "p1".to_string(),
                },
            ))
            .await;

        assert!(result.success);
        assert!(h.cache.get_raw("embeddings:cache:p1").await.unwrap().is_none());
        assert!(h.store.fetch_embedding("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn validate_surfaces_invalid_embeddings_as_errors() {
        let h = harness(FakeStore::with_products(&["good", "short"]), FakeBackend::new(10));
        h.store.set_embedding("good", vec![0.5; EXPECTED_DIMENSIONS]);
        h.store.set_embedding("short", vec![0.5; 512]);

        let result = h
            .processor
            .process(&job(
                "validate-1",
                JobPayload::ValidateEmbeddings {
                    product_ids: Some(vec!["good".to_string(), "short".to_string()]),
                },
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.processed_count, 1);
        assert_eq!(result.failed_count, 1);
        assert!(result.errors[0].starts_with("short: "));
        assert!(result.errors[0].contains("dimension mismatch"));
        // Validation uses no tokens, so nothing reaches the cost tracker.
        assert_eq!(h.costs.session_costs().records, 0);
    }

    #[tokio::test]
    async fn validate_success_with_zero_invalid() {
        let h = harness(FakeStore::with_products(&["p1"]), FakeBackend::new(10));
        h.store.set_embedding("p1", vec![0.5; EXPECTED_DIMENSIONS]);

        let result = h
            .processor
            .process(&job(
                "validate-2",
                JobPayload::ValidateEmbeddings { product_ids: None },
            ))
            .await;

        assert!(result.success);
        assert_eq!(result.failed_count, 0);
    }

    #[test]
    fn chunk_size_defaults_and_clamps() {
        assert_eq!(resolve_chunk_size(None), DEFAULT_CHUNK_SIZE);
        assert_eq!(resolve_chunk_size(Some(0)), 1);
        assert_eq!(resolve_chunk_size(Some(500)), MAX_CHUNK_SIZE);
        assert_eq!(resolve_chunk_size(Some(25)), 25);
    }
}
