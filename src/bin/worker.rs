use embedding_pipeline::{
    config::AppConfig,
    db,
    models::cost::Budgets,
    models::job::retry_on_failure,
    services::{
        cache::RedisCache, cost::CostTracker, embeddings::EmbeddingClient,
        monitoring::MonitoringService, processor::JobProcessor, queue::FailOutcome,
        queue::JobQueue, validation::ValidationService,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting embedding worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));
    let cache: Arc<RedisCache> =
        Arc::new(RedisCache::new(&config.redis_url).expect("Failed to initialize cache"));

    let store = Arc::new(db::products::PgProductStore::new(db_pool));
    let embeddings = Arc::new(EmbeddingClient::new(
        &config.embedding_api_base,
        &config.embedding_api_key,
        &config.embedding_model,
    ));
    let costs = Arc::new(CostTracker::new(
        config.price_per_million_tokens,
        config.avg_tokens_per_product,
        Budgets {
            daily_budget: config.daily_budget,
            monthly_budget: config.monthly_budget,
        },
        cache.clone(),
    ));
    let monitor = Arc::new(MonitoringService::new(cache.clone()));
    let validator = Arc::new(ValidationService::new(store.clone()));

    // Restore persisted cost and metrics aggregates from previous runs
    costs.restore().await;
    monitor.restore().await;

    let processor = Arc::new(JobProcessor::new(
        store,
        embeddings,
        costs,
        monitor,
        validator,
        cache,
        queue.clone(),
    ));

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Worker ready, starting job processing loops"
    );

    // Spawn independent dequeue loops up to the configured concurrency.
    // Each loop polls the shared queue; idle loops back off for a second.
    let mut handles = Vec::with_capacity(config.worker_concurrency);
    for loop_id in 0..config.worker_concurrency {
        let queue = queue.clone();
        let processor = processor.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match process_next_job(&queue, &processor).await {
                    Ok(true) => {
                        tracing::debug!(loop_id, "Job processed, checking for next job");
                    }
                    Ok(false) => {
                        tracing::trace!(loop_id, "No jobs available, sleeping");
                        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                    }
                    Err(e) => {
                        tracing::error!(loop_id, error = %e, "Error processing job, will retry");
                        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                    }
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker loop exited");
        }
    }
}

/// Process the next job from the queue.
/// Returns Ok(true) if a job was processed, Ok(false) if no job available.
async fn process_next_job(
    queue: &JobQueue,
    processor: &JobProcessor,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    // Dequeue next job (respects pause flag and promotes due delayed jobs)
    let job = match queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false), // No job available
    };

    let result = processor.process(&job).await;

    if result.success {
        queue.complete(&job.id, &result).await?;
        return Ok(true);
    }

    // Failed job: re-delay with backoff when the job kind is retryable,
    // otherwise record the partial result terminally.
    let error = result
        .errors
        .first()
        .cloned()
        .unwrap_or_else(|| "job failed".to_string());
    let allow_retry = retry_on_failure(job.payload.kind());

    match queue.fail(&job.id, &error, Some(&result), allow_retry).await? {
        FailOutcome::Retried { delay_ms } => {
            tracing::info!(
                job_id = %job.id,
                attempt = job.attempts,
                delay_ms,
                "Job re-queued for retry"
            );
        }
        FailOutcome::Terminal => {
            tracing::warn!(
                job_id = %job.id,
                attempt = job.attempts,
                error = %error,
                "Job failed terminally"
            );
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>(_: T) {}

    // The dequeue loops run inside tokio::spawn, which requires the polling
    // future (including its error type) to be Send.
    #[allow(dead_code)]
    fn polling_future_is_send(queue: &JobQueue, processor: &JobProcessor) {
        assert_send(process_next_job(queue, processor));
    }

    #[test]
    fn poll_interval_is_one_second() {
        assert_eq!(POLL_INTERVAL_MS, 1000);
    }
}
