use embedding_pipeline::{
    config::AppConfig,
    db::{self, products::ProductStore},
    models::job::{JobOptions, JobPayload, JobPriority, JobResult, JobStatus},
    models::validation::EXPECTED_DIMENSIONS,
    services::{queue::JobQueue, validation::ValidationService},
};
use std::sync::Arc;
use uuid::Uuid;

/// Integration test: full pipeline round-trip
///
/// This test verifies the complete integration:
/// 1. Database connection and schema (pgvector migration applied)
/// 2. Product store (embedding write/read, coverage)
/// 3. Job queue (enqueue/dequeue/complete, pause/resume)
/// 4. Validation against stored embeddings
///
/// Note: This requires a running PostgreSQL (with the vector extension
/// available) and Redis instance configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    // Load config from environment
    let config = AppConfig::from_env().expect("Failed to load config");

    // Initialize database
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(db::products::PgProductStore::new(db_pool.clone()));
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");

    // Test data: one product with a well-formed stored embedding
    let product_id = format!("it-{}", Uuid::new_v4());
    sqlx::query(
        "INSERT INTO products (id, title, description, category)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&product_id)
    .bind("Ceramic pour-over coffee set")
    .bind("Hand-glazed dripper and carafe for slow mornings")
    .bind("kitchen")
    .execute(&db_pool)
    .await
    .expect("Failed to insert test product");

    // 1. Test embedding store round-trip
    let mut embedding = vec![0.0f32; EXPECTED_DIMENSIONS];
    embedding[0] = 1.0;
    store
        .store_embedding(&product_id, &embedding)
        .await
        .expect("Failed to store embedding");

    let fetched = store
        .fetch_embedding(&product_id)
        .await
        .expect("Failed to fetch embedding")
        .expect("Embedding not found");
    assert_eq!(fetched.len(), EXPECTED_DIMENSIONS);
    assert_eq!(fetched[0], 1.0);

    // 2. Test validation against the stored embedding
    let validator = ValidationService::new(store.clone());
    let validation = validator
        .validate_product(&product_id)
        .await
        .expect("Validation query failed");
    assert!(validation.is_valid, "issues: {:?}", validation.issues);

    // 3. Test queue enqueue/dequeue round-trip
    let job_id = format!("it-job-{}", Uuid::new_v4());
    let payload = JobPayload::GenerateEmbedding {
        product_id: product_id.clone(),
    };
    let enqueued = queue
        .enqueue(&payload, &job_id, JobPriority::Critical, &JobOptions::default())
        .await
        .expect("Failed to enqueue");
    assert!(enqueued);

    // Re-enqueueing the same non-terminal id is a no-op
    let deduplicated = queue
        .enqueue(&payload, &job_id, JobPriority::Critical, &JobOptions::default())
        .await
        .expect("Failed to re-enqueue");
    assert!(!deduplicated);

    // Backlog (waiting + delayed) now includes our job
    let depth = queue.queue_depth().await.expect("Failed to read depth");
    assert!(depth >= 1);

    // 4. Test pause: a paused queue yields no jobs, the backlog stays put
    queue.pause().await.expect("Failed to pause");
    assert!(queue.is_paused().await.expect("Failed to read pause flag"));
    assert!(queue.dequeue().await.expect("Dequeue failed").is_none());
    assert_eq!(queue.queue_depth().await.expect("Failed to read depth"), depth);
    queue.resume().await.expect("Failed to resume");

    // 5. Dequeue: Critical priority means our job surfaces promptly
    let mut job = None;
    for _ in 0..50 {
        match queue.dequeue().await.expect("Dequeue failed") {
            Some(j) if j.id == job_id => {
                job = Some(j);
                break;
            }
            // Another test's job; complete it out of the way
            Some(j) => {
                queue
                    .complete(&j.id, &JobResult::default())
                    .await
                    .expect("Failed to complete stray job");
            }
            None => break,
        }
    }
    let job = job.expect("Enqueued job never dequeued");
    assert_eq!(job.attempts, 1);
    assert!(matches!(job.payload, JobPayload::GenerateEmbedding { .. }));

    // 6. Complete and verify terminal status
    let result = JobResult {
        success: true,
        processed_count: 1,
        failed_count: 0,
        total_tokens_used: 42,
        estimated_cost: 0.0000084,
        errors: vec![],
        duration_ms: 5,
    };
    queue
        .complete(&job_id, &result)
        .await
        .expect("Failed to complete");

    let record = queue
        .get_job(&job_id)
        .await
        .expect("Failed to load job")
        .expect("Job record missing");
    assert_eq!(record.status, JobStatus::Completed);
    let stored_result = record.result.expect("Completed job has no result");
    assert!(stored_result.success);
    assert_eq!(stored_result.processed_count, 1);

    // 7. Coverage now includes our product
    let report = validator.coverage().await.expect("Coverage query failed");
    assert!(report.with_embedding >= 1);

    // Cleanup
    queue.remove(&job_id).await.expect("Failed to remove job");
    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(&product_id)
        .execute(&db_pool)
        .await
        .expect("Failed to delete test product");
}
