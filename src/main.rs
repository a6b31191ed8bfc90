mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use models::cost::Budgets;
use services::{
    cache::RedisCache, cost::CostTracker, jobs::JobService, monitoring::MonitoringService,
    queue::JobQueue, validation::ValidationService,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing embedding-pipeline server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "embedding_jobs_processed_total",
        "Total embedding jobs processed"
    );
    metrics::describe_counter!(
        "embedding_jobs_failed_total",
        "Total embedding jobs that failed"
    );
    metrics::describe_counter!(
        "embedding_tokens_used_total",
        "Total embedding-API tokens consumed"
    );
    metrics::describe_histogram!(
        "embedding_job_duration_seconds",
        "Time to process an embedding job"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue and durable cache
    tracing::info!("Connecting to Redis");
    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));
    let cache: Arc<RedisCache> =
        Arc::new(RedisCache::new(&config.redis_url).expect("Failed to initialize cache"));

    // Initialize services
    let store = Arc::new(db::products::PgProductStore::new(db_pool.clone()));
    let jobs = Arc::new(JobService::new(queue.clone()));
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
    let validator = Arc::new(ValidationService::new(store));

    // Best-effort restore of persisted aggregates
    costs.restore().await;
    monitor.restore().await;

    // Create shared application state
    let state = AppState::new(db_pool, queue, jobs, costs, monitor, validator);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Job creation
        .route(
            "/api/v1/jobs/products/{product_id}",
            post(routes::jobs::create_product_job),
        )
        .route(
            "/api/v1/jobs/products/{product_id}/update",
            post(routes::jobs::create_update_job),
        )
        .route("/api/v1/jobs/batch", post(routes::jobs::create_batch_job))
        .route(
            "/api/v1/jobs/backfill",
            post(routes::jobs::create_backfill_job),
        )
        .route(
            "/api/v1/jobs/validate",
            post(routes::jobs::create_validate_job),
        )
        // Job queries and control
        .route("/api/v1/jobs/stats", get(routes::jobs::queue_stats))
        .route("/api/v1/jobs/active", get(routes::jobs::active_jobs))
        .route("/api/v1/jobs/failed", get(routes::jobs::failed_jobs))
        .route("/api/v1/jobs/{id}", get(routes::jobs::get_job))
        .route("/api/v1/jobs/{id}", delete(routes::jobs::remove_job))
        .route(
            "/api/v1/jobs/{id}/progress",
            get(routes::jobs::get_job_progress),
        )
        .route("/api/v1/jobs/{id}/retry", post(routes::jobs::retry_job))
        .route("/api/v1/queue/pause", post(routes::jobs::pause_queue))
        .route("/api/v1/queue/resume", post(routes::jobs::resume_queue))
        // Costs and budgets
        .route("/api/v1/costs/session", get(routes::costs::session_costs))
        .route("/api/v1/costs/daily", get(routes::costs::daily_costs))
        .route("/api/v1/costs/monthly", get(routes::costs::monthly_costs))
        .route(
            "/api/v1/costs/breakdown",
            get(routes::costs::monthly_breakdown),
        )
        .route(
            "/api/v1/costs/projection",
            get(routes::costs::monthly_projection),
        )
        .route("/api/v1/costs/budget", get(routes::costs::get_budget))
        .route("/api/v1/costs/budget", put(routes::costs::set_budget))
        .route("/api/v1/costs/estimate", get(routes::costs::estimate_batch))
        // Pipeline metrics
        .route("/api/v1/metrics", get(routes::metrics::pipeline_metrics))
        .route(
            "/api/v1/metrics/health",
            get(routes::metrics::pipeline_health),
        )
        .route("/api/v1/metrics/reset", post(routes::metrics::reset_metrics))
        // Embedding validation
        .route("/api/v1/validation/coverage", get(routes::validation::coverage))
        .route(
            "/api/v1/validation/mismatches",
            get(routes::validation::dimension_mismatches),
        )
        .route(
            "/api/v1/validation/products/{product_id}",
            get(routes::validation::validate_product),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)); // 2 MB limit

    tracing::info!("Starting embedding-pipeline on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
