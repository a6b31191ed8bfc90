use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{
    cost::CostTracker, jobs::JobService, monitoring::MonitoringService, queue::JobQueue,
    validation::ValidationService,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub jobs: Arc<JobService>,
    pub costs: Arc<CostTracker>,
    pub monitor: Arc<MonitoringService>,
    pub validator: Arc<ValidationService>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        queue: Arc<JobQueue>,
        jobs: Arc<JobService>,
        costs: Arc<CostTracker>,
        monitor: Arc<MonitoringService>,
        validator: Arc<ValidationService>,
    ) -> Self {
        Self {
            db,
            queue,
            jobs,
            costs,
            monitor,
            validator,
        }
    }
}
