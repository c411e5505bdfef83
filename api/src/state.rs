use std::sync::Arc;

use common::config::Settings;
use common::db::DbPool;
use common::scheduler::SchedulingCoordinator;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SchedulingCoordinator>,
    /// Absent when running against in-memory stores
    pub db_pool: Option<DbPool>,
    pub config: Arc<Settings>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<SchedulingCoordinator>,
        db_pool: Option<DbPool>,
        config: Settings,
    ) -> Self {
        Self {
            coordinator,
            db_pool,
            config: Arc::new(config),
        }
    }
}
