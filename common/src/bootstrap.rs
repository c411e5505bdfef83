// Bootstrap utilities shared by the api and scheduler binaries

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::db::repositories::{AccountRepository, ContentRepository, ScheduledJobRepository};
use crate::db::DbPool;
use crate::platforms::AdapterRegistry;
use crate::publishing::{PublishingConfig, PublishingCoordinator};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryExecutor;
use crate::scheduler::{SchedulerConfig, SchedulingCoordinator};
use crate::store::{AccountStore, ContentStore, ScheduledJobStore};
use crate::token::OAuthTokenProvider;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialize the database pool and apply pending migrations
///
/// # Errors
/// Returns error if the pool cannot connect or a migration fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    db_pool
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Stores the coordinators are built over
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn ScheduledJobStore>,
    pub contents: Arc<dyn ContentStore>,
    pub accounts: Arc<dyn AccountStore>,
}

impl Stores {
    pub fn postgres(db_pool: &DbPool) -> Self {
        Self {
            jobs: Arc::new(ScheduledJobRepository::new(db_pool.clone())),
            contents: Arc::new(ContentRepository::new(db_pool.clone())),
            accounts: Arc::new(AccountRepository::new(db_pool.clone())),
        }
    }
}

/// Wire the publishing pipeline and the scheduling coordinator from settings
///
/// # Errors
/// Returns error if an HTTP client for a platform or the token provider
/// cannot be built
pub fn build_scheduling_coordinator(
    settings: &Settings,
    stores: Stores,
    clock: Arc<dyn Clock>,
) -> Result<Arc<SchedulingCoordinator>> {
    let publishing = &settings.publishing;

    let adapters = AdapterRegistry::from_settings(&settings.platforms, publishing.call_timeout())
        .context("Failed to build platform adapters")?;
    info!(platforms = ?adapters.platforms(), "Platform adapters registered");

    let tokens = OAuthTokenProvider::from_settings(
        &settings.platforms,
        stores.accounts.clone(),
        clock.clone(),
        chrono::Duration::seconds(publishing.token_refresh_skew_seconds),
        publishing.call_timeout(),
    )
    .context("Failed to build OAuth token provider")?;

    let publisher = Arc::new(PublishingCoordinator::new(
        stores.contents,
        stores.accounts,
        Arc::new(tokens),
        adapters,
        Arc::new(RetryExecutor::new(clock.clone())),
        Arc::new(RateLimiter::new(
            publishing.rate_limit_config(),
            clock.clone(),
        )),
        clock.clone(),
        PublishingConfig::from_settings(publishing),
    ));

    Ok(Arc::new(SchedulingCoordinator::new(
        stores.jobs,
        publisher,
        clock,
        SchedulerConfig::from_settings(&settings.scheduler),
    )))
}

/// Connect to Postgres and build the coordinator against the system clock
pub async fn init_scheduling_coordinator(
    settings: &Settings,
) -> Result<(DbPool, Arc<SchedulingCoordinator>)> {
    let db_pool = init_database_pool(settings).await?;
    let coordinator = build_scheduling_coordinator(
        settings,
        Stores::postgres(&db_pool),
        Arc::new(SystemClock),
    )?;
    Ok((db_pool, coordinator))
}
