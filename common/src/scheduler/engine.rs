// Scheduling coordinator implementation

use crate::clock::Clock;
use crate::config::SchedulerSettings;
use crate::db::repositories::STALE_CLAIM_ERROR;
use crate::errors::{PublishError, SchedulerError, StoreError};
use crate::models::{
    ContentStatus, ContentStatusUpdate, JobResolution, JobStatus, NewScheduledJob,
    ProcessSummary, PublishResult, ScheduledJob,
};
use crate::publishing::PublishingCoordinator;
use crate::store::ScheduledJobStore;
use crate::telemetry;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Configuration for the scheduling coordinator
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs claimed per invocation
    pub batch_limit: u32,
    /// Claimed jobs processed at the same time
    pub worker_concurrency: usize,
    /// Jobs left in `publishing` longer than this are failed as interrupted
    pub claim_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            worker_concurrency: 8,
            claim_timeout: Duration::from_secs(900),
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self {
            batch_limit: settings.batch_limit,
            worker_concurrency: settings.worker_concurrency.max(1),
            claim_timeout: Duration::from_secs(settings.claim_timeout_seconds),
        }
    }
}

/// Turns due scheduled jobs into publications and owns the user-facing
/// scheduling operations
pub struct SchedulingCoordinator {
    jobs: Arc<dyn ScheduledJobStore>,
    publisher: Arc<PublishingCoordinator>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl SchedulingCoordinator {
    pub fn new(
        jobs: Arc<dyn ScheduledJobStore>,
        publisher: Arc<PublishingCoordinator>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            jobs,
            publisher,
            clock,
            config,
        }
    }

    pub fn publisher(&self) -> &Arc<PublishingCoordinator> {
        &self.publisher
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current instant on the coordinator's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Claim every job due at `now` and publish it
    ///
    /// Only a failed claim fails the invocation. Each claimed job ends up
    /// `published` or `failed` on its own; one job never aborts the batch.
    #[instrument(skip(self), fields(batch_limit = self.config.batch_limit))]
    pub async fn process_due_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ProcessSummary, SchedulerError> {
        let recovered = self.recover_stale_claims(now).await;

        let swept = self.publisher.rate_limiter().sweep().await;
        if swept > 0 {
            debug!(swept, "Dropped idle rate limit windows");
        }

        let claimed = match self.jobs.claim_due(now, self.config.batch_limit).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to claim due jobs");
                return Err(e.into());
            }
        };
        telemetry::update_claimed_batch(claimed.len());

        let mut summary = ProcessSummary {
            claimed: claimed.len(),
            recovered,
            ..ProcessSummary::default()
        };
        if claimed.is_empty() {
            debug!("No scheduled jobs due");
            return Ok(summary);
        }

        let outcomes: Vec<JobStatus> = stream::iter(claimed)
            .map(|job| self.process_job(job))
            .buffer_unordered(self.config.worker_concurrency.max(1))
            .collect()
            .await;

        for status in outcomes {
            match status {
                JobStatus::Published => summary.published += 1,
                _ => summary.failed += 1,
            }
        }

        info!(
            claimed = summary.claimed,
            published = summary.published,
            failed = summary.failed,
            recovered = summary.recovered,
            "Processed due jobs"
        );
        Ok(summary)
    }

    /// Publish one claimed job and record its resolution
    #[instrument(skip(self, job), fields(job_id = %job.id, content_id = %job.content_id))]
    async fn process_job(&self, job: ScheduledJob) -> JobStatus {
        let resolution = match self
            .publisher
            .publish_now(job.user_id, job.content_id, &job.account_ids)
            .await
        {
            Ok(results) => JobResolution::from_results(&results),
            Err(e) => {
                warn!(error = %e, "Scheduled publication could not start");
                JobResolution::Failed {
                    error: e.to_string(),
                }
            }
        };

        self.resolve(job.id, resolution).await
    }

    async fn resolve(&self, job_id: Uuid, resolution: JobResolution) -> JobStatus {
        let status = resolution.status();
        if let Err(e) = self
            .jobs
            .mark_result(job_id, resolution, self.clock.now())
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to record job result");
        }
        telemetry::record_job_status(status);
        status
    }

    async fn recover_stale_claims(&self, now: DateTime<Utc>) -> usize {
        let Ok(timeout) = chrono::Duration::from_std(self.config.claim_timeout) else {
            return 0;
        };
        let Some(claimed_before) = now.checked_sub_signed(timeout) else {
            return 0;
        };

        match self.jobs.fail_stale_claims(claimed_before, now).await {
            Ok(stale) => {
                for job in &stale {
                    warn!(job_id = %job.id, claimed_at = ?job.claimed_at, "Failed interrupted job");
                    telemetry::record_job_status(JobStatus::Failed);

                    let update = ContentStatusUpdate::Failed {
                        error: job
                            .last_error
                            .clone()
                            .unwrap_or_else(|| STALE_CLAIM_ERROR.to_string()),
                    };
                    if let Err(e) = self
                        .publisher
                        .contents()
                        .update_content_status(job.content_id, update, now)
                        .await
                    {
                        error!(job_id = %job.id, content_id = %job.content_id, error = %e, "Failed to mark interrupted content failed");
                    }
                }
                stale.len()
            }
            Err(e) => {
                warn!(error = %e, "Failed to recover stale claims");
                0
            }
        }
    }

    /// Run `process_due_jobs` every `poll_interval` until shutdown is signalled
    pub async fn run_trigger_loop(
        &self,
        poll_interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!(
            poll_interval_seconds = poll_interval.as_secs(),
            "Starting scheduling trigger loop"
        );

        let mut ticker = interval(poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.process_due_jobs(self.clock.now()).await {
                        error!(error = %e, "Trigger invocation failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping trigger loop");
                    break;
                }
            }
        }

        info!("Scheduling trigger loop stopped");
    }

    /// Schedule owned content for publication at `scheduled_at`
    #[instrument(skip(self, account_ids), fields(accounts = account_ids.len()))]
    pub async fn schedule(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        account_ids: Vec<Uuid>,
        scheduled_at: DateTime<Utc>,
    ) -> Result<ScheduledJob, SchedulerError> {
        self.ensure_owned_content(user_id, content_id).await?;

        let now = self.clock.now();
        let job = self
            .jobs
            .enqueue(
                NewScheduledJob {
                    user_id,
                    content_id,
                    account_ids,
                    scheduled_at,
                },
                now,
            )
            .await?;

        self.sync_content_schedule(content_id, now).await;
        telemetry::record_job_status(JobStatus::Scheduled);

        info!(job_id = %job.id, scheduled_at = %job.scheduled_at, "Publication scheduled");
        Ok(job)
    }

    /// Cancel a job that has not been claimed
    ///
    /// The content returns to draft once no other scheduled job remains for it.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, job_id: Uuid) -> Result<ScheduledJob, SchedulerError> {
        let now = self.clock.now();
        let job = self.jobs.cancel(user_id, job_id, now).await?;

        self.sync_content_schedule(job.content_id, now).await;
        telemetry::record_job_status(JobStatus::Cancelled);

        info!(job_id = %job.id, "Scheduled job cancelled");
        Ok(job)
    }

    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        new_time: DateTime<Utc>,
    ) -> Result<ScheduledJob, SchedulerError> {
        let now = self.clock.now();
        let job = self.jobs.reschedule(user_id, job_id, new_time, now).await?;

        self.sync_content_schedule(job.content_id, now).await;

        info!(job_id = %job.id, scheduled_at = %job.scheduled_at, "Scheduled job moved");
        Ok(job)
    }

    /// Re-run a failed job for the accounts that have not been published yet
    #[instrument(skip(self))]
    pub async fn retry_job(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> Result<(ScheduledJob, Vec<PublishResult>), SchedulerError> {
        let job = self
            .jobs
            .reclaim_failed(user_id, job_id, self.clock.now())
            .await?;

        let results = match self
            .publisher
            .resume_publication(job.user_id, job.content_id, &job.account_ids)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                self.resolve(
                    job.id,
                    JobResolution::Failed {
                        error: e.to_string(),
                    },
                )
                .await;
                return Err(e.into());
            }
        };

        let resolution = JobResolution::from_results(&results);
        let status = resolution.status();
        let job = self
            .jobs
            .mark_result(job.id, resolution, self.clock.now())
            .await?;
        telemetry::record_job_status(status);

        info!(job_id = %job.id, status = %job.status, retry_count = job.retry_count, "Job retried");
        Ok((job, results))
    }

    /// Retry one account of a publication, then close the content's failed
    /// jobs whose every account is now published
    ///
    /// Closing goes through the regular user-retry transition, so a closed job
    /// ends `published` with its `retry_count` bumped.
    #[instrument(skip(self))]
    pub async fn retry_publication(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        account_id: Uuid,
    ) -> Result<PublishResult, SchedulerError> {
        let result = self
            .publisher
            .retry_publication(user_id, content_id, account_id)
            .await?;

        if result.success {
            if let Err(e) = self.close_published_jobs(user_id, content_id).await {
                error!(content_id = %content_id, error = %e, "Failed to reconcile jobs after account retry");
            }
        }
        Ok(result)
    }

    async fn close_published_jobs(&self, user_id: Uuid, content_id: Uuid) -> Result<(), StoreError> {
        let published: HashSet<Uuid> = self
            .publisher
            .contents()
            .account_outcomes(content_id)
            .await?
            .into_iter()
            .filter(|outcome| outcome.success)
            .map(|outcome| outcome.account_id)
            .collect();

        let failed = self
            .jobs
            .list_for_content(content_id, Some(JobStatus::Failed))
            .await?;

        for job in failed {
            if job.user_id != user_id || !job.account_ids.iter().all(|id| published.contains(id)) {
                continue;
            }

            let now = self.clock.now();
            // A concurrent retry_job may own the job already
            match self.jobs.reclaim_failed(user_id, job.id, now).await {
                Ok(_) => {}
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
            self.jobs
                .mark_result(job.id, JobResolution::Published, now)
                .await?;
            telemetry::record_job_status(JobStatus::Published);
            info!(job_id = %job.id, "Failed job closed by account retry");
        }
        Ok(())
    }

    /// Point the content at its earliest remaining scheduled job
    ///
    /// Runs after the job change is stored, so a failed content write is
    /// logged and the job result still returned.
    async fn sync_content_schedule(&self, content_id: Uuid, now: DateTime<Utc>) {
        if let Err(e) = self.write_content_schedule(content_id, now).await {
            error!(content_id = %content_id, error = %e, "Failed to update content schedule");
        }
    }

    async fn write_content_schedule(
        &self,
        content_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let next = self
            .jobs
            .list_for_content(content_id, Some(JobStatus::Scheduled))
            .await?
            .first()
            .map(|job| job.scheduled_at);

        let contents = self.publisher.contents();
        if next.is_none() {
            // Only scheduled content goes back to draft
            match contents.get_content(content_id).await? {
                Some(item) if item.status == ContentStatus::Scheduled => {}
                _ => return Ok(()),
            }
        }
        contents.set_schedule(content_id, next, now).await
    }

    pub async fn get_job(&self, user_id: Uuid, job_id: Uuid) -> Result<ScheduledJob, SchedulerError> {
        Ok(self.jobs.get(user_id, job_id).await?)
    }

    pub async fn list_jobs(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        Ok(self.jobs.list_for_user(user_id, status, limit).await?)
    }

    async fn ensure_owned_content(
        &self,
        user_id: Uuid,
        content_id: Uuid,
    ) -> Result<(), SchedulerError> {
        match self.publisher.contents().get_content(content_id).await? {
            Some(content) if content.user_id == user_id => Ok(()),
            _ => Err(PublishError::ContentNotFound(content_id).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{InMemoryAccountStore, InMemoryContentStore, InMemoryScheduledJobStore};
    use crate::errors::{PlatformError, PlatformErrorKind, StoreError};
    use crate::models::{ContentItem, ContentStatus, Platform, SocialAccount};
    use crate::platforms::{AdapterRegistry, PlatformAdapter, PublishTarget, PublishedPost};
    use crate::publishing::PublishingConfig;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::retry::{BackoffPolicy, RetryConfig, RetryExecutor};
    use crate::store::ContentStore;
    use crate::token::MockTokenProvider;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Fails every call for the accounts in `failing`
    #[derive(Default)]
    struct SwitchAdapter {
        failing: Mutex<HashSet<Uuid>>,
        calls: Mutex<Vec<Uuid>>,
    }

    impl SwitchAdapter {
        fn fail(&self, account_id: Uuid, failing: bool) {
            let mut set = self.failing.lock().unwrap();
            if failing {
                set.insert(account_id);
            } else {
                set.remove(&account_id);
            }
        }

        fn calls_for(&self, account_id: Uuid) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|id| **id == account_id)
                .count()
        }
    }

    #[async_trait]
    impl PlatformAdapter for SwitchAdapter {
        fn platform(&self) -> Platform {
            Platform::Linkedin
        }

        async fn publish(
            &self,
            _content: &ContentItem,
            target: &PublishTarget,
        ) -> Result<PublishedPost, PlatformError> {
            self.calls.lock().unwrap().push(target.account_id);
            if self.failing.lock().unwrap().contains(&target.account_id) {
                return Err(PlatformError::new(
                    Platform::Linkedin,
                    PlatformErrorKind::Validation,
                    "commentary rejected",
                ));
            }
            Ok(PublishedPost {
                social_post_id: format!("urn:li:share:{}", target.account_id),
                url: None,
            })
        }
    }

    struct Fixture {
        coordinator: SchedulingCoordinator,
        jobs: Arc<InMemoryScheduledJobStore>,
        contents: Arc<InMemoryContentStore>,
        accounts: Arc<InMemoryAccountStore>,
        adapter: Arc<SwitchAdapter>,
        clock: Arc<ManualClock>,
        user_id: Uuid,
    }

    fn fixture(config: SchedulerConfig) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let jobs = Arc::new(InMemoryScheduledJobStore::new());
        let contents = Arc::new(InMemoryContentStore::new());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let adapter = Arc::new(SwitchAdapter::default());

        let mut tokens = MockTokenProvider::new();
        tokens
            .expect_get_valid_access_token()
            .returning(|account| Ok(account.access_token.clone()));

        let publisher = Arc::new(PublishingCoordinator::new(
            contents.clone(),
            accounts.clone(),
            Arc::new(tokens),
            AdapterRegistry::new().with_adapter(adapter.clone()),
            Arc::new(RetryExecutor::new(clock.clone())),
            Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone())),
            clock.clone(),
            PublishingConfig {
                retry: RetryConfig::new(
                    2,
                    BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 2.0),
                ),
                call_timeout: Duration::from_secs(30),
            },
        ));

        Fixture {
            coordinator: SchedulingCoordinator::new(
                jobs.clone(),
                publisher,
                clock.clone(),
                config,
            ),
            jobs,
            contents,
            accounts,
            adapter,
            clock,
            user_id: Uuid::new_v4(),
        }
    }

    impl Fixture {
        async fn content(&self) -> Uuid {
            let id = Uuid::new_v4();
            self.contents
                .insert(ContentItem {
                    id,
                    user_id: self.user_id,
                    platform: Platform::Linkedin,
                    content: "Launch notes".to_string(),
                    hashtags: vec![],
                    image_url: None,
                    status: ContentStatus::Draft,
                    scheduled_at: None,
                    published_at: None,
                    social_post_id: None,
                    last_error: None,
                    updated_at: self.clock.now(),
                })
                .await;
            id
        }

        async fn account(&self) -> Uuid {
            let id = Uuid::new_v4();
            self.accounts
                .insert(SocialAccount {
                    id,
                    user_id: self.user_id,
                    platform: Platform::Linkedin,
                    platform_user_id: "member".to_string(),
                    is_active: true,
                    access_token: "token".to_string(),
                    refresh_token: None,
                    token_expires_at: None,
                })
                .await;
            id
        }

        async fn schedule_in(&self, content_id: Uuid, accounts: Vec<Uuid>, secs: i64) -> ScheduledJob {
            self.coordinator
                .schedule(
                    self.user_id,
                    content_id,
                    accounts,
                    self.clock.now() + chrono::Duration::seconds(secs),
                )
                .await
                .unwrap()
        }

        async fn content_status(&self, content_id: Uuid) -> ContentItem {
            self.contents.get_content(content_id).await.unwrap().unwrap()
        }
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.batch_limit, 50);
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.claim_timeout, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_schedule_marks_content_scheduled() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;

        let job = f.schedule_in(content_id, vec![account], 60).await;

        assert_eq!(job.status, JobStatus::Scheduled);
        let content = f.content_status(content_id).await;
        assert_eq!(content.status, ContentStatus::Scheduled);
        assert_eq!(content.scheduled_at, Some(job.scheduled_at));
    }

    #[tokio::test]
    async fn test_schedule_rejects_foreign_content() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;

        let err = f
            .coordinator
            .schedule(
                Uuid::new_v4(),
                content_id,
                vec![account],
                f.clock.now() + chrono::Duration::seconds(60),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::Publish(PublishError::ContentNotFound(id)) if id == content_id
        ));
        assert!(f.jobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_schedule_rejects_past_time() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;

        let err = f
            .coordinator
            .schedule(
                f.user_id,
                content_id,
                vec![account],
                f.clock.now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::Store(StoreError::InvalidSchedule(_))
        ));
        assert_eq!(f.content_status(content_id).await.status, ContentStatus::Draft);
    }

    #[tokio::test]
    async fn test_process_due_jobs_publishes_due_only() {
        let f = fixture(SchedulerConfig::default());
        let due_content = f.content().await;
        let later_content = f.content().await;
        let account = f.account().await;

        let due = f.schedule_in(due_content, vec![account], 1).await;
        let later = f.schedule_in(later_content, vec![account], 3600).await;

        f.clock.advance(Duration::from_secs(2));
        let summary = f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();

        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.published, 1);
        assert_eq!(summary.failed, 0);

        assert_eq!(f.jobs.snapshot(due.id).await.unwrap().status, JobStatus::Published);
        assert_eq!(f.jobs.snapshot(later.id).await.unwrap().status, JobStatus::Scheduled);
        assert_eq!(
            f.content_status(due_content).await.status,
            ContentStatus::Published
        );
    }

    #[tokio::test]
    async fn test_one_failing_job_does_not_abort_batch() {
        let f = fixture(SchedulerConfig {
            worker_concurrency: 2,
            ..SchedulerConfig::default()
        });
        let good = f.account().await;
        let bad = f.account().await;
        f.adapter.fail(bad, true);

        let first = f.schedule_in(f.content().await, vec![good], 1).await;
        let second = f.schedule_in(f.content().await, vec![bad], 1).await;
        let third = f.schedule_in(f.content().await, vec![good, bad], 1).await;

        f.clock.advance(Duration::from_secs(5));
        let summary = f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();

        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.published, 1);
        assert_eq!(summary.failed, 2);

        assert_eq!(f.jobs.snapshot(first.id).await.unwrap().status, JobStatus::Published);
        let failed = f.jobs.snapshot(second.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.last_error.unwrap().contains("commentary rejected"));
        assert_eq!(f.jobs.snapshot(third.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_content_fails_job() {
        let f = fixture(SchedulerConfig::default());
        let account = f.account().await;
        let job = f
            .jobs
            .enqueue(
                NewScheduledJob {
                    user_id: f.user_id,
                    content_id: Uuid::new_v4(),
                    account_ids: vec![account],
                    scheduled_at: f.clock.now() + chrono::Duration::seconds(1),
                },
                f.clock.now(),
            )
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(2));
        let summary = f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();

        assert_eq!(summary.failed, 1);
        let stored = f.jobs.snapshot(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.last_error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_claim_failure_fails_invocation() {
        let f = fixture(SchedulerConfig::default());
        f.jobs.set_unavailable(true);

        let err = f
            .coordinator
            .process_due_jobs(f.clock.now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Store(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn test_batch_limit_bounds_claims() {
        let f = fixture(SchedulerConfig {
            batch_limit: 2,
            ..SchedulerConfig::default()
        });
        let account = f.account().await;
        for _ in 0..3 {
            f.schedule_in(f.content().await, vec![account], 1).await;
        }

        f.clock.advance(Duration::from_secs(2));
        let first = f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();
        let second = f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();

        assert_eq!(first.claimed, 2);
        assert_eq!(second.claimed, 1);
    }

    #[tokio::test]
    async fn test_stale_claims_are_recovered() {
        let f = fixture(SchedulerConfig {
            claim_timeout: Duration::from_secs(60),
            ..SchedulerConfig::default()
        });
        let account = f.account().await;
        let job = f.schedule_in(f.content().await, vec![account], 1).await;

        f.clock.advance(Duration::from_secs(2));
        let claimed = f.jobs.claim_due(f.clock.now(), 10).await.unwrap();
        assert_eq!(claimed.len(), 1);

        f.clock.advance(Duration::from_secs(120));
        let summary = f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();

        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.claimed, 0);
        let stored = f.jobs.snapshot(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);

        let content = f.content_status(job.content_id).await;
        assert_eq!(content.status, ContentStatus::Failed);
        assert_eq!(content.last_error.as_deref(), Some(STALE_CLAIM_ERROR));
    }

    #[tokio::test]
    async fn test_cancel_returns_content_to_draft() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;
        let job = f.schedule_in(content_id, vec![account], 60).await;

        let cancelled = f.coordinator.cancel(f.user_id, job.id).await.unwrap();

        assert_eq!(cancelled.status, JobStatus::Cancelled);
        let content = f.content_status(content_id).await;
        assert_eq!(content.status, ContentStatus::Draft);
        assert_eq!(content.scheduled_at, None);

        let err = f.coordinator.cancel(f.user_id, job.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_content_follows_earliest_remaining_job() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;
        let first = f.schedule_in(content_id, vec![account], 60).await;
        let second = f.schedule_in(content_id, vec![account], 120).await;

        assert_eq!(
            f.content_status(content_id).await.scheduled_at,
            Some(first.scheduled_at)
        );

        f.coordinator.cancel(f.user_id, first.id).await.unwrap();
        let content = f.content_status(content_id).await;
        assert_eq!(content.status, ContentStatus::Scheduled);
        assert_eq!(content.scheduled_at, Some(second.scheduled_at));

        let later = f.clock.now() + chrono::Duration::hours(3);
        f.coordinator
            .reschedule(f.user_id, second.id, later)
            .await
            .unwrap();
        assert_eq!(f.content_status(content_id).await.scheduled_at, Some(later));

        f.coordinator.cancel(f.user_id, second.id).await.unwrap();
        let content = f.content_status(content_id).await;
        assert_eq!(content.status, ContentStatus::Draft);
        assert_eq!(content.scheduled_at, None);
    }

    #[tokio::test]
    async fn test_cancel_keeps_published_content() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;
        f.schedule_in(content_id, vec![account], 1).await;
        let repeat = f.schedule_in(content_id, vec![account], 3600).await;

        f.clock.advance(Duration::from_secs(2));
        f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();
        assert_eq!(
            f.content_status(content_id).await.status,
            ContentStatus::Published
        );

        f.coordinator.cancel(f.user_id, repeat.id).await.unwrap();
        assert_eq!(
            f.content_status(content_id).await.status,
            ContentStatus::Published
        );
    }

    #[tokio::test]
    async fn test_content_write_failure_still_returns_stored_job() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;
        f.contents.set_read_only(true);

        let job = f.schedule_in(content_id, vec![account], 60).await;
        assert_eq!(
            f.jobs.snapshot(job.id).await.unwrap().status,
            JobStatus::Scheduled
        );
        assert_eq!(f.content_status(content_id).await.status, ContentStatus::Draft);

        let moved = f
            .coordinator
            .reschedule(f.user_id, job.id, f.clock.now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(moved.status, JobStatus::Scheduled);

        let cancelled = f.coordinator.cancel(f.user_id, job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(
            f.jobs.snapshot(job.id).await.unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_account_retry_closes_fully_published_job() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let good = f.account().await;
        let first_bad = f.account().await;
        let second_bad = f.account().await;
        f.adapter.fail(first_bad, true);
        f.adapter.fail(second_bad, true);

        let job = f
            .schedule_in(content_id, vec![good, first_bad, second_bad], 1)
            .await;
        f.clock.advance(Duration::from_secs(2));
        f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();
        assert_eq!(f.jobs.snapshot(job.id).await.unwrap().status, JobStatus::Failed);

        f.adapter.fail(first_bad, false);
        f.adapter.fail(second_bad, false);

        let result = f
            .coordinator
            .retry_publication(f.user_id, content_id, first_bad)
            .await
            .unwrap();
        assert!(result.success);
        // second_bad is still failed in the ledger
        assert_eq!(f.jobs.snapshot(job.id).await.unwrap().status, JobStatus::Failed);

        f.coordinator
            .retry_publication(f.user_id, content_id, second_bad)
            .await
            .unwrap();
        let closed = f.jobs.snapshot(job.id).await.unwrap();
        assert_eq!(closed.status, JobStatus::Published);
        assert_eq!(closed.retry_count, 1);
        assert_eq!(
            f.content_status(content_id).await.status,
            ContentStatus::Published
        );
    }

    #[tokio::test]
    async fn test_reschedule_moves_content_time() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let account = f.account().await;
        let job = f.schedule_in(content_id, vec![account], 60).await;

        let new_time = f.clock.now() + chrono::Duration::hours(2);
        let moved = f
            .coordinator
            .reschedule(f.user_id, job.id, new_time)
            .await
            .unwrap();

        assert_eq!(moved.scheduled_at, new_time);
        assert_eq!(moved.status, JobStatus::Scheduled);
        assert_eq!(f.content_status(content_id).await.scheduled_at, Some(new_time));
    }

    #[tokio::test]
    async fn test_retry_job_only_republishes_failed_accounts() {
        let f = fixture(SchedulerConfig::default());
        let content_id = f.content().await;
        let good = f.account().await;
        let bad = f.account().await;
        f.adapter.fail(bad, true);

        let job = f.schedule_in(content_id, vec![good, bad], 1).await;
        f.clock.advance(Duration::from_secs(2));
        f.coordinator.process_due_jobs(f.clock.now()).await.unwrap();
        assert_eq!(f.jobs.snapshot(job.id).await.unwrap().status, JobStatus::Failed);

        f.adapter.fail(bad, false);
        let (retried, results) = f.coordinator.retry_job(f.user_id, job.id).await.unwrap();

        assert_eq!(retried.status, JobStatus::Published);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(f.adapter.calls_for(good), 1);
        assert_eq!(f.adapter.calls_for(bad), 2);
        assert_eq!(
            f.content_status(content_id).await.status,
            ContentStatus::Published
        );
    }

    #[tokio::test]
    async fn test_retry_job_requires_failed_status() {
        let f = fixture(SchedulerConfig::default());
        let account = f.account().await;
        let job = f.schedule_in(f.content().await, vec![account], 60).await;

        let err = f.coordinator.retry_job(f.user_id, job.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_status() {
        let f = fixture(SchedulerConfig::default());
        let account = f.account().await;
        let kept = f.schedule_in(f.content().await, vec![account], 60).await;
        let cancelled = f.schedule_in(f.content().await, vec![account], 120).await;
        f.coordinator.cancel(f.user_id, cancelled.id).await.unwrap();

        let scheduled = f
            .coordinator
            .list_jobs(f.user_id, Some(JobStatus::Scheduled), 10)
            .await
            .unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, kept.id);

        let all = f.coordinator.list_jobs(f.user_id, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);

        assert!(f.coordinator.get_job(Uuid::new_v4(), kept.id).await.is_err());
    }
}
