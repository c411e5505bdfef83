// In-memory store implementations for tests and local runs

use crate::errors::StoreError;
use crate::models::{
    AccountOutcome, ContentItem, ContentStatus, ContentStatusUpdate, JobResolution, JobStatus,
    NewScheduledJob, Platform, RefreshedTokens, ScheduledJob, SocialAccount,
};
use crate::store::{
    validate_new_job, validate_schedule_time, AccountStore, ContentStore, ScheduledJobStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repositories::STALE_CLAIM_ERROR;

#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, ScheduledJob>,
    /// Scheduled jobs only, ordered by due time
    due_index: BTreeSet<(DateTime<Utc>, Uuid)>,
}

impl JobTable {
    fn owned_mut(&mut self, user_id: Uuid, job_id: Uuid) -> Result<&mut ScheduledJob, StoreError> {
        match self.jobs.get_mut(&job_id) {
            Some(job) if job.user_id == user_id => Ok(job),
            _ => Err(StoreError::NotFound(job_id)),
        }
    }
}

/// Scheduled job store held in process memory
///
/// Every operation runs inside one critical section, which gives the same
/// exclusivity the Postgres claim gets from row locks.
#[derive(Default)]
pub struct InMemoryScheduledJobStore {
    table: Mutex<JobTable>,
    unavailable: AtomicBool,
}

impl InMemoryScheduledJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a storage error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("job store unavailable".to_string()));
        }
        Ok(())
    }

    /// Snapshot of a job regardless of owner
    pub async fn snapshot(&self, job_id: Uuid) -> Option<ScheduledJob> {
        self.table.lock().await.jobs.get(&job_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ScheduledJobStore for InMemoryScheduledJobStore {
    async fn enqueue(
        &self,
        request: NewScheduledJob,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        self.check_available()?;
        validate_new_job(&request, now)?;

        let job = ScheduledJob::from_request(request, now);
        let mut table = self.table.lock().await;
        table.due_index.insert((job.scheduled_at, job.id));
        table.jobs.insert(job.id, job.clone());

        tracing::debug!(job_id = %job.id, scheduled_at = %job.scheduled_at, "Scheduled job enqueued");
        Ok(job)
    }

    async fn get(&self, user_id: Uuid, job_id: Uuid) -> Result<ScheduledJob, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;
        table.owned_mut(user_id, job_id).map(|job| job.clone())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        self.check_available()?;
        let table = self.table.lock().await;

        let mut jobs: Vec<ScheduledJob> = table
            .jobs
            .values()
            .filter(|job| job.user_id == user_id && status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();

        jobs.sort_by(|a, b| {
            b.scheduled_at
                .cmp(&a.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn list_for_content(
        &self,
        content_id: Uuid,
        status: Option<JobStatus>,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        self.check_available()?;
        let table = self.table.lock().await;

        let mut jobs: Vec<ScheduledJob> = table
            .jobs
            .values()
            .filter(|job| job.content_id == content_id && status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    async fn cancel(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;
        let job = table.owned_mut(user_id, job_id)?;

        if job.status != JobStatus::Scheduled {
            return Err(StoreError::Conflict {
                id: job_id,
                status: job.status,
            });
        }

        job.status = JobStatus::Cancelled;
        job.updated_at = now;
        let job = job.clone();
        table.due_index.remove(&(job.scheduled_at, job.id));
        Ok(job)
    }

    async fn reschedule(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        new_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        self.check_available()?;
        validate_schedule_time(new_time, now)?;

        let mut table = self.table.lock().await;
        let job = table.owned_mut(user_id, job_id)?;

        if job.status != JobStatus::Scheduled {
            return Err(StoreError::Conflict {
                id: job_id,
                status: job.status,
            });
        }

        let previous = job.scheduled_at;
        job.scheduled_at = new_time;
        job.updated_at = now;
        let job = job.clone();
        table.due_index.remove(&(previous, job.id));
        table.due_index.insert((new_time, job.id));
        Ok(job)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;

        let due: Vec<(DateTime<Utc>, Uuid)> = table
            .due_index
            .iter()
            .take_while(|(scheduled_at, _)| *scheduled_at <= now)
            .take(limit as usize)
            .copied()
            .collect();

        let mut claimed = Vec::with_capacity(due.len());
        for key in due {
            table.due_index.remove(&key);
            if let Some(job) = table.jobs.get_mut(&key.1) {
                job.status = JobStatus::Publishing;
                job.claimed_at = Some(now);
                job.updated_at = now;
                claimed.push(job.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_result(
        &self,
        job_id: Uuid,
        resolution: JobResolution,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;
        let job = table
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;

        if job.status != JobStatus::Publishing {
            return Err(StoreError::Conflict {
                id: job_id,
                status: job.status,
            });
        }

        job.status = resolution.status();
        job.last_error = resolution.error().map(str::to_string);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn reclaim_failed(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;
        let job = table.owned_mut(user_id, job_id)?;

        if job.status != JobStatus::Failed {
            return Err(StoreError::Conflict {
                id: job_id,
                status: job.status,
            });
        }

        job.status = JobStatus::Publishing;
        job.retry_count += 1;
        job.claimed_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn fail_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        self.check_available()?;
        let mut table = self.table.lock().await;

        let mut failed = Vec::new();
        for job in table.jobs.values_mut() {
            let stale = job.status == JobStatus::Publishing
                && job.claimed_at.is_some_and(|claimed| claimed < claimed_before);
            if stale {
                job.status = JobStatus::Failed;
                job.last_error = Some(STALE_CLAIM_ERROR.to_string());
                job.updated_at = now;
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }
}

/// Content items and the per-account outcome ledger held in memory
#[derive(Default)]
pub struct InMemoryContentStore {
    items: Mutex<HashMap<Uuid, ContentItem>>,
    outcomes: Mutex<HashMap<Uuid, Vec<AccountOutcome>>>,
    read_only: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, item: ContentItem) {
        self.items.lock().await.insert(item.id, item);
    }

    /// Make status and schedule writes fail while reads keep working
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("content store is read-only".to_string()));
        }
        Ok(())
    }

    fn missing(content_id: Uuid) -> StoreError {
        StoreError::Storage(format!("content {} not found", content_id))
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content(&self, content_id: Uuid) -> Result<Option<ContentItem>, StoreError> {
        Ok(self.items.lock().await.get(&content_id).cloned())
    }

    async fn update_content_status(
        &self,
        content_id: Uuid,
        update: ContentStatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        let item = items
            .get_mut(&content_id)
            .ok_or_else(|| Self::missing(content_id))?;

        match update {
            ContentStatusUpdate::Published { social_post_id } => {
                item.status = ContentStatus::Published;
                item.published_at = Some(now);
                item.social_post_id = social_post_id;
                item.last_error = None;
            }
            ContentStatusUpdate::Failed { error } => {
                item.status = ContentStatus::Failed;
                item.last_error = Some(error);
            }
        }
        item.updated_at = now;
        Ok(())
    }

    async fn set_schedule(
        &self,
        content_id: Uuid,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut items = self.items.lock().await;
        let item = items
            .get_mut(&content_id)
            .ok_or_else(|| Self::missing(content_id))?;

        item.status = if scheduled_at.is_some() {
            ContentStatus::Scheduled
        } else {
            ContentStatus::Draft
        };
        item.scheduled_at = scheduled_at;
        item.updated_at = now;
        Ok(())
    }

    async fn record_account_outcome(&self, outcome: AccountOutcome) -> Result<(), StoreError> {
        let mut outcomes = self.outcomes.lock().await;
        let ledger = outcomes.entry(outcome.content_id).or_default();
        match ledger
            .iter_mut()
            .find(|existing| existing.account_id == outcome.account_id)
        {
            Some(existing) => *existing = outcome,
            None => ledger.push(outcome),
        }
        Ok(())
    }

    async fn account_outcomes(&self, content_id: Uuid) -> Result<Vec<AccountOutcome>, StoreError> {
        let mut ledger = self
            .outcomes
            .lock()
            .await
            .get(&content_id)
            .cloned()
            .unwrap_or_default();
        ledger.sort_by(|a, b| {
            a.attempted_at
                .cmp(&b.attempted_at)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });
        Ok(ledger)
    }
}

/// Social accounts held in memory
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, SocialAccount>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: SocialAccount) {
        self.accounts.lock().await.insert(account.id, account);
    }

    /// Current record regardless of owner
    pub async fn snapshot(&self, account_id: Uuid) -> Option<SocialAccount> {
        self.accounts.lock().await.get(&account_id).cloned()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<SocialAccount>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .await
            .get(&account_id)
            .filter(|account| account.user_id == user_id)
            .cloned())
    }

    async fn get_active_account(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SocialAccount>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|a| a.user_id == user_id && a.platform == platform && a.is_active)
            .cloned())
    }

    async fn update_tokens(
        &self,
        account_id: Uuid,
        tokens: &RefreshedTokens,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(&account_id).ok_or_else(|| {
            StoreError::Storage(format!("social account {} not found", account_id))
        })?;

        account.access_token = tokens.access_token.clone();
        if let Some(refresh_token) = &tokens.refresh_token {
            account.refresh_token = Some(refresh_token.clone());
        }
        account.token_expires_at = tokens.expires_at;
        Ok(())
    }
}
