// Persistence seams for scheduled jobs and the external content/account records

use crate::errors::StoreError;
use crate::models::{
    AccountOutcome, ContentItem, ContentStatusUpdate, JobResolution, JobStatus, NewScheduledJob,
    Platform, RefreshedTokens, ScheduledJob, SocialAccount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Durable, time-ordered collection of scheduled publishing jobs
#[async_trait]
pub trait ScheduledJobStore: Send + Sync {
    /// Persist a new job in `scheduled` status
    async fn enqueue(
        &self,
        request: NewScheduledJob,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError>;

    /// Load a job owned by `user_id`
    async fn get(&self, user_id: Uuid, job_id: Uuid) -> Result<ScheduledJob, StoreError>;

    /// Jobs owned by `user_id`, newest scheduled time first
    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError>;

    /// Jobs for one content item, earliest scheduled time first
    async fn list_for_content(
        &self,
        content_id: Uuid,
        status: Option<JobStatus>,
    ) -> Result<Vec<ScheduledJob>, StoreError>;

    /// scheduled -> cancelled
    async fn cancel(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError>;

    /// Move a still-scheduled job to a new future time
    async fn reschedule(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        new_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError>;

    /// Atomically move up to `limit` due jobs to `publishing`, oldest due first
    ///
    /// A job returned here is never returned to any other concurrent caller.
    async fn claim_due(&self, now: DateTime<Utc>, limit: u32)
        -> Result<Vec<ScheduledJob>, StoreError>;

    /// publishing -> published | failed
    async fn mark_result(
        &self,
        job_id: Uuid,
        resolution: JobResolution,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError>;

    /// failed -> publishing for an explicit user retry; bumps `retry_count`
    async fn reclaim_failed(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError>;

    /// Fail jobs left in `publishing` since before `claimed_before`
    async fn fail_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledJob>, StoreError>;
}

/// Content records owned by the content service
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content(&self, content_id: Uuid) -> Result<Option<ContentItem>, StoreError>;

    /// Write the aggregate publication status back to the content item
    async fn update_content_status(
        &self,
        content_id: Uuid,
        update: ContentStatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark the content scheduled at `scheduled_at`, or back to draft when `None`
    async fn set_schedule(
        &self,
        content_id: Uuid,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Upsert the latest outcome for (content, account)
    async fn record_account_outcome(&self, outcome: AccountOutcome) -> Result<(), StoreError>;

    async fn account_outcomes(&self, content_id: Uuid) -> Result<Vec<AccountOutcome>, StoreError>;
}

/// Connected social accounts owned by the account service
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<SocialAccount>, StoreError>;

    async fn get_active_account(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SocialAccount>, StoreError>;

    /// Persist refreshed OAuth tokens; only the token provider calls this
    async fn update_tokens(
        &self,
        account_id: Uuid,
        tokens: &RefreshedTokens,
    ) -> Result<(), StoreError>;
}

/// Reject schedules that are not strictly in the future
pub fn validate_schedule_time(
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    if scheduled_at <= now {
        return Err(StoreError::InvalidSchedule(format!(
            "scheduled_at {} is not in the future",
            scheduled_at.to_rfc3339()
        )));
    }
    Ok(())
}

/// Reject empty or duplicated account lists
pub fn validate_account_ids(account_ids: &[Uuid]) -> Result<(), StoreError> {
    if account_ids.is_empty() {
        return Err(StoreError::InvalidSchedule(
            "at least one account is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(account_ids.len());
    if let Some(duplicate) = account_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(StoreError::InvalidSchedule(format!(
            "account {} is listed more than once",
            duplicate
        )));
    }
    Ok(())
}

/// Validate a scheduling request against `now`
pub fn validate_new_job(request: &NewScheduledJob, now: DateTime<Utc>) -> Result<(), StoreError> {
    validate_account_ids(&request.account_ids)?;
    validate_schedule_time(request.scheduled_at, now)
}
