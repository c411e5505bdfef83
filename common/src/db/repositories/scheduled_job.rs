// Scheduled job repository implementation

use crate::db::DbPool;
use crate::errors::StoreError;
use crate::models::{JobResolution, JobStatus, NewScheduledJob, ScheduledJob};
use crate::store::{validate_new_job, validate_schedule_time, ScheduledJobStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, user_id, content_id, account_ids, scheduled_at, status, \
     retry_count, last_error, claimed_at, created_at, updated_at";

/// Message stored on jobs whose publishing run never reported back
pub const STALE_CLAIM_ERROR: &str = "publishing interrupted";

/// PostgreSQL-backed scheduled job store
///
/// Every state transition is a single conditional `UPDATE ... RETURNING`, so the
/// row's current status is the only lock needed. Claiming uses
/// `FOR UPDATE SKIP LOCKED` so concurrent triggers partition the due set
/// instead of blocking on each other.
#[derive(Clone)]
pub struct ScheduledJobRepository {
    pool: DbPool,
}

impl ScheduledJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<ScheduledJob>, StoreError> {
        let sql = format!("SELECT {} FROM scheduled_jobs WHERE id = $1", JOB_COLUMNS);
        let job = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(job_id)
            .fetch_optional(self.pool.pool())
            .await?;
        Ok(job)
    }

    /// Explain why a conditional update matched nothing
    async fn transition_failure(&self, user_id: Option<Uuid>, job_id: Uuid) -> StoreError {
        match self.find_by_id(job_id).await {
            Ok(Some(job)) if user_id.map_or(true, |u| u == job.user_id) => StoreError::Conflict {
                id: job_id,
                status: job.status,
            },
            Ok(_) => StoreError::NotFound(job_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl ScheduledJobStore for ScheduledJobRepository {
    #[instrument(skip(self, request), fields(content_id = %request.content_id))]
    async fn enqueue(
        &self,
        request: NewScheduledJob,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        validate_new_job(&request, now)?;
        let job = ScheduledJob::from_request(request, now);

        let sql = format!(
            r#"
            INSERT INTO scheduled_jobs (
                id, user_id, content_id, account_ids, scheduled_at, status,
                retry_count, last_error, claimed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, NULL, NULL, $7, $7)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let job = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(job.id)
            .bind(job.user_id)
            .bind(job.content_id)
            .bind(&job.account_ids)
            .bind(job.scheduled_at)
            .bind(JobStatus::Scheduled.to_string())
            .bind(now)
            .fetch_one(self.pool.pool())
            .await?;

        tracing::info!(
            job_id = %job.id,
            scheduled_at = %job.scheduled_at,
            accounts = job.account_ids.len(),
            "Scheduled job enqueued"
        );
        Ok(job)
    }

    #[instrument(skip(self))]
    async fn get(&self, user_id: Uuid, job_id: Uuid) -> Result<ScheduledJob, StoreError> {
        match self.find_by_id(job_id).await? {
            Some(job) if job.user_id == user_id => Ok(job),
            _ => Err(StoreError::NotFound(job_id)),
        }
    }

    #[instrument(skip(self))]
    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM scheduled_jobs
            WHERE user_id = $1 AND ($2::varchar IS NULL OR status = $2)
            ORDER BY scheduled_at DESC, id
            LIMIT $3
            "#,
            JOB_COLUMNS
        );

        let jobs = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(user_id)
            .bind(status.map(|s| s.to_string()))
            .bind(i64::from(limit))
            .fetch_all(self.pool.pool())
            .await?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn list_for_content(
        &self,
        content_id: Uuid,
        status: Option<JobStatus>,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM scheduled_jobs
            WHERE content_id = $1 AND ($2::varchar IS NULL OR status = $2)
            ORDER BY scheduled_at, id
            "#,
            JOB_COLUMNS
        );

        let jobs = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(content_id)
            .bind(status.map(|s| s.to_string()))
            .fetch_all(self.pool.pool())
            .await?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn cancel(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET status = 'cancelled', updated_at = $3
            WHERE id = $1 AND user_id = $2 AND status = 'scheduled'
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let updated = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(job_id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(self.pool.pool())
            .await?;

        match updated {
            Some(job) => {
                tracing::info!(job_id = %job_id, "Scheduled job cancelled");
                Ok(job)
            }
            None => Err(self.transition_failure(Some(user_id), job_id).await),
        }
    }

    #[instrument(skip(self))]
    async fn reschedule(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        new_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        validate_schedule_time(new_time, now)?;

        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET scheduled_at = $3, updated_at = $4
            WHERE id = $1 AND user_id = $2 AND status = 'scheduled'
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let updated = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(job_id)
            .bind(user_id)
            .bind(new_time)
            .bind(now)
            .fetch_optional(self.pool.pool())
            .await?;

        match updated {
            Some(job) => {
                tracing::info!(job_id = %job_id, scheduled_at = %new_time, "Scheduled job rescheduled");
                Ok(job)
            }
            None => Err(self.transition_failure(Some(user_id), job_id).await),
        }
    }

    #[instrument(skip(self))]
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET status = 'publishing', claimed_at = $1, updated_at = $1
            WHERE id IN (
                SELECT id
                FROM scheduled_jobs
                WHERE status = 'scheduled' AND scheduled_at <= $1
                ORDER BY scheduled_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let mut jobs = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(self.pool.pool())
            .await?;

        // RETURNING does not preserve the subquery order
        jobs.sort_by_key(|job| (job.scheduled_at, job.id));

        if !jobs.is_empty() {
            tracing::info!(count = jobs.len(), "Claimed due jobs");
        }
        Ok(jobs)
    }

    #[instrument(skip(self, resolution), fields(status = %resolution.status()))]
    async fn mark_result(
        &self,
        job_id: Uuid,
        resolution: JobResolution,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET status = $2, last_error = $3, updated_at = $4
            WHERE id = $1 AND status = 'publishing'
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let updated = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(job_id)
            .bind(resolution.status().to_string())
            .bind(resolution.error())
            .bind(now)
            .fetch_optional(self.pool.pool())
            .await?;

        match updated {
            Some(job) => Ok(job),
            None => Err(self.transition_failure(None, job_id).await),
        }
    }

    #[instrument(skip(self))]
    async fn reclaim_failed(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, StoreError> {
        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET status = 'publishing', retry_count = retry_count + 1,
                claimed_at = $3, updated_at = $3
            WHERE id = $1 AND user_id = $2 AND status = 'failed'
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let updated = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(job_id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(self.pool.pool())
            .await?;

        match updated {
            Some(job) => {
                tracing::info!(job_id = %job_id, retry_count = job.retry_count, "Failed job reclaimed for retry");
                Ok(job)
            }
            None => Err(self.transition_failure(Some(user_id), job_id).await),
        }
    }

    #[instrument(skip(self))]
    async fn fail_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        let sql = format!(
            r#"
            UPDATE scheduled_jobs
            SET status = 'failed', last_error = $2, updated_at = $3
            WHERE status = 'publishing' AND claimed_at < $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let jobs = sqlx::query_as::<_, ScheduledJob>(&sql)
            .bind(claimed_before)
            .bind(STALE_CLAIM_ERROR)
            .bind(now)
            .fetch_all(self.pool.pool())
            .await?;

        for job in &jobs {
            tracing::warn!(job_id = %job.id, claimed_at = ?job.claimed_at, "Stale publishing claim failed");
        }
        Ok(jobs)
    }
}
