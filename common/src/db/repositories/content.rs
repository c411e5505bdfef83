// Content item and publish outcome repository

use crate::db::DbPool;
use crate::errors::StoreError;
use crate::models::{AccountOutcome, ContentItem, ContentStatusUpdate};
use crate::store::ContentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

/// Repository for the content columns the publishing engine reads and writes
#[derive(Clone)]
pub struct ContentRepository {
    pool: DbPool,
}

impl ContentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for ContentRepository {
    #[instrument(skip(self))]
    async fn get_content(&self, content_id: Uuid) -> Result<Option<ContentItem>, StoreError> {
        let item = sqlx::query_as::<_, ContentItem>(
            r#"
            SELECT id, user_id, platform, content, hashtags, image_url, status,
                   scheduled_at, published_at, social_post_id, last_error, updated_at
            FROM content_items
            WHERE id = $1
            "#,
        )
        .bind(content_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(item)
    }

    #[instrument(skip(self, update))]
    async fn update_content_status(
        &self,
        content_id: Uuid,
        update: ContentStatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = match update {
            ContentStatusUpdate::Published { social_post_id } => {
                sqlx::query(
                    r#"
                    UPDATE content_items
                    SET status = 'published', published_at = $2, social_post_id = $3,
                        last_error = NULL, updated_at = $2
                    WHERE id = $1
                    "#,
                )
                .bind(content_id)
                .bind(now)
                .bind(social_post_id)
                .execute(self.pool.pool())
                .await?
            }
            ContentStatusUpdate::Failed { error } => {
                sqlx::query(
                    r#"
                    UPDATE content_items
                    SET status = 'failed', last_error = $2, updated_at = $3
                    WHERE id = $1
                    "#,
                )
                .bind(content_id)
                .bind(error)
                .bind(now)
                .execute(self.pool.pool())
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Storage(format!(
                "content {} not found",
                content_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_schedule(
        &self,
        content_id: Uuid,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let status = if scheduled_at.is_some() {
            "scheduled"
        } else {
            "draft"
        };

        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET status = $2, scheduled_at = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(content_id)
        .bind(status)
        .bind(scheduled_at)
        .bind(now)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Storage(format!(
                "content {} not found",
                content_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, outcome), fields(content_id = %outcome.content_id, account_id = %outcome.account_id))]
    async fn record_account_outcome(&self, outcome: AccountOutcome) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO publish_outcomes (
                content_id, account_id, platform, success, social_post_id, error, attempted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (content_id, account_id) DO UPDATE
            SET platform = EXCLUDED.platform,
                success = EXCLUDED.success,
                social_post_id = EXCLUDED.social_post_id,
                error = EXCLUDED.error,
                attempted_at = EXCLUDED.attempted_at
            "#,
        )
        .bind(outcome.content_id)
        .bind(outcome.account_id)
        .bind(outcome.platform.as_str())
        .bind(outcome.success)
        .bind(&outcome.social_post_id)
        .bind(&outcome.error)
        .bind(outcome.attempted_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn account_outcomes(&self, content_id: Uuid) -> Result<Vec<AccountOutcome>, StoreError> {
        let outcomes = sqlx::query_as::<_, AccountOutcome>(
            r#"
            SELECT content_id, account_id, platform, success, social_post_id, error, attempted_at
            FROM publish_outcomes
            WHERE content_id = $1
            ORDER BY attempted_at, account_id
            "#,
        )
        .bind(content_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(outcomes)
    }
}
