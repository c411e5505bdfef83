// Social account repository

use crate::db::DbPool;
use crate::errors::StoreError;
use crate::models::{Platform, RefreshedTokens, SocialAccount};
use crate::store::AccountStore;
use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, user_id, platform, platform_user_id, is_active, \
     access_token, refresh_token, token_expires_at";

/// Repository for connected social accounts
#[derive(Clone)]
pub struct AccountRepository {
    pool: DbPool,
}

impl AccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    #[instrument(skip(self))]
    async fn get_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<SocialAccount>, StoreError> {
        let sql = format!(
            "SELECT {} FROM social_accounts WHERE id = $1 AND user_id = $2",
            ACCOUNT_COLUMNS
        );

        let account = sqlx::query_as::<_, SocialAccount>(&sql)
            .bind(account_id)
            .bind(user_id)
            .fetch_optional(self.pool.pool())
            .await?;
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn get_active_account(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SocialAccount>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM social_accounts
            WHERE user_id = $1 AND platform = $2 AND is_active
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
            ACCOUNT_COLUMNS
        );

        let account = sqlx::query_as::<_, SocialAccount>(&sql)
            .bind(user_id)
            .bind(platform.as_str())
            .fetch_optional(self.pool.pool())
            .await?;
        Ok(account)
    }

    #[instrument(skip(self, tokens))]
    async fn update_tokens(
        &self,
        account_id: Uuid,
        tokens: &RefreshedTokens,
    ) -> Result<(), StoreError> {
        // Providers that do not rotate refresh tokens return none; keep the stored one
        let result = sqlx::query(
            r#"
            UPDATE social_accounts
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                token_expires_at = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Storage(format!(
                "social account {} not found",
                account_id
            )));
        }

        tracing::info!(account_id = %account_id, "Stored refreshed access token");
        Ok(())
    }
}
