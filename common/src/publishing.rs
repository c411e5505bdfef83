// Publishing coordinator: fan out one content item to its accounts

use crate::clock::{elapsed_between, Clock};
use crate::config::PublishingSettings;
use crate::errors::{PlatformError, PlatformErrorKind, PublishError};
use crate::models::{
    first_error, AccountOutcome, ContentItem, ContentStatusUpdate, PublishResult, SocialAccount,
};
use crate::platforms::{AdapterRegistry, PlatformAdapter, PublishTarget, PublishedPost};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryConfig, RetryError, RetryExecutor};
use crate::store::{AccountStore, ContentStore};
use crate::telemetry;
use crate::token::TokenProvider;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const ACCOUNT_UNAVAILABLE: &str = "account not found or inactive";

/// Retry policy and per-call bound for platform calls
#[derive(Debug, Clone)]
pub struct PublishingConfig {
    pub retry: RetryConfig<PlatformError>,
    pub call_timeout: Duration,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::platform_default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl PublishingConfig {
    pub fn from_settings(settings: &PublishingSettings) -> Self {
        Self {
            retry: settings.retry_config(),
            call_timeout: settings.call_timeout(),
        }
    }
}

/// PublishingCoordinator publishes content to accounts and keeps the content
/// record and the per-account outcome ledger in step
///
/// One account's failure never aborts its siblings; whole-request errors are
/// limited to missing content, invalid input and store failures.
pub struct PublishingCoordinator {
    contents: Arc<dyn ContentStore>,
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<dyn TokenProvider>,
    adapters: AdapterRegistry,
    executor: Arc<RetryExecutor>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    config: PublishingConfig,
}

impl PublishingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contents: Arc<dyn ContentStore>,
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenProvider>,
        adapters: AdapterRegistry,
        executor: Arc<RetryExecutor>,
        rate_limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        config: PublishingConfig,
    ) -> Self {
        Self {
            contents,
            accounts,
            tokens,
            adapters,
            executor,
            rate_limiter,
            clock,
            config,
        }
    }

    pub fn executor(&self) -> &Arc<RetryExecutor> {
        &self.executor
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn contents(&self) -> &Arc<dyn ContentStore> {
        &self.contents
    }

    /// Publish `content_id` to every account now and write the aggregate back
    ///
    /// Duplicate account ids are published once, keeping first-seen order.
    #[instrument(skip(self, account_ids), fields(accounts = account_ids.len()))]
    pub async fn publish_now(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<PublishResult>, PublishError> {
        if account_ids.is_empty() {
            return Err(PublishError::Validation(
                "at least one account is required".to_string(),
            ));
        }

        let content = self.load_owned_content(user_id, content_id).await?;
        let account_ids = dedup_in_order(account_ids);

        let results = join_all(
            account_ids
                .iter()
                .map(|account_id| self.publish_account(user_id, &content, *account_id)),
        )
        .await;

        self.write_aggregate(&content, &results).await;
        Ok(results)
    }

    /// Publish only the accounts without a successful ledger outcome
    ///
    /// Accounts that already succeeded are reported from the ledger with zero
    /// attempts, so the returned list always covers every requested account.
    #[instrument(skip(self, account_ids), fields(accounts = account_ids.len()))]
    pub async fn resume_publication(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<PublishResult>, PublishError> {
        if account_ids.is_empty() {
            return Err(PublishError::Validation(
                "at least one account is required".to_string(),
            ));
        }

        let content = self.load_owned_content(user_id, content_id).await?;
        let published: HashMap<Uuid, AccountOutcome> = self
            .contents
            .account_outcomes(content_id)
            .await?
            .into_iter()
            .filter(|outcome| outcome.success)
            .map(|outcome| (outcome.account_id, outcome))
            .collect();

        let results = join_all(dedup_in_order(account_ids).into_iter().map(|account_id| {
            let previous = published.get(&account_id).cloned();
            let content = &content;
            async move {
                match previous {
                    Some(outcome) => PublishResult::success(
                        content.id,
                        account_id,
                        outcome.platform,
                        outcome.social_post_id.unwrap_or_default(),
                        0,
                    ),
                    None => self.publish_account(user_id, content, account_id).await,
                }
            }
        }))
        .await;

        self.write_aggregate(&content, &results).await;
        Ok(results)
    }

    /// Retry one account and re-derive the content status from the ledger
    ///
    /// The content becomes published only when every recorded account outcome
    /// is a success; a retry never hides a sibling's failure. Scheduled jobs
    /// are not touched here; `SchedulingCoordinator::retry_publication` closes them.
    #[instrument(skip(self))]
    pub async fn retry_publication(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        account_id: Uuid,
    ) -> Result<PublishResult, PublishError> {
        let content = self.load_owned_content(user_id, content_id).await?;

        let already_published = self
            .contents
            .account_outcomes(content_id)
            .await?
            .iter()
            .any(|outcome| outcome.account_id == account_id && outcome.success);
        if already_published {
            return Err(PublishError::AlreadyPublished {
                content_id,
                account_id,
            });
        }

        let result = self.publish_account(user_id, &content, account_id).await;

        let ledger = self.contents.account_outcomes(content_id).await?;
        let update = match ledger.iter().find(|outcome| !outcome.success) {
            None => ContentStatusUpdate::Published {
                social_post_id: content
                    .social_post_id
                    .clone()
                    .or_else(|| ledger.iter().find_map(|o| o.social_post_id.clone())),
            },
            Some(failed) => ContentStatusUpdate::Failed {
                error: failed
                    .error
                    .clone()
                    .unwrap_or_else(|| "publish failed".to_string()),
            },
        };
        self.write_status(content_id, update).await;

        Ok(result)
    }

    async fn load_owned_content(
        &self,
        user_id: Uuid,
        content_id: Uuid,
    ) -> Result<ContentItem, PublishError> {
        match self.contents.get_content(content_id).await? {
            Some(content) if content.user_id == user_id => Ok(content),
            _ => Err(PublishError::ContentNotFound(content_id)),
        }
    }

    /// Aggregate over a full result set: published only when every account succeeded
    async fn write_aggregate(&self, content: &ContentItem, results: &[PublishResult]) {
        let update = match first_error(results) {
            None => ContentStatusUpdate::Published {
                social_post_id: results.iter().find_map(|r| r.social_post_id.clone()),
            },
            Some(error) => ContentStatusUpdate::Failed { error },
        };
        self.write_status(content.id, update).await;
    }

    async fn write_status(&self, content_id: Uuid, update: ContentStatusUpdate) {
        // Posts are already live; losing the status write must not lose the results
        if let Err(e) = self
            .contents
            .update_content_status(content_id, update, self.clock.now())
            .await
        {
            error!(content_id = %content_id, error = %e, "Failed to update content status");
        }
    }

    /// Run the full per-account pipeline and persist its outcome
    #[instrument(skip(self, content), fields(content_id = %content.id))]
    async fn publish_account(
        &self,
        user_id: Uuid,
        content: &ContentItem,
        account_id: Uuid,
    ) -> PublishResult {
        let started = self.clock.now();
        let result = self.attempt_account(user_id, content, account_id).await;
        let finished = self.clock.now();

        telemetry::record_publish_attempt(result.platform, result.success);
        telemetry::record_publish_duration(
            result.platform,
            elapsed_between(started, finished).as_secs_f64(),
        );

        if let Err(e) = self
            .contents
            .record_account_outcome(AccountOutcome::from_result(&result, finished))
            .await
        {
            error!(account_id = %account_id, error = %e, "Failed to record account outcome");
        }

        if result.success {
            info!(
                account_id = %account_id,
                platform = %result.platform,
                attempts = result.attempts,
                "Published to account"
            );
        } else {
            warn!(
                account_id = %account_id,
                platform = %result.platform,
                attempts = result.attempts,
                error = result.error.as_deref().unwrap_or_default(),
                "Publishing to account failed"
            );
        }
        result
    }

    async fn attempt_account(
        &self,
        user_id: Uuid,
        content: &ContentItem,
        account_id: Uuid,
    ) -> PublishResult {
        let platform = content.platform;
        let failure = |error: String, retryable: bool, attempts: u32| {
            PublishResult::failure(content.id, account_id, platform, error, retryable, attempts)
        };

        let account = match self.accounts.get_account(user_id, account_id).await {
            Ok(Some(account)) if account.is_active && account.platform == platform => account,
            Ok(_) => return failure(ACCOUNT_UNAVAILABLE.to_string(), false, 0),
            Err(e) => return failure(format!("account lookup failed: {}", e), true, 0),
        };

        let Some(adapter) = self.adapters.resolve(platform) else {
            return failure(format!("no adapter configured for {}", platform), false, 0);
        };

        let access_token = match self.tokens.get_valid_access_token(&account).await {
            Ok(token) => token,
            Err(e) => return failure(e.to_string(), false, 0),
        };

        let target = PublishTarget {
            account_id,
            platform_user_id: account.platform_user_id.clone(),
            access_token,
        };

        match self.invoke(adapter.as_ref(), content, &account, &target).await {
            Ok((post, attempts)) => PublishResult::success(
                content.id,
                account_id,
                platform,
                post.social_post_id,
                attempts,
            ),
            Err(err) => {
                let attempts = err.attempts();
                match err.into_last_error() {
                    Some(last) => failure(last.to_string(), last.retryable(), attempts),
                    None => failure("publishing cancelled".to_string(), true, attempts),
                }
            }
        }
    }

    /// Call the adapter through the retry executor, gated by the rate limiter
    async fn invoke(
        &self,
        adapter: &dyn PlatformAdapter,
        content: &ContentItem,
        account: &SocialAccount,
        target: &PublishTarget,
    ) -> Result<(PublishedPost, u32), RetryError<PlatformError>> {
        let attempts = AtomicU32::new(0);
        let platform = account.platform;
        let call_timeout = self.config.call_timeout;
        let rate_limiter = &self.rate_limiter;

        let post = self
            .executor
            .run(&self.config.retry, |attempt| {
                attempts.store(attempt, Ordering::SeqCst);
                async move {
                    if !rate_limiter.check_rate_limit(platform, account.id).await {
                        return Err(PlatformError::new(
                            platform,
                            PlatformErrorKind::RateLimited,
                            "local rate limit reached",
                        ));
                    }

                    match tokio::time::timeout(call_timeout, adapter.publish(content, target)).await {
                        Ok(result) => result,
                        Err(_) => Err(PlatformError::new(
                            platform,
                            PlatformErrorKind::Timeout,
                            format!("no response within {}s", call_timeout.as_secs()),
                        )),
                    }
                }
            })
            .await?;

        Ok((post, attempts.load(Ordering::SeqCst)))
    }
}

fn dedup_in_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
