// Process-local sliding-window rate limiter for outbound platform calls

use crate::clock::Clock;
use crate::models::Platform;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Window and ceiling applied to every (platform, account) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 50,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// RateLimiter counts requests per (platform, account) in a sliding window
///
/// Advisory and scoped to this process; it never replaces the platform's own
/// limits, it only avoids hammering an account we already know is busy.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn key(platform: Platform, account_id: Uuid) -> String {
        format!("{}:{}", platform, account_id)
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Record a request if the account is under its limit
    ///
    /// # Returns
    /// * `true` if the request is allowed and has been counted
    /// * `false` if the request should be rate limited
    #[tracing::instrument(skip(self))]
    pub async fn check_rate_limit(&self, platform: Platform, account_id: Uuid) -> bool {
        let now = self.clock.now();
        let window_start = self.window_start(now);
        let mut windows = self.windows.lock().await;
        let entries = windows.entry(Self::key(platform, account_id)).or_default();

        while entries.front().is_some_and(|t| *t <= window_start) {
            entries.pop_front();
        }

        let count = entries.len() as u32;
        if count >= self.config.max_requests {
            tracing::warn!(
                platform = %platform,
                account_id = %account_id,
                count = count,
                max_requests = self.config.max_requests,
                "Rate limit exceeded"
            );
            return false;
        }

        entries.push_back(now);

        tracing::debug!(
            platform = %platform,
            account_id = %account_id,
            count = count + 1,
            max_requests = self.config.max_requests,
            "Rate limit check passed"
        );

        true
    }

    /// Requests counted for the account within the current window
    #[tracing::instrument(skip(self))]
    pub async fn get_current_count(&self, platform: Platform, account_id: Uuid) -> u32 {
        let window_start = self.window_start(self.clock.now());
        let windows = self.windows.lock().await;
        windows
            .get(&Self::key(platform, account_id))
            .map(|entries| entries.iter().filter(|t| **t > window_start).count() as u32)
            .unwrap_or(0)
    }

    /// Forget all requests for the account
    #[tracing::instrument(skip(self))]
    pub async fn reset_rate_limit(&self, platform: Platform, account_id: Uuid) {
        self.windows
            .lock()
            .await
            .remove(&Self::key(platform, account_id));

        tracing::info!(platform = %platform, account_id = %account_id, "Reset rate limit");
    }

    /// Drop expired entries and empty keys; returns the number of keys removed
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> usize {
        let window_start = self.window_start(self.clock.now());
        let mut windows = self.windows.lock().await;
        let before = windows.len();

        windows.retain(|_, entries| {
            while entries.front().is_some_and(|t| *t <= window_start) {
                entries.pop_front();
            }
            !entries.is_empty()
        });

        let removed = before - windows.len();
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept idle rate limit windows");
        }
        removed
    }

    /// Number of (platform, account) keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}
