// Platform adapters: one outbound publish call per social platform

pub mod facebook;
pub mod linkedin;
pub mod mastodon;
pub mod twitter;

use crate::config::PlatformsConfig;
use crate::errors::PlatformError;
use crate::models::{ContentItem, Platform};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use facebook::FacebookAdapter;
pub use linkedin::LinkedinAdapter;
pub use mastodon::MastodonAdapter;
pub use twitter::TwitterAdapter;

/// Account-specific inputs for one publish call
#[derive(Debug, Clone)]
pub struct PublishTarget {
    pub account_id: Uuid,
    /// Author URN, page id or handle depending on the platform
    pub platform_user_id: String,
    pub access_token: String,
}

/// A post the platform accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub social_post_id: String,
    pub url: Option<String>,
}

/// PlatformAdapter publishes a content item to a single account
///
/// Implementations perform exactly one outbound call per `publish` and keep
/// no state between calls; retries and timeouts belong to the caller.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish(
        &self,
        content: &ContentItem,
        target: &PublishTarget,
    ) -> Result<PublishedPost, PlatformError>;
}

/// Platform to adapter lookup, resolved once per account
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the platform it reports
    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    /// Build the HTTP adapters for every enabled platform
    pub fn from_settings(
        platforms: &PlatformsConfig,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let mut registry = Self::new();

        for platform in Platform::ALL {
            let endpoint = platforms.endpoint(platform);
            if !endpoint.enabled {
                tracing::info!(platform = %platform, "Platform disabled by configuration");
                continue;
            }

            let client = http_client(platform, timeout)?;
            let base_url = endpoint.base_url.clone();
            let adapter: Arc<dyn PlatformAdapter> = match platform {
                Platform::Twitter => Arc::new(TwitterAdapter::new(client, base_url)),
                Platform::Linkedin => Arc::new(LinkedinAdapter::new(
                    client,
                    base_url,
                    endpoint.api_version.clone(),
                )),
                Platform::Facebook => Arc::new(FacebookAdapter::new(client, base_url)),
                Platform::Mastodon => Arc::new(MastodonAdapter::new(client, base_url)),
            };
            registry = registry.with_adapter(adapter);
        }

        Ok(registry)
    }

    pub fn resolve(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

/// HTTP client bounded by the platform call timeout
pub fn http_client(platform: Platform, timeout: Duration) -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("postline/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            PlatformError::validation(platform, format!("Failed to create HTTP client: {}", e))
        })
}

/// Normalize hashtags to `#tag` form, dropping empties and duplicates
pub fn normalize_hashtags(hashtags: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for tag in hashtags {
        let bare: String = tag
            .trim()
            .trim_start_matches('#')
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if bare.is_empty() {
            continue;
        }
        if !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(&bare)) {
            seen.push(bare);
        }
    }
    seen
}

/// Post body with hashtags appended as `#tag` words on their own paragraph
pub fn compose_text(content: &ContentItem) -> String {
    let body = content.content.trim();
    let tags = normalize_hashtags(&content.hashtags);
    if tags.is_empty() {
        return body.to_string();
    }

    let tags: Vec<String> = tags.iter().map(|t| format!("#{}", t)).collect();
    if body.is_empty() {
        tags.join(" ")
    } else {
        format!("{}\n\n{}", body, tags.join(" "))
    }
}

/// Reject text longer than the platform's character limit
pub fn ensure_within_limit(platform: Platform, text: &str, limit: usize) -> Result<(), PlatformError> {
    let length = text.chars().count();
    if length > limit {
        return Err(PlatformError::validation(
            platform,
            format!("post is {} characters, limit is {}", length, limit),
        ));
    }
    if length == 0 {
        return Err(PlatformError::validation(platform, "post text is empty"));
    }
    Ok(())
}

/// Send a request and turn transport failures and non-2xx statuses into errors
pub(crate) async fn send(platform: Platform, request: RequestBuilder) -> Result<Response, PlatformError> {
    let response = request
        .send()
        .await
        .map_err(|e| PlatformError::from_transport(platform, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    tracing::warn!(
        platform = %platform,
        status = status.as_u16(),
        message = %message,
        "Platform rejected publish request"
    );
    Err(PlatformError::from_status(platform, status.as_u16(), message))
}

/// Parse a 2xx JSON body
pub(crate) async fn read_json(
    platform: Platform,
    response: Response,
) -> Result<serde_json::Value, PlatformError> {
    response.json().await.map_err(|e| {
        PlatformError::invalid_response(platform, format!("unreadable response body: {}", e))
    })
}

/// Best-effort human-readable message from a platform error body
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        // Twitter: detail; LinkedIn: message; Facebook: error.message; Mastodon: error
        let candidates = [
            json.get("detail"),
            json.get("message"),
            json.pointer("/error/message"),
            json.get("error"),
            json.get("title"),
        ];
        if let Some(message) = candidates
            .into_iter()
            .flatten()
            .find_map(|value| value.as_str())
        {
            return Some(message.to_string());
        }
    }

    Some(trimmed.chars().take(200).collect())
}
