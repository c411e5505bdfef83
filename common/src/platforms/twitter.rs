// X/Twitter adapter (API v2 create tweet)

use super::{compose_text, ensure_within_limit, read_json, send, PlatformAdapter, PublishTarget, PublishedPost};
use crate::errors::PlatformError;
use crate::models::{ContentItem, Platform};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const TWEET_CHAR_LIMIT: usize = 280;

pub struct TwitterAdapter {
    client: Client,
    base_url: String,
}

impl TwitterAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `POST /2/tweets` body; hashtags become `#tag` words in the text
    pub fn build_payload(content: &ContentItem) -> Result<Value, PlatformError> {
        let text = compose_text(content);
        ensure_within_limit(Platform::Twitter, &text, TWEET_CHAR_LIMIT)?;
        Ok(json!({ "text": text }))
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    #[tracing::instrument(skip_all, fields(content_id = %content.id, account_id = %target.account_id))]
    async fn publish(
        &self,
        content: &ContentItem,
        target: &PublishTarget,
    ) -> Result<PublishedPost, PlatformError> {
        let payload = Self::build_payload(content)?;

        let request = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&target.access_token)
            .json(&payload);

        let body = read_json(Platform::Twitter, send(Platform::Twitter, request).await?).await?;
        let id = body
            .pointer("/data/id")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::invalid_response(Platform::Twitter, "response has no data.id"))?;

        tracing::info!(social_post_id = %id, "Tweet created");
        Ok(PublishedPost {
            social_post_id: id.to_string(),
            url: Some(format!("https://x.com/i/web/status/{}", id)),
        })
    }
}
