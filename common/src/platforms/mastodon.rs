// Mastodon adapter (statuses API)

use super::{compose_text, ensure_within_limit, read_json, send, PlatformAdapter, PublishTarget, PublishedPost};
use crate::errors::PlatformError;
use crate::models::{ContentItem, Platform};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

pub const STATUS_CHAR_LIMIT: usize = 500;

pub struct MastodonAdapter {
    client: Client,
    base_url: String,
}

impl MastodonAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `POST /api/v1/statuses` body
    pub fn build_payload(content: &ContentItem) -> Result<Value, PlatformError> {
        let status = compose_text(content);
        ensure_within_limit(Platform::Mastodon, &status, STATUS_CHAR_LIMIT)?;
        Ok(json!({ "status": status, "visibility": "public" }))
    }

    /// Same content and account always map to the same key, so a retried
    /// request the server already accepted is not posted twice
    pub fn idempotency_key(content_id: Uuid, account_id: Uuid) -> String {
        format!("{}:{}", content_id, account_id)
    }
}

#[async_trait]
impl PlatformAdapter for MastodonAdapter {
    fn platform(&self) -> Platform {
        Platform::Mastodon
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
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(&target.access_token)
            .header(
                "Idempotency-Key",
                Self::idempotency_key(content.id, target.account_id),
            )
            .json(&payload);

        let body = read_json(Platform::Mastodon, send(Platform::Mastodon, request).await?).await?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::invalid_response(Platform::Mastodon, "response has no id"))?;

        tracing::info!(social_post_id = %id, "Mastodon status created");
        Ok(PublishedPost {
            social_post_id: id.to_string(),
            url: body.get("url").and_then(Value::as_str).map(str::to_string),
        })
    }
}
