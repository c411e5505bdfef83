// LinkedIn adapter (Posts API)

use super::{normalize_hashtags, send, PlatformAdapter, PublishTarget, PublishedPost};
use crate::errors::PlatformError;
use crate::models::{ContentItem, Platform};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const COMMENTARY_CHAR_LIMIT: usize = 3000;

const RESTLI_ID_HEADER: &str = "x-restli-id";

pub struct LinkedinAdapter {
    client: Client,
    base_url: String,
    api_version: Option<String>,
}

impl LinkedinAdapter {
    pub fn new(client: Client, base_url: impl Into<String>, api_version: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version,
        }
    }

    /// Member URN for a stored platform user id; full URNs pass through
    pub fn author_urn(platform_user_id: &str) -> String {
        if platform_user_id.starts_with("urn:li:") {
            platform_user_id.to_string()
        } else {
            format!("urn:li:person:{}", platform_user_id)
        }
    }

    /// Commentary in LinkedIn's little-text format, hashtags as template fields
    pub fn commentary(content: &ContentItem) -> String {
        let body = escape_little_text(content.content.trim());
        let tags: Vec<String> = normalize_hashtags(&content.hashtags)
            .iter()
            .map(|tag| format!("{{hashtag|\\#|{}}}", tag))
            .collect();

        match (body.is_empty(), tags.is_empty()) {
            (_, true) => body,
            (true, false) => tags.join(" "),
            (false, false) => format!("{}\n\n{}", body, tags.join(" ")),
        }
    }

    /// `POST /rest/posts` body
    pub fn build_payload(
        content: &ContentItem,
        platform_user_id: &str,
    ) -> Result<Value, PlatformError> {
        let commentary = Self::commentary(content);
        let length = commentary.chars().count();
        if length == 0 || length > COMMENTARY_CHAR_LIMIT {
            return Err(PlatformError::validation(
                Platform::Linkedin,
                format!(
                    "commentary is {} characters, allowed 1..={}",
                    length, COMMENTARY_CHAR_LIMIT
                ),
            ));
        }

        Ok(json!({
            "author": Self::author_urn(platform_user_id),
            "commentary": commentary,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": []
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false
        }))
    }
}

/// Escape the characters little-text reserves for templates and markup
fn escape_little_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '|' | '{' | '}' | '@' | '[' | ']' | '(' | ')' | '<' | '>' | '#' | '*' | '_' | '~'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl PlatformAdapter for LinkedinAdapter {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    #[tracing::instrument(skip_all, fields(content_id = %content.id, account_id = %target.account_id))]
    async fn publish(
        &self,
        content: &ContentItem,
        target: &PublishTarget,
    ) -> Result<PublishedPost, PlatformError> {
        let payload = Self::build_payload(content, &target.platform_user_id)?;

        let mut request = self
            .client
            .post(format!("{}/rest/posts", self.base_url))
            .bearer_auth(&target.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&payload);
        if let Some(version) = &self.api_version {
            request = request.header("LinkedIn-Version", version);
        }

        let response = send(Platform::Linkedin, request).await?;
        let id = response
            .headers()
            .get(RESTLI_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                PlatformError::invalid_response(Platform::Linkedin, "response has no x-restli-id header")
            })?
            .to_string();

        tracing::info!(social_post_id = %id, "LinkedIn post created");
        Ok(PublishedPost {
            url: Some(format!("https://www.linkedin.com/feed/update/{}", id)),
            social_post_id: id,
        })
    }
}
