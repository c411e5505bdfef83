// Facebook Pages adapter (Graph API feed and photos edges)

use super::{compose_text, read_json, send, PlatformAdapter, PublishTarget, PublishedPost};
use crate::errors::PlatformError;
use crate::models::{ContentItem, Platform};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Graph API edge and form fields for one page post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacebookRequest {
    /// `photos` when the content carries an image, otherwise `feed`
    pub edge: &'static str,
    pub form: Vec<(&'static str, String)>,
}

pub struct FacebookAdapter {
    client: Client,
    base_url: String,
}

impl FacebookAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn build_request(content: &ContentItem) -> Result<FacebookRequest, PlatformError> {
        let text = compose_text(content);
        let image_url = content
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());

        match image_url {
            Some(url) => Ok(FacebookRequest {
                edge: "photos",
                form: vec![("url", url.to_string()), ("caption", text)],
            }),
            None if text.is_empty() => Err(PlatformError::validation(
                Platform::Facebook,
                "post has neither text nor image",
            )),
            None => Ok(FacebookRequest {
                edge: "feed",
                form: vec![("message", text)],
            }),
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    #[tracing::instrument(skip_all, fields(content_id = %content.id, account_id = %target.account_id))]
    async fn publish(
        &self,
        content: &ContentItem,
        target: &PublishTarget,
    ) -> Result<PublishedPost, PlatformError> {
        let FacebookRequest { edge, form } = Self::build_request(content)?;

        let request = self
            .client
            .post(format!(
                "{}/{}/{}",
                self.base_url, target.platform_user_id, edge
            ))
            .bearer_auth(&target.access_token)
            .form(&form);

        let body = read_json(Platform::Facebook, send(Platform::Facebook, request).await?).await?;

        // Photos return the photo id plus the feed story id; prefer the story
        let id = ["post_id", "id"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .ok_or_else(|| PlatformError::invalid_response(Platform::Facebook, "response has no id"))?;

        tracing::info!(social_post_id = %id, edge = edge, "Facebook page post created");
        Ok(PublishedPost {
            social_post_id: id.to_string(),
            url: Some(format!("https://www.facebook.com/{}", id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PlatformErrorKind;
    use crate::platforms::tests::content;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target() -> PublishTarget {
        PublishTarget {
            account_id: Uuid::new_v4(),
            platform_user_id: "1122334455".to_string(),
            access_token: "page-token".to_string(),
        }
    }

    #[test]
    fn test_text_only_goes_to_feed() {
        let request = FacebookAdapter::build_request(&content("Hi", &["rust"], None)).unwrap();
        assert_eq!(request.edge, "feed");
        assert_eq!(request.form, vec![("message", "Hi\n\n#rust".to_string())]);
    }

    #[test]
    fn test_image_goes_to_photos() {
        let request = FacebookAdapter::build_request(&content(
            "Cover",
            &[],
            Some("https://cdn.example.com/cover.png"),
        ))
        .unwrap();
        assert_eq!(request.edge, "photos");
        assert_eq!(
            request.form,
            vec![
                ("url", "https://cdn.example.com/cover.png".to_string()),
                ("caption", "Cover".to_string())
            ]
        );
    }

    #[test]
    fn test_blank_image_url_is_ignored() {
        let request = FacebookAdapter::build_request(&content("Text", &[], Some("  "))).unwrap();
        assert_eq!(request.edge, "feed");
        assert!(FacebookAdapter::build_request(&content("", &[], None)).is_err());
    }

    #[tokio::test]
    async fn test_publish_feed_post() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1122334455/feed"))
            .and(body_string_contains("message=Hello"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "1122334455_998877" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let adapter = FacebookAdapter::new(Client::new(), mock_server.uri());
        let post = adapter
            .publish(&content("Hello", &[], None), &target())
            .await
            .unwrap();
        assert_eq!(post.social_post_id, "1122334455_998877");
    }

    #[tokio::test]
    async fn test_publish_photo_prefers_post_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1122334455/photos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "555",
                "post_id": "1122334455_556"
            })))
            .mount(&mock_server)
            .await;

        let adapter = FacebookAdapter::new(Client::new(), mock_server.uri());
        let post = adapter
            .publish(
                &content("Cover", &[], Some("https://cdn.example.com/c.png")),
                &target(),
            )
            .await
            .unwrap();
        assert_eq!(post.social_post_id, "1122334455_556");
    }

    #[tokio::test]
    async fn test_publish_expired_token_is_permanent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1122334455/feed"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Error validating access token", "code": 190 }
            })))
            .mount(&mock_server)
            .await;

        let adapter = FacebookAdapter::new(Client::new(), mock_server.uri());
        let err = adapter
            .publish(&content("Hello", &[], None), &target())
            .await
            .unwrap_err();

        assert_eq!(err.kind, PlatformErrorKind::Auth);
        assert!(err.message.contains("Error validating access token"));
    }
}
