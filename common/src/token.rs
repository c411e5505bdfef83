// Access token provider with OAuth2 refresh

use crate::clock::Clock;
use crate::config::{OAuthClientConfig, PlatformsConfig};
use crate::errors::TokenError;
use crate::models::{Platform, RefreshedTokens, SocialAccount};
use crate::store::AccountStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// TokenProvider hands out an access token that is valid right now
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_valid_access_token(&self, account: &SocialAccount) -> Result<String, TokenError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Refreshes expiring tokens through the platform's OAuth2 `refresh_token` grant
///
/// Tokens without an expiry, or expiring later than the skew window, are
/// returned as stored. Refreshed tokens are persisted before being returned.
pub struct OAuthTokenProvider {
    client: Client,
    clients: HashMap<Platform, OAuthClientConfig>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    skew: chrono::Duration,
}

impl OAuthTokenProvider {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        skew: chrono::Duration,
        timeout: Duration,
    ) -> Result<Self, TokenError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TokenError::RefreshFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            clients: HashMap::new(),
            accounts,
            clock,
            skew,
        })
    }

    /// Register the OAuth client for every platform that configures one
    pub fn from_settings(
        platforms: &PlatformsConfig,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        skew: chrono::Duration,
        timeout: Duration,
    ) -> Result<Self, TokenError> {
        let mut provider = Self::new(accounts, clock, skew, timeout)?;
        for platform in Platform::ALL {
            if let Some(oauth) = &platforms.endpoint(platform).oauth {
                provider = provider.with_client(platform, oauth.clone());
            }
        }
        Ok(provider)
    }

    pub fn with_client(mut self, platform: Platform, config: OAuthClientConfig) -> Self {
        self.clients.insert(platform, config);
        self
    }

    /// Whether the stored token expires within the skew window
    pub fn needs_refresh(&self, account: &SocialAccount, now: DateTime<Utc>) -> bool {
        account
            .token_expires_at
            .is_some_and(|expires_at| expires_at - self.skew <= now)
    }

    #[tracing::instrument(skip(self, account, refresh_token), fields(account_id = %account.id, platform = %account.platform))]
    async fn refresh(
        &self,
        account: &SocialAccount,
        refresh_token: &str,
    ) -> Result<RefreshedTokens, TokenError> {
        let oauth = self
            .clients
            .get(&account.platform)
            .ok_or(TokenError::NoOAuthClient(account.platform))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&oauth.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenError::RefreshFailed(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::RefreshRejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            TokenError::RefreshFailed(format!("Failed to parse token response: {}", e))
        })?;

        let now = self.clock.now();
        Ok(RefreshedTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .and_then(|secs| now.checked_add_signed(chrono::Duration::seconds(secs))),
        })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn get_valid_access_token(&self, account: &SocialAccount) -> Result<String, TokenError> {
        if !self.needs_refresh(account, self.clock.now()) {
            return Ok(account.access_token.clone());
        }

        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(TokenError::MissingRefreshToken(account.id))?;

        let tokens = self.refresh(account, refresh_token).await?;
        self.accounts
            .update_tokens(account.id, &tokens)
            .await
            .map_err(|e| TokenError::Storage(e.to_string()))?;

        tracing::info!(
            account_id = %account.id,
            platform = %account.platform,
            expires_at = ?tokens.expires_at,
            "Access token refreshed"
        );
        Ok(tokens.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::InMemoryAccountStore;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account(expires_at: Option<DateTime<Utc>>, refresh: Option<&str>) -> SocialAccount {
        SocialAccount {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            platform: Platform::Linkedin,
            platform_user_id: "abc123".to_string(),
            is_active: true,
            access_token: "stored-token".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_expires_at: expires_at,
        }
    }

    fn provider(
        accounts: Arc<InMemoryAccountStore>,
        clock: Arc<ManualClock>,
    ) -> OAuthTokenProvider {
        OAuthTokenProvider::new(
            accounts,
            clock,
            chrono::Duration::minutes(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_as_stored() {
        let clock = Arc::new(ManualClock::default());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let provider = provider(accounts, clock.clone());

        let later = account(Some(clock.now() + chrono::Duration::hours(2)), None);
        assert_eq!(
            provider.get_valid_access_token(&later).await.unwrap(),
            "stored-token"
        );

        let never = account(None, None);
        assert_eq!(
            provider.get_valid_access_token(&never).await.unwrap(),
            "stored-token"
        );
    }

    #[tokio::test]
    async fn test_expiring_token_without_refresh_token_fails() {
        let clock = Arc::new(ManualClock::default());
        let provider = provider(Arc::new(InMemoryAccountStore::new()), clock.clone());

        let expiring = account(Some(clock.now() + chrono::Duration::minutes(1)), None);
        assert!(matches!(
            provider.get_valid_access_token(&expiring).await,
            Err(TokenError::MissingRefreshToken(id)) if id == expiring.id
        ));
    }

    #[tokio::test]
    async fn test_expiring_token_without_oauth_client_fails() {
        let clock = Arc::new(ManualClock::default());
        let provider = provider(Arc::new(InMemoryAccountStore::new()), clock.clone());

        let expiring = account(Some(clock.now()), Some("refresh"));
        assert!(matches!(
            provider.get_valid_access_token(&expiring).await,
            Err(TokenError::NoOAuthClient(Platform::Linkedin))
        ));
    }

    #[tokio::test]
    async fn test_refresh_persists_new_tokens() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "refresh_token": "new-refresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let clock = Arc::new(ManualClock::default());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let expiring = account(Some(clock.now() + chrono::Duration::minutes(2)), Some("old-refresh"));
        accounts.insert(expiring.clone()).await;

        let provider = provider(accounts.clone(), clock.clone()).with_client(
            Platform::Linkedin,
            OAuthClientConfig {
                token_url: format!("{}/oauth/token", mock_server.uri()),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            },
        );

        let token = provider.get_valid_access_token(&expiring).await.unwrap();
        assert_eq!(token, "fresh-token");

        let stored = accounts.snapshot(expiring.id).await.unwrap();
        assert_eq!(stored.access_token, "fresh-token");
        assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(
            stored.token_expires_at,
            Some(clock.now() + chrono::Duration::seconds(3600))
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&mock_server)
            .await;

        let clock = Arc::new(ManualClock::default());
        let provider = provider(Arc::new(InMemoryAccountStore::new()), clock.clone())
            .with_client(
                Platform::Linkedin,
                OAuthClientConfig {
                    token_url: format!("{}/oauth/token", mock_server.uri()),
                    client_id: "client".to_string(),
                    client_secret: "secret".to_string(),
                },
            );

        let expiring = account(Some(clock.now()), Some("revoked"));
        match provider.get_valid_access_token(&expiring).await {
            Err(TokenError::RefreshRejected { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid_grant");
            }
            other => panic!("expected RefreshRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_provider_can_stand_in() {
        let mut mock = MockTokenProvider::new();
        mock.expect_get_valid_access_token()
            .times(1)
            .returning(|_| Ok("mocked".to_string()));

        let token = mock
            .get_valid_access_token(&account(None, None))
            .await
            .unwrap();
        assert_eq!(token, "mocked");
    }
}
