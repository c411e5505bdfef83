// Configuration management with layered configuration (file, env)

use crate::errors::ValidationError;
use crate::models::Platform;
use crate::rate_limit::RateLimitConfig;
use crate::retry::{BackoffPolicy, RetryConfig, Retryable};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSettings,
    pub publishing: PublishingSettings,
    pub platforms: PlatformsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

/// Trigger loop and claim settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub batch_limit: u32,
    pub worker_concurrency: usize,
    pub poll_interval_seconds: u64,
    /// Jobs in `publishing` longer than this are failed as interrupted
    pub claim_timeout_seconds: u64,
    /// Bearer secret for `POST /internal/trigger`; the endpoint is disabled when unset
    #[serde(default)]
    pub trigger_secret: Option<String>,
}

/// Outbound call, retry and rate limit settings shared by every platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingSettings {
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub jitter_factor: f64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
    /// Refresh access tokens expiring within this many seconds
    pub token_refresh_skew_seconds: i64,
}

impl PublishingSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_config<E: Retryable + 'static>(&self) -> RetryConfig<E> {
        RetryConfig::new(
            self.max_attempts,
            BackoffPolicy::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
                self.backoff_multiplier,
            )
            .with_jitter(self.jitter_factor),
        )
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_secs(self.rate_limit_window_seconds),
        }
    }
}

/// OAuth2 client used to refresh a platform's access tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEndpointConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub base_url: String,
    /// Versioned API header value, e.g. LinkedIn's `LinkedIn-Version`
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub oauth: Option<OAuthClientConfig>,
}

fn default_enabled() -> bool {
    true
}

impl PlatformEndpointConfig {
    fn new(base_url: &str) -> Self {
        Self {
            enabled: true,
            base_url: base_url.to_string(),
            api_version: None,
            oauth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub twitter: PlatformEndpointConfig,
    pub linkedin: PlatformEndpointConfig,
    pub facebook: PlatformEndpointConfig,
    pub mastodon: PlatformEndpointConfig,
}

impl PlatformsConfig {
    pub fn endpoint(&self, platform: Platform) -> &PlatformEndpointConfig {
        match platform {
            Platform::Twitter => &self.twitter,
            Platform::Linkedin => &self.linkedin,
            Platform::Facebook => &self.facebook,
            Platform::Mastodon => &self.mastodon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        fn invalid(field: &str, reason: &str) -> ValidationError {
            ValidationError::InvalidFieldValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.server.port == 0 {
            return Err(invalid("server.port", "must be greater than 0"));
        }

        if self.database.url.is_empty() {
            return Err(ValidationError::MissingField("database.url".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be greater than 0"));
        }

        if self.scheduler.batch_limit == 0 {
            return Err(invalid("scheduler.batch_limit", "must be greater than 0"));
        }
        if self.scheduler.worker_concurrency == 0 {
            return Err(invalid("scheduler.worker_concurrency", "must be greater than 0"));
        }
        if self.scheduler.poll_interval_seconds == 0 {
            return Err(invalid("scheduler.poll_interval_seconds", "must be greater than 0"));
        }
        // A claim must be allowed to outlive a full retry sequence
        if self.scheduler.claim_timeout_seconds <= self.publishing.timeout_seconds {
            return Err(invalid(
                "scheduler.claim_timeout_seconds",
                "must exceed publishing.timeout_seconds",
            ));
        }
        if matches!(&self.scheduler.trigger_secret, Some(secret) if secret.len() < 16) {
            return Err(invalid(
                "scheduler.trigger_secret",
                "must be at least 16 characters",
            ));
        }

        if self.publishing.max_attempts == 0 {
            return Err(invalid("publishing.max_attempts", "must be at least 1"));
        }
        if self.publishing.timeout_seconds == 0 {
            return Err(invalid("publishing.timeout_seconds", "must be greater than 0"));
        }
        if self.publishing.backoff_multiplier < 1.0 {
            return Err(invalid("publishing.backoff_multiplier", "must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&self.publishing.jitter_factor) {
            return Err(invalid("publishing.jitter_factor", "must be within 0.0..=1.0"));
        }
        if self.publishing.base_delay_ms > self.publishing.max_delay_ms {
            return Err(invalid(
                "publishing.base_delay_ms",
                "must not exceed publishing.max_delay_ms",
            ));
        }
        if self.publishing.rate_limit_max_requests == 0 {
            return Err(invalid(
                "publishing.rate_limit_max_requests",
                "must be greater than 0",
            ));
        }

        for platform in Platform::ALL {
            let endpoint = self.platforms.endpoint(platform);
            if endpoint.enabled && endpoint.base_url.is_empty() {
                return Err(ValidationError::MissingField(format!(
                    "platforms.{}.base_url",
                    platform
                )));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/postline".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            scheduler: SchedulerSettings {
                batch_limit: 50,
                worker_concurrency: 8,
                poll_interval_seconds: 30,
                claim_timeout_seconds: 900,
                trigger_secret: None,
            },
            publishing: PublishingSettings {
                timeout_seconds: 30,
                max_attempts: 2,
                base_delay_ms: 3_000,
                max_delay_ms: 30_000,
                backoff_multiplier: 2.0,
                jitter_factor: 0.0,
                rate_limit_max_requests: 50,
                rate_limit_window_seconds: 900,
                token_refresh_skew_seconds: 300,
            },
            platforms: PlatformsConfig {
                twitter: PlatformEndpointConfig::new("https://api.twitter.com"),
                linkedin: PlatformEndpointConfig {
                    api_version: Some("202401".to_string()),
                    ..PlatformEndpointConfig::new("https://api.linkedin.com")
                },
                facebook: PlatformEndpointConfig::new("https://graph.facebook.com/v19.0"),
                mastodon: PlatformEndpointConfig::new("https://mastodon.social"),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
                tracing_endpoint: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PlatformError;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_empty_database_url() {
        let mut settings = Settings::default();
        settings.database.url = String::new();
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_validation_catches_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_short_trigger_secret() {
        let mut settings = Settings::default();
        settings.scheduler.trigger_secret = Some("short".to_string());
        assert!(settings.validate().is_err());

        settings.scheduler.trigger_secret = Some("a-long-enough-shared-secret".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_claim_timeout_below_call_timeout() {
        let mut settings = Settings::default();
        settings.scheduler.claim_timeout_seconds = 10;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_enabled_platform_without_url() {
        let mut settings = Settings::default();
        settings.platforms.mastodon.base_url = String::new();
        assert!(settings.validate().is_err());

        settings.platforms.mastodon.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_publishing_defaults_match_platform_retry_policy() {
        let settings = Settings::default();
        let retry: RetryConfig<PlatformError> = settings.publishing.retry_config();
        let expected = RetryConfig::<PlatformError>::platform_default();

        assert_eq!(retry.max_attempts, expected.max_attempts);
        assert_eq!(retry.backoff, expected.backoff);
        assert_eq!(settings.publishing.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_from_missing_directory_uses_defaults() {
        let settings = Settings::load_from_path("does-not-exist").unwrap();
        assert_eq!(settings.scheduler.batch_limit, 50);
        assert_eq!(settings.platforms.linkedin.api_version.as_deref(), Some("202401"));
    }
}
