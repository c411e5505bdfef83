// Error handling framework

use crate::models::{JobStatus, Platform};
use crate::retry::Retryable;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Classification of a platform failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformErrorKind {
    /// Connection refused, reset, DNS failure
    Network,
    /// The call did not complete within its time bound
    Timeout,
    /// HTTP 429 or a local rate limit hit
    RateLimited,
    /// HTTP 5xx
    Server,
    /// HTTP 400/422 or a payload rejected before sending
    Validation,
    /// HTTP 401/403
    Auth,
    /// HTTP 404
    NotFound,
    /// 2xx response the adapter could not interpret
    InvalidResponse,
}

impl PlatformErrorKind {
    /// Transient kinds are worth another attempt
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            PlatformErrorKind::Network
                | PlatformErrorKind::Timeout
                | PlatformErrorKind::RateLimited
                | PlatformErrorKind::Server
        )
    }

    /// Map a non-success HTTP status to a kind
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => PlatformErrorKind::RateLimited,
            401 | 403 => PlatformErrorKind::Auth,
            404 => PlatformErrorKind::NotFound,
            500..=599 => PlatformErrorKind::Server,
            408 => PlatformErrorKind::Timeout,
            _ => PlatformErrorKind::Validation,
        }
    }
}

impl std::fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlatformErrorKind::Network => "network error",
            PlatformErrorKind::Timeout => "timeout",
            PlatformErrorKind::RateLimited => "rate limited",
            PlatformErrorKind::Server => "server error",
            PlatformErrorKind::Validation => "rejected",
            PlatformErrorKind::Auth => "unauthorized",
            PlatformErrorKind::NotFound => "not found",
            PlatformErrorKind::InvalidResponse => "invalid response",
        };
        f.write_str(label)
    }
}

/// Failure reported by a platform adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{platform} {kind}: {message}")]
pub struct PlatformError {
    pub platform: Platform,
    pub kind: PlatformErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl PlatformError {
    pub fn new(platform: Platform, kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build from a non-success HTTP response
    pub fn from_status(platform: Platform, status: u16, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind: PlatformErrorKind::from_status(status),
            status: Some(status),
            message: format!("HTTP {}: {}", status, message.into()),
        }
    }

    /// Build from a transport-level reqwest failure
    pub fn from_transport(platform: Platform, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            PlatformErrorKind::Timeout
        } else if err.is_builder() {
            PlatformErrorKind::Validation
        } else {
            PlatformErrorKind::Network
        };
        Self::new(platform, kind, err.to_string())
    }

    pub fn validation(platform: Platform, message: impl Into<String>) -> Self {
        Self::new(platform, PlatformErrorKind::Validation, message)
    }

    pub fn invalid_response(platform: Platform, message: impl Into<String>) -> Self {
        Self::new(platform, PlatformErrorKind::InvalidResponse, message)
    }

    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl Retryable for PlatformError {
    fn is_retryable(&self) -> bool {
        self.retryable()
    }
}

/// Token refresh errors; all of them are permanent for the account
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Access token for account {0} expired and no refresh token is stored")]
    MissingRefreshToken(Uuid),

    #[error("No OAuth client configured for {0}")]
    NoOAuthClient(Platform),

    #[error("Token refresh rejected with status {status}: {message}")]
    RefreshRejected { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Failed to persist refreshed token: {0}")]
    Storage(String),
}

/// Scheduled job store and collaborator store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Scheduled job not found: {0}")]
    NotFound(Uuid),

    #[error("Scheduled job {id} is {status}")]
    Conflict { id: Uuid, status: JobStatus },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Whole-request publishing failures; per-account failures are results, not errors
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Content not found: {0}")]
    ContentNotFound(Uuid),

    #[error("Invalid publish request: {0}")]
    Validation(String),

    #[error("Account {account_id} already published content {content_id}")]
    AlreadyPublished { content_id: Uuid, account_id: Uuid },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        PublishError::Storage(err.to_string())
    }
}

/// Scheduling coordinator errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

// Implement From for common external errors
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}
