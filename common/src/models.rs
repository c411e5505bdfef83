use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Platforms
// ============================================================================

/// External social platform a content item targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Linkedin,
    Facebook,
    Mastodon,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Mastodon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Mastodon => "mastodon",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            "facebook" => Ok(Platform::Facebook),
            "mastodon" => Ok(Platform::Mastodon),
            _ => Err(format!("Invalid platform: {}", s)),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

// ============================================================================
// Scheduled Job Models
// ============================================================================

/// JobStatus is the lifecycle state of a scheduled publication
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Publishing,
    Published,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses see no further automatic transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Published | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// `Failed -> Publishing` is only reachable through an explicit user retry.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Scheduled, JobStatus::Publishing)
                | (JobStatus::Scheduled, JobStatus::Cancelled)
                | (JobStatus::Scheduled, JobStatus::Scheduled)
                | (JobStatus::Publishing, JobStatus::Published)
                | (JobStatus::Publishing, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Publishing)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Scheduled => write!(f, "scheduled"),
            JobStatus::Publishing => write!(f, "publishing"),
            JobStatus::Published => write!(f, "published"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobStatus::Scheduled),
            "publishing" => Ok(JobStatus::Publishing),
            "published" => Ok(JobStatus::Published),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// ScheduledJob publishes one content item to a set of accounts at a due time
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub account_ids: Vec<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Build a freshly scheduled job from a request
    pub fn from_request(request: NewScheduledJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            content_id: request.content_id,
            account_ids: request.account_ids,
            scheduled_at: request.scheduled_at,
            status: JobStatus::Scheduled,
            retry_count: 0,
            last_error: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A due job is still scheduled and its time has come
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Scheduled && self.scheduled_at <= now
    }
}

/// Request to schedule a publication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduledJob {
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub account_ids: Vec<Uuid>,
    pub scheduled_at: DateTime<Utc>,
}

/// Final outcome recorded for a claimed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResolution {
    Published,
    Failed { error: String },
}

impl JobResolution {
    pub fn status(&self) -> JobStatus {
        match self {
            JobResolution::Published => JobStatus::Published,
            JobResolution::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobResolution::Published => None,
            JobResolution::Failed { error } => Some(error),
        }
    }

    /// Published only when every account result succeeded
    pub fn from_results(results: &[PublishResult]) -> Self {
        match first_error(results) {
            None if !results.is_empty() => JobResolution::Published,
            None => JobResolution::Failed {
                error: "no accounts were published".to_string(),
            },
            Some(error) => JobResolution::Failed { error },
        }
    }
}

/// Summary of one trigger invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessSummary {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    pub recovered: usize,
}

// ============================================================================
// Publishing Models
// ============================================================================

/// Outcome of publishing one content item to one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishResult {
    pub content_id: Uuid,
    pub account_id: Uuid,
    pub platform: Platform,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
    pub attempts: u32,
}

impl PublishResult {
    pub fn success(
        content_id: Uuid,
        account_id: Uuid,
        platform: Platform,
        social_post_id: String,
        attempts: u32,
    ) -> Self {
        Self {
            content_id,
            account_id,
            platform,
            success: true,
            social_post_id: Some(social_post_id),
            error: None,
            retryable: false,
            attempts,
        }
    }

    pub fn failure(
        content_id: Uuid,
        account_id: Uuid,
        platform: Platform,
        error: impl Into<String>,
        retryable: bool,
        attempts: u32,
    ) -> Self {
        Self {
            content_id,
            account_id,
            platform,
            success: false,
            social_post_id: None,
            error: Some(error.into()),
            retryable,
            attempts,
        }
    }
}

/// First failure message in result order, if any account failed
pub fn first_error(results: &[PublishResult]) -> Option<String> {
    results.iter().find(|r| !r.success).map(|r| {
        r.error
            .clone()
            .unwrap_or_else(|| "publish failed".to_string())
    })
}

/// Latest persisted outcome for one (content, account) pair
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AccountOutcome {
    pub content_id: Uuid,
    pub account_id: Uuid,
    #[sqlx(try_from = "String")]
    pub platform: Platform,
    pub success: bool,
    pub social_post_id: Option<String>,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl AccountOutcome {
    pub fn from_result(result: &PublishResult, attempted_at: DateTime<Utc>) -> Self {
        Self {
            content_id: result.content_id,
            account_id: result.account_id,
            platform: result.platform,
            success: result.success,
            social_post_id: result.social_post_id.clone(),
            error: result.error.clone(),
            attempted_at,
        }
    }
}

// ============================================================================
// External Collaborator Models
// ============================================================================

/// ContentStatus is the aggregate publication state of a content item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentStatus::Draft => write!(f, "draft"),
            ContentStatus::Scheduled => write!(f, "scheduled"),
            ContentStatus::Published => write!(f, "published"),
            ContentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "scheduled" => Ok(ContentStatus::Scheduled),
            "published" => Ok(ContentStatus::Published),
            "failed" => Ok(ContentStatus::Failed),
            _ => Err(format!("Invalid content status: {}", s)),
        }
    }
}

impl TryFrom<String> for ContentStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// ContentItem is a generated social post owned by the content service
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ContentItem {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub platform: Platform,
    pub content: String,
    pub hashtags: Vec<String>,
    pub image_url: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ContentStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub social_post_id: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate status written back to a content item after publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentStatusUpdate {
    Published { social_post_id: Option<String> },
    Failed { error: String },
}

/// SocialAccount is a connected platform account owned by the account service
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SocialAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub platform: Platform,
    /// Author URN, page id or handle depending on the platform
    pub platform_user_id: String,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Token material returned by an OAuth refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool, error: Option<&str>) -> PublishResult {
        if success {
            PublishResult::success(Uuid::new_v4(), Uuid::new_v4(), Platform::Twitter, "1".into(), 1)
        } else {
            PublishResult::failure(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Platform::Twitter,
                error.unwrap_or("boom"),
                false,
                1,
            )
        }
    }

    #[test]
    fn test_job_status_round_trips_through_strings() {
        for status in [
            JobStatus::Scheduled,
            JobStatus::Publishing,
            JobStatus::Published,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::from_str(&status.to_string()), Ok(status));
        }
        assert!(JobStatus::from_str("running").is_err());
    }

    #[test]
    fn test_state_machine_only_moves_forward() {
        assert!(JobStatus::Scheduled.can_transition_to(JobStatus::Publishing));
        assert!(JobStatus::Scheduled.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Publishing.can_transition_to(JobStatus::Published));
        assert!(JobStatus::Publishing.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Publishing.can_transition_to(JobStatus::Scheduled));
        assert!(!JobStatus::Publishing.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Published.can_transition_to(JobStatus::Publishing));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Scheduled));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Scheduled));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Published.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Scheduled.is_terminal());
        assert!(!JobStatus::Publishing.is_terminal());
    }

    #[test]
    fn test_platform_parsing_accepts_x_alias() {
        assert_eq!(Platform::from_str("x"), Ok(Platform::Twitter));
        assert_eq!(Platform::from_str("mastodon"), Ok(Platform::Mastodon));
        assert!(Platform::from_str("myspace").is_err());
    }

    #[test]
    fn test_resolution_from_results() {
        assert_eq!(
            JobResolution::from_results(&[result(true, None), result(true, None)]),
            JobResolution::Published
        );
        assert_eq!(
            JobResolution::from_results(&[result(true, None), result(false, Some("HTTP 401"))]),
            JobResolution::Failed {
                error: "HTTP 401".to_string()
            }
        );
        assert!(matches!(
            JobResolution::from_results(&[]),
            JobResolution::Failed { .. }
        ));
    }

    #[test]
    fn test_publish_result_serialization_omits_empty_fields() {
        let json = serde_json::to_value(result(true, None)).unwrap();
        assert_eq!(json["platform"], "twitter");
        assert!(json.get("error").is_none());
        assert_eq!(json["social_post_id"], "1");
    }
}
