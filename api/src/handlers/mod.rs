pub mod health;
pub mod publish;
pub mod scheduled;
pub mod trigger;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{PublishError, SchedulerError, StoreError};
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        let response = Self::new("internal_error", message);
        tracing::error!(trace_id = %response.trace_id, message = %response.message, "Request failed");
        response
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ErrorResponse {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::InvalidSchedule(_) => Self::validation(err.to_string()),
            StoreError::NotFound(id) => Self::new("not_found", err.to_string())
                .with_details(serde_json::json!({ "job_id": id })),
            StoreError::Conflict { id, status } => Self::new("conflict", err.to_string())
                .with_details(serde_json::json!({ "job_id": id, "status": status })),
            StoreError::Storage(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<PublishError> for ErrorResponse {
    fn from(err: PublishError) -> Self {
        match &err {
            PublishError::ContentNotFound(id) => Self::new("not_found", err.to_string())
                .with_details(serde_json::json!({ "content_id": id })),
            PublishError::Validation(_) => Self::validation(err.to_string()),
            PublishError::AlreadyPublished {
                content_id,
                account_id,
            } => Self::new("conflict", err.to_string()).with_details(serde_json::json!({
                "content_id": content_id,
                "account_id": account_id,
            })),
            PublishError::Storage(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<SchedulerError> for ErrorResponse {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Store(e) => e.into(),
            SchedulerError::Publish(e) => e.into(),
        }
    }
}

/// Standard API success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::JobStatus;
    use uuid::Uuid;

    fn status_of(response: ErrorResponse) -> StatusCode {
        response.into_response().status()
    }

    #[test]
    fn test_store_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(StoreError::NotFound(id).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                StoreError::Conflict {
                    id,
                    status: JobStatus::Publishing
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StoreError::InvalidSchedule("past".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(StoreError::Storage("down".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_publish_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(PublishError::ContentNotFound(id).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                PublishError::AlreadyPublished {
                    content_id: id,
                    account_id: id
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SchedulerError::Publish(PublishError::Validation("x".to_string())).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_conflict_details_carry_status() {
        let id = Uuid::new_v4();
        let response: ErrorResponse = StoreError::Conflict {
            id,
            status: JobStatus::Published,
        }
        .into();
        assert_eq!(response.error, "conflict");
        assert_eq!(
            response.details,
            Some(serde_json::json!({ "job_id": id, "status": "published" }))
        );
    }
}
