use axum::{extract::State, Extension, Json};
use common::models::PublishResult;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::middleware::UserId;
use crate::state::AppState;

/// Request to publish content immediately
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub content_id: Uuid,
    pub account_ids: Vec<Uuid>,
}

/// Request to retry one account of a publication
#[derive(Debug, Deserialize)]
pub struct RetryPublishRequest {
    pub content_id: Uuid,
    pub account_id: Uuid,
}

/// Publish content to every listed account now
///
/// Per-account failures are part of the 200 response; only whole-request
/// failures are errors.
#[tracing::instrument(skip(state, req), fields(user_id = %user_id.0, content_id = %req.content_id))]
pub async fn publish_now(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<PublishRequest>,
) -> Result<SuccessResponse<Vec<PublishResult>>, ErrorResponse> {
    let results = state
        .coordinator
        .publisher()
        .publish_now(user_id.0, req.content_id, &req.account_ids)
        .await?;

    Ok(SuccessResponse::new(results))
}

/// Retry one failed account; a failed job whose accounts are now all
/// published is closed as published
#[tracing::instrument(skip(state, req), fields(user_id = %user_id.0, content_id = %req.content_id))]
pub async fn retry_publication(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<RetryPublishRequest>,
) -> Result<SuccessResponse<PublishResult>, ErrorResponse> {
    let result = state
        .coordinator
        .retry_publication(user_id.0, req.content_id, req.account_id)
        .await?;

    Ok(SuccessResponse::new(result))
}
