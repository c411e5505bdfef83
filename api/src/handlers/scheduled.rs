use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::models::{JobStatus, PublishResult, ScheduledJob};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::middleware::UserId;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

/// Request to schedule a publication
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub content_id: Uuid,
    pub account_ids: Vec<Uuid>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

/// Query parameters for listing scheduled jobs
#[derive(Debug, Deserialize)]
pub struct ListScheduledQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

/// Job plus the per-account results of a user retry
#[derive(Debug, Serialize)]
pub struct RetriedJob {
    #[serde(flatten)]
    pub job: ScheduledJob,
    pub results: Vec<PublishResult>,
}

#[tracing::instrument(skip(state, req), fields(user_id = %user_id.0, content_id = %req.content_id))]
pub async fn create_scheduled(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(req): Json<ScheduleRequest>,
) -> Result<SuccessResponse<ScheduledJob>, ErrorResponse> {
    let job = state
        .coordinator
        .schedule(user_id.0, req.content_id, req.account_ids, req.scheduled_at)
        .await?;
    Ok(SuccessResponse::new(job))
}

/// List the caller's jobs, newest scheduled time first
#[tracing::instrument(skip(state), fields(user_id = %user_id.0))]
pub async fn list_scheduled(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<ListScheduledQuery>,
) -> Result<SuccessResponse<Vec<ScheduledJob>>, ErrorResponse> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ErrorResponse::validation)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let jobs = state.coordinator.list_jobs(user_id.0, status, limit).await?;
    Ok(SuccessResponse::new(jobs))
}

#[tracing::instrument(skip(state), fields(user_id = %user_id.0))]
pub async fn get_scheduled(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<ScheduledJob>, ErrorResponse> {
    let job = state.coordinator.get_job(user_id.0, id).await?;
    Ok(SuccessResponse::new(job))
}

#[tracing::instrument(skip(state), fields(user_id = %user_id.0))]
pub async fn cancel_scheduled(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<ScheduledJob>, ErrorResponse> {
    let job = state.coordinator.cancel(user_id.0, id).await?;
    Ok(SuccessResponse::new(job))
}

#[tracing::instrument(skip(state, req), fields(user_id = %user_id.0))]
pub async fn reschedule_scheduled(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<SuccessResponse<ScheduledJob>, ErrorResponse> {
    let job = state
        .coordinator
        .reschedule(user_id.0, id, req.scheduled_at)
        .await?;
    Ok(SuccessResponse::new(job))
}

/// Retry a failed job for the accounts not yet published
#[tracing::instrument(skip(state), fields(user_id = %user_id.0))]
pub async fn retry_scheduled(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<SuccessResponse<RetriedJob>, ErrorResponse> {
    let (job, results) = state.coordinator.retry_job(user_id.0, id).await?;
    Ok(SuccessResponse::new(RetriedJob { job, results }))
}
