use axum::extract::State;
use common::models::ProcessSummary;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

/// Process every scheduled job due now; called by an external periodic trigger
#[tracing::instrument(skip(state))]
pub async fn trigger_due_jobs(
    State(state): State<AppState>,
) -> Result<SuccessResponse<ProcessSummary>, ErrorResponse> {
    let summary = state
        .coordinator
        .process_due_jobs(state.coordinator.now())
        .await?;
    Ok(SuccessResponse::new(summary))
}
