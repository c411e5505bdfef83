use axum::{
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::trigger::authorize_trigger;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Shared-secret check for the internal trigger; disabled when no secret is configured
#[tracing::instrument(skip(state, req, next))]
pub async fn trigger_auth_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(secret) = state.config.scheduler.trigger_secret.as_deref() else {
        return ErrorResponse::new("not_found", "trigger endpoint is disabled").into_response();
    };

    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match authorize_trigger(authorization, secret) {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!("Rejected trigger request with invalid secret");
            ErrorResponse::unauthorized("invalid trigger secret").into_response()
        }
        Err(e) => ErrorResponse::new("internal_error", e.to_string()).into_response(),
    }
}
