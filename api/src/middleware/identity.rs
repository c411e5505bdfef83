use axum::{
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::handlers::ErrorResponse;

/// Header set by the upstream auth gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Resolve the caller from `X-User-Id`; requests without a valid id are rejected
#[tracing::instrument(skip(req, next))]
pub async fn user_identity_middleware(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok());

    match user_id {
        Some(user_id) => {
            req.extensions_mut().insert(UserId(user_id));
            next.run(req).await
        }
        None => {
            tracing::warn!("Missing or invalid X-User-Id header");
            ErrorResponse::unauthorized("X-User-Id header with a user UUID is required")
                .into_response()
        }
    }
}
