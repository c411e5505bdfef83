use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{trigger_auth_middleware, user_identity_middleware};
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    // Caller identity comes from the gateway's X-User-Id header
    let user_routes = Router::new()
        .route("/api/publish", post(handlers::publish::publish_now))
        .route(
            "/api/publish/retry",
            post(handlers::publish::retry_publication),
        )
        .route(
            "/api/scheduled",
            post(handlers::scheduled::create_scheduled).get(handlers::scheduled::list_scheduled),
        )
        .route("/api/scheduled/:id", get(handlers::scheduled::get_scheduled))
        .route(
            "/api/scheduled/:id/cancel",
            post(handlers::scheduled::cancel_scheduled),
        )
        .route(
            "/api/scheduled/:id/reschedule",
            put(handlers::scheduled::reschedule_scheduled),
        )
        .route(
            "/api/scheduled/:id/retry",
            post(handlers::scheduled::retry_scheduled),
        )
        .layer(axum::middleware::from_fn(user_identity_middleware));

    let internal_routes = Router::new()
        .route("/internal/trigger", post(handlers::trigger::trigger_due_jobs))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            trigger_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(internal_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
