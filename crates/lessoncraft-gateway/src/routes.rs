//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::LessonStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{clients, health, instances, lessons, playgrounds, sessions, users};
use crate::middleware::{panic_response, rate_limit, request_id, RateLimiter};
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the gateway router with all routes and middleware.
pub fn create_router<F, L>(state: AppState<F, L>) -> Router
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let limiter = Arc::new(RateLimiter::new(state.config.rate_limit_rps));
    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health::<F, L>))
        // Sessions
        .route("/api/sessions", post(sessions::create::<F, L>))
        .route(
            "/api/sessions/{session_id}",
            get(sessions::get::<F, L>).delete(sessions::close::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/setup",
            post(sessions::setup::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}:deploy-stack",
            post(sessions::deploy_stack::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/viewport",
            get(sessions::viewport::<F, L>),
        )
        // Instances
        .route(
            "/api/sessions/{session_id}/instances",
            post(instances::create::<F, L>).get(instances::list::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}",
            get(instances::get::<F, L>).delete(instances::delete::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}/exec",
            post(instances::exec::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}/resize",
            post(instances::resize::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}/uploads",
            post(instances::upload_from_url::<F, L>).put(instances::upload::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}/file",
            get(instances::file::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}/fs-tree",
            get(instances::fs_tree::<F, L>),
        )
        .route(
            "/api/sessions/{session_id}/instances/{name}/ws",
            get(instances::terminal::<F, L>),
        )
        // Clients
        .route(
            "/api/sessions/{session_id}/clients",
            post(clients::create::<F, L>),
        )
        .route(
            "/api/clients/{client_id}/resize",
            post(clients::resize::<F, L>),
        )
        .route("/api/clients/{client_id}", delete(clients::close::<F, L>))
        // Users and login
        .route("/api/login-requests", post(users::new_login_request::<F, L>))
        .route(
            "/api/login-requests/{request_id}/complete",
            post(users::complete_login::<F, L>),
        )
        .route("/api/users/{user_id}", get(users::get::<F, L>))
        // Playgrounds
        .route(
            "/api/playgrounds",
            post(playgrounds::create::<F, L>).get(playgrounds::list::<F, L>),
        )
        .route("/api/playgrounds/{id}", get(playgrounds::get::<F, L>))
        .route(
            "/api/playgrounds:by-domain",
            get(playgrounds::find_by_domain::<F, L>),
        )
        // Lessons
        .route(
            "/api/lessons",
            get(lessons::list::<F, L>).post(lessons::create::<F, L>),
        )
        .route("/api/lessons/search", get(lessons::search::<F, L>))
        .route("/api/lessons/categories", get(lessons::categories::<F, L>))
        .route("/api/lessons/tags", get(lessons::tags::<F, L>))
        .route(
            "/api/lessons/by-category/{category}",
            get(lessons::by_category::<F, L>),
        )
        .route("/api/lessons/by-tag/{tag}", get(lessons::by_tag::<F, L>))
        .route(
            "/api/lessons/{id}",
            get(lessons::get::<F, L>)
                .put(lessons::update::<F, L>)
                .delete(lessons::delete::<F, L>),
        )
        .route("/api/lessons/{id}/markdown", get(lessons::markdown::<F, L>))
        .route("/api/lessons/{id}/versions", get(lessons::versions::<F, L>))
        .route(
            "/api/lessons/{id}/versions/{version}",
            get(lessons::version::<F, L>),
        )
        .route("/api/lessons/{id}/tags", post(lessons::add_tag::<F, L>))
        .route(
            "/api/lessons/{id}/tags/{tag}",
            delete(lessons::remove_tag::<F, L>),
        )
        .route(
            "/api/lessons/{id}/category",
            put(lessons::set_category::<F, L>),
        )
        .route("/api/lessons/{id}/start", post(lessons::start::<F, L>))
        .route(
            "/api/lessons/{id}/steps/{step}/complete",
            post(lessons::complete_step::<F, L>),
        )
        .route(
            "/api/lessons/{id}/steps/{step}:check-output",
            post(lessons::check_step_output::<F, L>),
        )
        .route("/api/lessons:parse", post(lessons::parse_markdown::<F, L>))
        .route("/api/lessons:validate", post(lessons::validate::<F, L>))
        // Middleware; panics are caught closest to the handlers.
        .layer(CatchPanicLayer::custom(|err| panic_response(err)))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
