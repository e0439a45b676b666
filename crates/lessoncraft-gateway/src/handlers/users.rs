//! Login flow and user endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lessoncraft_auth::Role;
use lessoncraft_core::UserId;
use lessoncraft_orchestrator::{SessionFabric, UserProfile};
use lessoncraft_store::{LessonStore, User};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Body for `POST /api/login-requests`.
#[derive(Debug, Deserialize)]
pub struct NewLoginRequest {
    /// OAuth provider name.
    pub provider: String,
}

/// `POST /api/login-requests`
///
/// Starts a login: creates the one-shot request nonce the OAuth callback
/// must present.
pub async fn new_login_request<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Json(body): Json<NewLoginRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let request = state.fabric.user_new_login_request(&body.provider).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Body for `POST /api/login-requests/{id}/complete`.
#[derive(Debug, Deserialize)]
pub struct CompleteLoginRequest {
    /// Profile returned by the provider.
    #[serde(flatten)]
    pub profile: UserProfile,
    /// Whether to issue an educator token.
    #[serde(default)]
    pub educator: bool,
}

/// Response for a completed login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// The stored user record.
    pub user: User,
    /// Bearer token for subsequent requests.
    pub token: String,
}

/// `POST /api/login-requests/{id}/complete`
///
/// Consumes the login request (exactly once), upserts the user, and issues
/// a token.
pub async fn complete_login<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path(request_id): Path<String>,
    Json(body): Json<CompleteLoginRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let user = state.fabric.user_login(&request_id, body.profile).await?;

    let role = if body.educator {
        Role::Educator
    } else {
        Role::Learner
    };
    let token = state.tokens.issue(&user.id, role)?;

    Ok(Json(LoginResponse { user, token }))
}

/// `GET /api/users/{user_id}`
pub async fn get<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let user = state.fabric.user_get(&UserId::new(user_id)).await?;
    Ok(Json(user))
}
