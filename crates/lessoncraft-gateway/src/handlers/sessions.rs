//! Session endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lessoncraft_core::PlaygroundId;
use lessoncraft_orchestrator::{SessionConfig, SessionFabric, SessionSetupConf};
use lessoncraft_store::LessonStore;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::parse_session_id;
use crate::state::AppState;

/// Body for `POST /api/sessions`.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Playground to create the session in; the serving playground when
    /// unset.
    #[serde(default)]
    pub playground_id: Option<String>,
    /// Session duration override in minutes.
    #[serde(default)]
    pub duration_minutes: Option<u64>,
    /// Compose stack to deploy.
    #[serde(default)]
    pub stack: Option<String>,
    /// Name for the deployed stack.
    #[serde(default)]
    pub stack_name: Option<String>,
    /// Image for the stack builder instance.
    #[serde(default)]
    pub image_name: Option<String>,
}

/// `POST /api/sessions`
pub async fn create<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Json(body): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let playground_id = body
        .playground_id
        .map_or_else(|| PlaygroundId::new("default"), PlaygroundId::new);

    let session = state
        .fabric
        .session_new(SessionConfig {
            playground_id,
            host: state.config.playground_domain.clone(),
            duration: body.duration_minutes.map(|m| Duration::from_secs(m * 60)),
            stack: body.stack,
            stack_name: body.stack_name,
            image_name: body.image_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/sessions/{session_id}`
pub async fn get<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let session = state.fabric.session_get(&session_id).await?;
    Ok(Json(session))
}

/// `DELETE /api/sessions/{session_id}`
pub async fn close<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.fabric.session_close(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/sessions/{session_id}/setup`
pub async fn setup<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
    Json(conf): Json<SessionSetupConf>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.fabric.session_setup(&session_id, conf).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/sessions/{session_id}:deploy-stack`
pub async fn deploy_stack<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.fabric.session_deploy_stack(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/sessions/{session_id}/viewport`
pub async fn viewport<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let viewport = state.fabric.session_smallest_viewport(&session_id).await;
    Ok(Json(viewport))
}
