//! Client attachment endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::LessonStore;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::{parse_client_id, parse_session_id};
use crate::state::AppState;

/// `POST /api/sessions/{session_id}/clients`
pub async fn create<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let client = state.fabric.client_new(&session_id).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// Body for `POST /api/clients/{client_id}/resize`.
#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    /// Terminal columns.
    pub cols: u32,
    /// Terminal rows.
    pub rows: u32,
}

/// `POST /api/clients/{client_id}/resize`
pub async fn resize<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(client_id): Path<String>,
    Json(body): Json<ResizeRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let client_id = parse_client_id(&client_id)?;
    state
        .fabric
        .client_resize_viewport(&client_id, body.cols, body.rows)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/clients/{client_id}`
pub async fn close<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let client_id = parse_client_id(&client_id)?;
    state.fabric.client_close(&client_id).await;
    Ok(StatusCode::NO_CONTENT)
}
