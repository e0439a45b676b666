//! Playground administration endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lessoncraft_core::PlaygroundId;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::{LessonStore, Playground};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/playgrounds` (admin)
pub async fn create<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Json(playground): Json<Playground>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_admin()?;
    let playground = state.fabric.playground_new(playground).await?;
    Ok((StatusCode::CREATED, Json(playground)))
}

/// `GET /api/playgrounds` (admin)
pub async fn list<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_admin()?;
    let playgrounds = state.fabric.playground_list().await?;
    Ok(Json(playgrounds))
}

/// `GET /api/playgrounds/{id}`
pub async fn get<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let playground = state.fabric.playground_get(&PlaygroundId::new(id)).await?;
    Ok(Json(playground))
}

/// Query for the by-domain lookup.
#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    /// Domain to look up.
    pub domain: String,
}

/// `GET /api/playgrounds:by-domain?domain=...`
pub async fn find_by_domain<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Query(query): Query<DomainQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let playground = state.fabric.playground_find_by_domain(&query.domain).await?;
    Ok(Json(playground))
}
