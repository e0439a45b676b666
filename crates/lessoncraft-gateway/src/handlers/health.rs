//! Health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::LessonStore;
use serde::Serialize;

use crate::state::AppState;

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process is serving.
    pub status: &'static str,
    /// Currently attached clients.
    pub clients: usize,
}

/// `GET /health`
pub async fn health<F, L>(State(state): State<Arc<AppState<F, L>>>) -> Json<HealthResponse>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    Json(HealthResponse {
        status: "ok",
        clients: state.fabric.client_count().await,
    })
}
