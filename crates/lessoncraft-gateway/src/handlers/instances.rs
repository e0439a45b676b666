//! Instance endpoints, including the terminal WebSocket.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{SinkExt, StreamExt};
use lessoncraft_core::LessonId;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_provision::{InstanceConfig, Terminal};
use lessoncraft_store::{LessonContext, LessonStore};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::parse_session_id;
use crate::state::AppState;

/// Body for `POST /api/sessions/{session_id}/instances`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateInstanceRequest {
    /// Explicit image.
    #[serde(default)]
    pub image_name: Option<String>,
    /// Explicit hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Backend type tag.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Lesson the instance backs.
    #[serde(default)]
    pub lesson_id: Option<String>,
    /// Zero-based lesson step.
    #[serde(default)]
    pub step_index: usize,
    /// Environment variables.
    #[serde(default)]
    pub envs: Vec<String>,
    /// Extra networks.
    #[serde(default)]
    pub networks: Vec<String>,
}

/// `POST /api/sessions/{session_id}/instances`
pub async fn create<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
    Json(body): Json<CreateInstanceRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;

    let lesson_ctx = match body.lesson_id {
        Some(id) => {
            let lesson_id: LessonId = id
                .parse()
                .map_err(|_| ApiError::InvalidRequest(format!("invalid lesson ID: {id}")))?;
            Some(LessonContext {
                lesson_id,
                step_index: body.step_index,
                completed: false,
            })
        }
        None => None,
    };

    let instance = state
        .fabric
        .instance_new(
            &session_id,
            InstanceConfig {
                image_name: body.image_name,
                hostname: body.hostname,
                kind: body.kind,
                envs: body.envs,
                networks: body.networks,
                lesson_ctx,
                ..InstanceConfig::default()
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(instance)))
}

/// `GET /api/sessions/{session_id}/instances`
pub async fn list<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let instances = state.fabric.instance_find_by_session(&session_id).await?;
    Ok(Json(instances))
}

/// `GET /api/sessions/{session_id}/instances/{name}`
pub async fn get<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let instance = state.fabric.instance_get(&session_id, &name).await?;
    Ok(Json(instance))
}

/// `DELETE /api/sessions/{session_id}/instances/{name}`
pub async fn delete<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.fabric.instance_delete(&session_id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body for `POST .../exec`.
#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    /// Command and arguments.
    pub command: Vec<String>,
}

/// `POST /api/sessions/{session_id}/instances/{name}/exec`
pub async fn exec<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
    Json(body): Json<ExecRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    if body.command.is_empty() {
        return Err(ApiError::InvalidRequest("command is required".to_string()));
    }

    let instance = state.fabric.instance_get(&session_id, &name).await?;
    let exit_code = state
        .fabric
        .instance_exec(&session_id, &name, &body.command)
        .await?;

    if let Some(ctx) = &instance.lesson_ctx {
        state.events.emit(
            session_id.to_string(),
            lessoncraft_events::EventPayload::LessonCommandExecute {
                lesson_id: ctx.lesson_id.to_string(),
                step_index: ctx.step_index,
                command: body.command.join(" "),
            },
        );
    }

    Ok(Json(json!({ "exit_code": exit_code })))
}

/// Body for `POST .../resize`.
#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    /// Terminal columns.
    pub cols: u32,
    /// Terminal rows.
    pub rows: u32,
}

/// `POST /api/sessions/{session_id}/instances/{name}/resize`
pub async fn resize<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
    Json(body): Json<ResizeRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state
        .fabric
        .instance_resize(&session_id, &name, body.rows, body.cols)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body for `POST .../uploads` (download into the instance).
#[derive(Debug, Deserialize)]
pub struct UploadFromUrlRequest {
    /// Source URL.
    pub url: String,
    /// File name to create; the URL's last path segment when unset.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Destination directory (absolute or CWD-relative).
    #[serde(default)]
    pub dest: String,
}

/// `POST /api/sessions/{session_id}/instances/{name}/uploads`
pub async fn upload_from_url<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
    Json(body): Json<UploadFromUrlRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let file_name = body.file_name.unwrap_or_else(|| {
        body.url
            .rsplit('/')
            .next()
            .unwrap_or("download")
            .to_string()
    });

    state
        .fabric
        .instance_upload_from_url(&session_id, &name, &file_name, &body.dest, &body.url)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query for `PUT .../uploads`.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// File name to create.
    pub file_name: String,
    /// Destination directory (absolute or CWD-relative).
    #[serde(default)]
    pub dest: String,
}

/// `PUT /api/sessions/{session_id}/instances/{name}/uploads`
pub async fn upload<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state
        .fabric
        .instance_upload(&session_id, &name, &query.file_name, &query.dest, body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Query for `GET .../file`.
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Path inside the instance.
    pub path: String,
}

/// `GET /api/sessions/{session_id}/instances/{name}/file`
pub async fn file<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
    Query(query): Query<FileQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let contents = state
        .fabric
        .instance_file(&session_id, &name, &query.path)
        .await?;
    Ok(contents)
}

/// `GET /api/sessions/{session_id}/instances/{name}/fs-tree`
pub async fn fs_tree<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let tree = state.fabric.instance_fs_tree(&session_id, &name).await?;
    Ok(Json(tree))
}

/// `GET /api/sessions/{session_id}/instances/{name}/ws`
///
/// Upgrades to a WebSocket bridged onto the instance's terminal stream.
pub async fn terminal<F, L>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((session_id, name)): Path<(String, String)>,
) -> Result<Response, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let stream = state.fabric.instance_terminal(&session_id, &name).await?;

    tracing::info!(session_id = %session_id, instance = %name, "terminal attached");
    Ok(ws.on_upgrade(move |socket| bridge_terminal(socket, stream)))
}

/// Pump bytes between the browser WebSocket and the instance terminal.
async fn bridge_terminal(socket: WebSocket, terminal: Terminal) {
    let (mut ws_write, mut ws_read) = socket.split();
    let Terminal { input, mut output } = terminal;

    let to_instance = async {
        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    if input.send(data.to_vec()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Text(text)) => {
                    if input.send(text.as_bytes().to_vec()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    let to_client = async {
        while let Some(data) = output.recv().await {
            if ws_write.send(Message::Binary(data.into())).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        () = to_instance => {}
        () = to_client => {}
    }

    tracing::debug!("terminal stream closed");
}
