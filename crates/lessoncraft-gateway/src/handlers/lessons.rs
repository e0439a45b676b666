//! Lesson endpoints: CRUD, search, versions, tags/categories, progress,
//! and the editor's parse/validate helpers.
//!
//! Two validators exist and are named distinctly: `POST /api/lessons:validate`
//! checks lesson fields, `POST /api/lessons/{id}/steps/{step}:check-output`
//! checks a step's terminal output.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use lessoncraft_events::EventPayload;
use lessoncraft_lesson::{
    check_output, parse, to_markdown, validate_lesson, Lesson,
};
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::{LessonFilter, LessonStore, ListOptions, SearchOptions, SortOrder};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::parse_lesson_id;
use crate::state::AppState;

/// Query for paginated lesson listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Page number, 1-based.
    #[serde(default)]
    pub page: Option<u64>,
    /// Items per page.
    #[serde(default)]
    pub page_size: Option<u64>,
    /// Filter by category.
    #[serde(default)]
    pub category: Option<String>,
    /// Filter by tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// Filter by difficulty.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Sort field (`title`, `created_at`, `updated_at`, `difficulty`,
    /// `estimated_time`).
    #[serde(default)]
    pub sort: Option<String>,
    /// Sort descending instead of ascending.
    #[serde(default)]
    pub desc: bool,
}

impl ListQuery {
    fn into_options(self) -> ListOptions {
        let mut opts = ListOptions::default();
        if let Some(page) = self.page {
            opts.page = page;
        }
        if let Some(page_size) = self.page_size {
            opts.page_size = page_size;
        }
        opts.filter = LessonFilter {
            category: self.category,
            tag: self.tag,
            difficulty: self.difficulty,
        };
        if let Some(field) = self.sort {
            let order = if self.desc {
                SortOrder::Desc
            } else {
                SortOrder::Asc
            };
            opts.sort = vec![(field, order)];
        }
        opts.normalized()
    }
}

/// `GET /api/lessons`
pub async fn list<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let result = state.lessons.list_lessons(query.into_options()).await?;
    Ok(Json(result))
}

/// Query for lesson search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Term matched against title/description.
    #[serde(default)]
    pub query: String,
    /// Comma-separated categories (OR).
    #[serde(default)]
    pub categories: Option<String>,
    /// Comma-separated tags (OR).
    #[serde(default)]
    pub tags: Option<String>,
    /// Comma-separated required tags (AND).
    #[serde(default)]
    pub required_tags: Option<String>,
    /// Exact difficulty.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Minimum estimated minutes.
    #[serde(default)]
    pub min_estimated_time: Option<u32>,
    /// Maximum estimated minutes.
    #[serde(default)]
    pub max_estimated_time: Option<u32>,
    /// Also search step content.
    #[serde(default)]
    pub include_content: bool,
    /// Page number.
    #[serde(default)]
    pub page: Option<u64>,
    /// Items per page.
    #[serde(default)]
    pub page_size: Option<u64>,
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `GET /api/lessons/search`
pub async fn search<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let opts = SearchOptions {
        query: query.query,
        categories: split_csv(query.categories),
        tags: split_csv(query.tags),
        required_tags: split_csv(query.required_tags),
        difficulty: query.difficulty,
        min_estimated_time: query.min_estimated_time,
        max_estimated_time: query.max_estimated_time,
        include_content: query.include_content,
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(20),
        sort: Vec::new(),
    };

    let result = state.lessons.search_lessons(opts).await?;
    Ok(Json(result))
}

/// `GET /api/lessons/categories`
pub async fn categories<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    Ok(Json(state.lessons.list_categories().await?))
}

/// `GET /api/lessons/tags`
pub async fn tags<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    Ok(Json(state.lessons.list_tags().await?))
}

/// `GET /api/lessons/{id}`
pub async fn get<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let lesson = state.lessons.get_lesson(&id).await?;
    Ok(Json(lesson))
}

/// `GET /api/lessons/{id}/markdown`
pub async fn markdown<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let lesson = state.lessons.get_lesson(&id).await?;
    Ok(to_markdown(&lesson))
}

/// `POST /api/lessons` (educator)
pub async fn create<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Json(lesson): Json<Lesson>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    validate_lesson(&lesson, state.safety_policy)?;

    let created = state.lessons.create_lesson(lesson).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Query for lesson updates.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    /// Description of the change, recorded in the version history.
    #[serde(default)]
    pub change_summary: String,
}

/// `PUT /api/lessons/{id}` (educator)
pub async fn update<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<UpdateQuery>,
    Json(lesson): Json<Lesson>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    let id = parse_lesson_id(&id)?;
    validate_lesson(&lesson, state.safety_policy)?;

    let updated = state
        .lessons
        .update_lesson(&id, lesson, &query.change_summary)
        .await?;
    Ok(Json(updated))
}

/// `DELETE /api/lessons/{id}` (educator)
pub async fn delete<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    let id = parse_lesson_id(&id)?;
    state.lessons.delete_lesson(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/lessons/{id}/versions`
pub async fn versions<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let versions = state.lessons.list_lesson_versions(&id).await?;
    Ok(Json(versions))
}

/// `GET /api/lessons/{id}/versions/{version}`
pub async fn version<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path((id, version)): Path<(String, u32)>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let lesson = state.lessons.get_lesson_version(&id, version).await?;
    Ok(Json(lesson))
}

/// Body for tag mutations.
#[derive(Debug, Deserialize)]
pub struct TagRequest {
    /// The tag.
    pub tag: String,
}

/// `POST /api/lessons/{id}/tags` (educator)
pub async fn add_tag<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    let id = parse_lesson_id(&id)?;
    state.lessons.add_tag(&id, &body.tag).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/lessons/{id}/tags/{tag}` (educator)
pub async fn remove_tag<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Path((id, tag)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    let id = parse_lesson_id(&id)?;
    state.lessons.remove_tag(&id, &tag).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body for category updates.
#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    /// The category.
    pub category: String,
}

/// `PUT /api/lessons/{id}/category` (educator)
pub async fn set_category<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    let id = parse_lesson_id(&id)?;
    state.lessons.set_category(&id, &body.category).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/lessons/by-category/{category}`
pub async fn by_category<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path(category): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let result = state
        .lessons
        .list_lessons_by_category(&category, query.into_options())
        .await?;
    Ok(Json(result))
}

/// `GET /api/lessons/by-tag/{tag}`
pub async fn by_tag<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    Path(tag): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let result = state
        .lessons
        .list_lessons_by_tag(&tag, query.into_options())
        .await?;
    Ok(Json(result))
}

/// `POST /api/lessons/{id}/start`
pub async fn start<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let mut lesson = state.lessons.get_lesson(&id).await?;
    lesson.current_step = 0;

    let lesson = state
        .lessons
        .update_lesson(&id, lesson, "lesson started")
        .await?;

    state.events.emit(
        id.to_string(),
        EventPayload::LessonStart {
            lesson_id: id.to_string(),
        },
    );
    Ok(Json(lesson))
}

/// Body carrying observed step output.
#[derive(Debug, Default, Deserialize)]
pub struct OutputRequest {
    /// Terminal output captured for the step.
    #[serde(default)]
    pub output: String,
}

/// `POST /api/lessons/{id}/steps/{step}/complete`
///
/// Validates the output when the step expects one, then advances the
/// learner's current step.
pub async fn complete_step<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((id, step_index)): Path<(String, usize)>,
    Json(body): Json<OutputRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let mut lesson = state.lessons.get_lesson(&id).await?;

    let step = lesson
        .steps
        .get(step_index)
        .ok_or_else(|| {
            ApiError::InvalidRequest(format!(
                "step index {step_index} is out of range [0-{}]",
                lesson.steps.len().saturating_sub(1)
            ))
        })?
        .clone();

    if step.expected.is_some() {
        let checked = check_output(&step, &body.output);
        state.events.emit(
            id.to_string(),
            EventPayload::LessonValidate {
                lesson_id: id.to_string(),
                step_index,
                valid: checked.valid,
            },
        );
        if !checked.valid {
            return Ok((StatusCode::BAD_REQUEST, Json(serde_json::to_value(checked).unwrap_or_default())).into_response());
        }
    }

    if step_index == lesson.current_step {
        lesson.current_step += 1;
        lesson = state
            .lessons
            .update_lesson(&id, lesson, "step completed")
            .await?;
    }

    state.events.emit(
        id.to_string(),
        EventPayload::LessonStepComplete {
            lesson_id: id.to_string(),
            step_index,
        },
    );

    Ok(Json(json!({
        "valid": true,
        "message": "Step completed successfully",
        "current_step": lesson.current_step,
    }))
    .into_response())
}

/// `POST /api/lessons/{id}/steps/{step}:check-output`
///
/// Checks observed output against the step's expectation without touching
/// lesson progress.
pub async fn check_step_output<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    _user: AuthUser,
    Path((id, step_index)): Path<(String, usize)>,
    Json(body): Json<OutputRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    let id = parse_lesson_id(&id)?;
    let lesson = state.lessons.get_lesson(&id).await?;

    let step = lesson.steps.get(step_index).ok_or_else(|| {
        ApiError::InvalidRequest(format!(
            "step index {step_index} is out of range [0-{}]",
            lesson.steps.len().saturating_sub(1)
        ))
    })?;

    let checked = check_output(step, &body.output);
    state.events.emit(
        id.to_string(),
        EventPayload::LessonValidate {
            lesson_id: id.to_string(),
            step_index,
            valid: checked.valid,
        },
    );

    let status = if checked.valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(checked)))
}

/// Body for `POST /api/lessons:parse`.
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    /// Markdown source.
    pub markdown: String,
}

/// `POST /api/lessons:parse` (educator)
///
/// Converts markdown into a lesson document for editor preview.
pub async fn parse_markdown<F, L>(
    State(_state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Json(body): Json<ParseRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    if body.markdown.is_empty() {
        return Err(ApiError::InvalidRequest(
            "markdown content is required".to_string(),
        ));
    }

    let lesson = parse(&body.markdown);
    Ok(Json(lesson))
}

/// `POST /api/lessons:validate` (educator)
///
/// Validates lesson fields without storing anything.
pub async fn validate<F, L>(
    State(state): State<Arc<AppState<F, L>>>,
    user: AuthUser,
    Json(lesson): Json<Lesson>,
) -> Result<impl IntoResponse, ApiError>
where
    F: SessionFabric + 'static,
    L: LessonStore + 'static,
{
    user.require_author()?;
    validate_lesson(&lesson, state.safety_policy)?;
    Ok(Json(json!({
        "valid": true,
        "message": "Lesson content is valid",
    })))
}
