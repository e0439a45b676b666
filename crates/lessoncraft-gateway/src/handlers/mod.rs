//! Request handlers, grouped by resource.

pub mod clients;
pub mod health;
pub mod instances;
pub mod lessons;
pub mod playgrounds;
pub mod sessions;
pub mod users;

use lessoncraft_core::{ClientId, LessonId, SessionId};

use crate::error::ApiError;

pub(crate) fn parse_session_id(s: &str) -> Result<SessionId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid session ID: {s}")))
}

pub(crate) fn parse_lesson_id(s: &str) -> Result<LessonId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid lesson ID: {s}")))
}

pub(crate) fn parse_client_id(s: &str) -> Result<ClientId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid client ID: {s}")))
}
