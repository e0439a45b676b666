//! API error envelope.
//!
//! Every error response carries the stable envelope
//! `{error, code, message, details, request_id, timestamp}`. The `error`
//! field is the stable string code the UI switches on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use lessoncraft_orchestrator::OrchestratorError;
use lessoncraft_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// API-level errors, one variant per stable code.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed JSON or wrong request shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A lesson, step, or command failed validation.
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid token.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid token, insufficient role.
    #[error("forbidden")]
    Forbidden,

    /// The request conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Session admission rejected by the load cap.
    #[error("system overloaded")]
    SystemOverloaded,

    /// A dependency's circuit breaker is open; degraded responses may be
    /// available.
    #[error("service circuit open")]
    CircuitOpen,

    /// Too many requests.
    #[error("rate limited")]
    RateLimited,

    /// A storage operation failed.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Token issuing failed.
    #[error("token generation failed")]
    TokenGenerationError,

    /// Markdown could not be parsed.
    #[error("parsing failed: {0}")]
    ParsingError(String),

    /// Anything else.
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: &'static str,
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    request_id: String,
    timestamp: DateTime<Utc>,
}

impl ApiError {
    /// The HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::ValidationError(_) | Self::ParsingError(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::SystemOverloaded | Self::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::DatabaseError(_)
            | Self::TokenGenerationError
            | Self::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The stable string code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::ValidationError(_) => "ValidationError",
            Self::NotFound(_) => "NotFound",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::Conflict(_) => "Conflict",
            Self::SystemOverloaded => "SystemOverloaded",
            Self::CircuitOpen => "CircuitOpen",
            Self::RateLimited => "RateLimited",
            Self::DatabaseError(_) => "DatabaseError",
            Self::TokenGenerationError => "TokenGenerationError",
            Self::ParsingError(_) => "ParsingError",
            Self::InternalServerError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code = self.code(), %message, "request failed");
        } else {
            tracing::warn!(code = self.code(), %message, "request rejected");
        }

        let envelope = ErrorEnvelope {
            error: self.code(),
            code: status.as_u16(),
            message,
            details: None,
            request_id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
        };

        (status, Json(envelope)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record".to_string()),
            StoreError::CircuitOpen => Self::CircuitOpen,
            StoreError::AlreadyExists(what) => Self::Conflict(what),
            other => Self::DatabaseError(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        if err.is_circuit_open() {
            return Self::CircuitOpen;
        }
        match err {
            OrchestratorError::SystemOverloaded => Self::SystemOverloaded,
            OrchestratorError::PlaygroundNotFound(id) => Self::NotFound(format!("playground {id}")),
            OrchestratorError::SessionNotFound(id) => Self::NotFound(format!("session {id}")),
            OrchestratorError::InstanceNotFound(name) => {
                Self::NotFound(format!("instance {name}"))
            }
            OrchestratorError::ClientNotFound(id) => Self::NotFound(format!("client {id}")),
            OrchestratorError::UserNotFound(id) => Self::NotFound(format!("user {id}")),
            OrchestratorError::LoginRequestNotFound(id) => {
                Self::NotFound(format!("login request {id}"))
            }
            OrchestratorError::WindowsNotAllowed => {
                Self::Conflict("windows instances are not enabled".to_string())
            }
            OrchestratorError::NoStack => Self::Conflict("session has no stack".to_string()),
            OrchestratorError::Store(e) => Self::from(e),
            OrchestratorError::Provision(e) => Self::InternalServerError(e.to_string()),
        }
    }
}

impl From<lessoncraft_lesson::ValidationError> for ApiError {
    fn from(err: lessoncraft_lesson::ValidationError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<lessoncraft_auth::AuthError> for ApiError {
    fn from(err: lessoncraft_auth::AuthError) -> Self {
        match err {
            lessoncraft_auth::AuthError::TokenGeneration(_) => Self::TokenGenerationError,
            _ => Self::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::SystemOverloaded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::DatabaseError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn stable_codes() {
        assert_eq!(ApiError::CircuitOpen.code(), "CircuitOpen");
        assert_eq!(ApiError::NotFound("x".into()).code(), "NotFound");
        assert_eq!(ApiError::ParsingError("x".into()).code(), "ParsingError");
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err = ApiError::from(StoreError::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn circuit_open_maps_to_degradable_503() {
        let err = ApiError::from(StoreError::CircuitOpen);
        assert_eq!(err.code(), "CircuitOpen");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
