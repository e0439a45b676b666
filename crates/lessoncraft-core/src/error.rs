//! Common error types for LessonCraft.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::{LessonId, PlaygroundId, SessionId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the LessonCraft system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A session with the specified ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// An instance with the specified name was not found.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// A lesson with the specified ID was not found.
    #[error("lesson not found: {0}")]
    LessonNotFound(LessonId),

    /// A playground with the specified ID was not found.
    #[error("playground not found: {0}")]
    PlaygroundNotFound(PlaygroundId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
