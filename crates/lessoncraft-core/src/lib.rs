//! Core types and utilities for LessonCraft.
//!
//! This crate provides the foundational types used throughout the LessonCraft
//! platform:
//!
//! - **Identifiers**: Strongly-typed IDs for sessions, lessons, clients,
//!   playgrounds, and users
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use lessoncraft_core::{SessionId, PlaygroundId};
//!
//! // Generate a session ID
//! let session_id = SessionId::generate();
//!
//! // The short prefix is what container names and proxy hosts embed
//! assert_eq!(session_id.short().len(), 8);
//!
//! // Playground IDs are plain domain-scoped strings
//! let playground_id = PlaygroundId::new("default");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{ClientId, IdError, LessonId, PlaygroundId, SessionId, UserId};
