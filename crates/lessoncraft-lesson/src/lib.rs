//! Lesson parsing, validation, and output matching.
//!
//! A lesson is authored as markdown: an H1 title, a description paragraph,
//! and fenced code blocks tagged `docker`, `expect`, or `question` that the
//! parser folds into ordered steps. This crate owns:
//!
//! - the lesson document types ([`Lesson`], [`LessonStep`],
//!   [`ContainerConfig`], [`VersionInfo`])
//! - the markdown [`parser`] and the canonical serializer
//! - the [`validate`] rules applied on create/update
//! - the command [`safety`] filter
//! - the step-output [`matcher`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod matcher;
pub mod parser;
pub mod safety;
pub mod types;
pub mod validate;

pub use matcher::{check_output, OutputCheck};
pub use parser::{parse, to_markdown};
pub use safety::{validate_command, CommandViolation, SafetyPolicy};
pub use types::{ContainerConfig, Lesson, LessonStep, ResourceLimits, VersionInfo};
pub use validate::{validate_lesson, ValidationError};
