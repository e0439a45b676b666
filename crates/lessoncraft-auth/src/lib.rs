//! Authentication primitives for LessonCraft.
//!
//! Tokens are HS256 JWTs carrying the user ID and a role claim. The
//! symmetric secret comes from configuration, so the gateway both issues
//! tokens (after the OAuth callback) and validates them on every request.
//!
//! # Example
//!
//! ```
//! use lessoncraft_auth::{AuthConfig, Role, TokenService};
//! use lessoncraft_core::UserId;
//!
//! let service = TokenService::new(AuthConfig::new("secret"));
//! let token = service.issue(&UserId::new("github-1234"), Role::Learner).unwrap();
//! let claims = service.validate(&token).unwrap();
//! assert_eq!(claims.role, Role::Learner);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod jwt;

pub use error::{AuthError, Result};
pub use jwt::{AuthConfig, Role, TokenService, ValidatedClaims};
