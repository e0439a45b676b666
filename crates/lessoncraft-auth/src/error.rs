//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during token handling.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The token signature does not verify.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token is malformed or otherwise invalid.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A required claim is missing or unparseable.
    #[error("missing or invalid claim: {0}")]
    MissingClaim(String),

    /// Token generation failed.
    #[error("token generation failed: {0}")]
    TokenGeneration(String),
}
