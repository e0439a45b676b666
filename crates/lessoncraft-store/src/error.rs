//! Error types for the storage layer.

use lessoncraft_resilience::Retryable;
use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found")]
    NotFound,

    /// A record with the same key already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The database circuit breaker is open.
    #[error("database circuit breaker is open")]
    CircuitOpen,
}

/// Legacy transient-error markers carried in driver messages. Matching them
/// keeps the retry classifier aligned with the document-database drivers
/// this contract originated from.
const TRANSIENT_MARKERS: &[&str] = &[
    "client disconnected",
    "no documents",
    "nil document",
    "nil value",
    "empty slice",
    "connection reset",
    "broken pipe",
];

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Database(msg) => {
                let msg = msg.to_ascii_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| msg.contains(m))
            }
            Self::NotFound
            | Self::AlreadyExists(_)
            | Self::Serialization(_)
            | Self::CircuitOpen => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable() {
        assert!(StoreError::Timeout("deadline exceeded".into()).is_retryable());
    }

    #[test]
    fn transient_driver_messages_are_retryable() {
        assert!(StoreError::Database("client disconnected".into()).is_retryable());
        assert!(StoreError::Database("mongo: no documents in result".into()).is_retryable());
        assert!(StoreError::Database("read: connection reset by peer".into()).is_retryable());
    }

    #[test]
    fn terminal_errors_are_not_retryable() {
        assert!(!StoreError::NotFound.is_retryable());
        assert!(!StoreError::Serialization("bad cbor".into()).is_retryable());
        assert!(!StoreError::Database("constraint violation".into()).is_retryable());
        assert!(!StoreError::CircuitOpen.is_retryable());
    }
}
