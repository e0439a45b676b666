//! Provisioner error types.

use lessoncraft_resilience::Retryable;
use thiserror::Error;

/// A result type using `ProvisionError`.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors from provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The referenced container does not exist.
    #[error("no such container: {0}")]
    NoSuchContainer(String),

    /// The container engine returned an API error.
    #[error("engine error ({status}): {message}")]
    Api {
        /// HTTP status from the engine.
        status: u16,
        /// Engine-reported message.
        message: String,
    },

    /// The engine could not be reached.
    #[error("engine transport error: {0}")]
    Transport(String),

    /// The engine circuit breaker is open.
    #[error("engine circuit breaker is open")]
    CircuitOpen,

    /// A response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A storage lookup failed.
    #[error("storage error: {0}")]
    Store(#[from] lessoncraft_store::StoreError),

    /// A remote download failed.
    #[error("could not download {url}: {reason}")]
    Download {
        /// The URL that failed.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// A command inside the instance exited non-zero.
    #[error("command exited with code {code}")]
    CommandFailed {
        /// The exit code.
        code: i64,
    },

    /// The Windows pool has no free machines.
    #[error("windows instance pool exhausted")]
    PoolExhausted,

    /// The backend does not support this operation.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// No provisioner is registered for the requested type.
    #[error("unknown instance type: {0}")]
    UnknownType(String),
}

impl Retryable for ProvisionError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Store(e) => e.is_retryable(),
            Self::NoSuchContainer(_)
            | Self::CircuitOpen
            | Self::Protocol(_)
            | Self::Download { .. }
            | Self::CommandFailed { .. }
            | Self::PoolExhausted
            | Self::Unsupported(_)
            | Self::UnknownType(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_classification() {
        assert!(ProvisionError::Transport("timeout".into()).is_retryable());
        assert!(ProvisionError::Api {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!ProvisionError::Api {
            status: 404,
            message: "missing".into()
        }
        .is_retryable());
        assert!(!ProvisionError::NoSuchContainer("x".into()).is_retryable());
        assert!(!ProvisionError::PoolExhausted.is_retryable());
    }
}
