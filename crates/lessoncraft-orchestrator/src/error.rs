//! Orchestrator error types.

use lessoncraft_core::{ClientId, PlaygroundId, SessionId, UserId};
use thiserror::Error;

/// A result type using `OrchestratorError`.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors from orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Session admission rejected by the load cap.
    #[error("system is overloaded, session admission rejected")]
    SystemOverloaded,

    /// The playground does not exist.
    #[error("playground not found: {0}")]
    PlaygroundNotFound(PlaygroundId),

    /// The session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The instance does not exist in the session.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// The client is not attached.
    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// The user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// The login request is unknown or already consumed.
    #[error("login request not found: {0}")]
    LoginRequestNotFound(String),

    /// The playground does not allow Windows instances.
    #[error("windows instances are not enabled for this playground")]
    WindowsNotAllowed,

    /// The session has no stack to deploy.
    #[error("session has no stack")]
    NoStack,

    /// A provisioning operation failed.
    #[error(transparent)]
    Provision(#[from] lessoncraft_provision::ProvisionError),

    /// A storage operation failed.
    #[error(transparent)]
    Store(#[from] lessoncraft_store::StoreError),
}

impl OrchestratorError {
    /// Whether the error means a dependency's circuit breaker is open, so
    /// the caller may degrade instead of failing hard.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            Self::Provision(lessoncraft_provision::ProvisionError::CircuitOpen)
                | Self::Store(lessoncraft_store::StoreError::CircuitOpen)
        )
    }
}
