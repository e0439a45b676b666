//! Scheduler error types.

use thiserror::Error;

/// A result type using `SchedulerError`.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors from background probes.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A probe exceeded its deadline.
    #[error("probe timed out: {0}")]
    Timeout(&'static str),

    /// A storage operation failed.
    #[error(transparent)]
    Store(#[from] lessoncraft_store::StoreError),

    /// An engine operation failed.
    #[error(transparent)]
    Provision(#[from] lessoncraft_provision::ProvisionError),

    /// An agent HTTP call failed.
    #[error("agent request failed: {0}")]
    Agent(String),

    /// A Kubernetes API call failed.
    #[error("kubernetes error: {0}")]
    Kubernetes(String),

    /// A response could not be interpreted.
    #[error("malformed probe response: {0}")]
    Malformed(String),
}

impl From<kube::Error> for SchedulerError {
    fn from(err: kube::Error) -> Self {
        Self::Kubernetes(err.to_string())
    }
}
