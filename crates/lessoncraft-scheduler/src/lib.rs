//! Background probes over live sessions and instances.
//!
//! A single supervisor loop ticks on a fixed interval, retires sessions
//! past their TTL, and fans out the registered [`Task`]s over every live
//! instance through a bounded pool. Each probe carries its own timeout;
//! failures publish degraded values on the event bus instead of
//! suppressing the row, so downstream consumers always see every
//! instance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod supervisor;
pub mod tasks;

pub use error::{Result, SchedulerError};
pub use supervisor::{Supervisor, SupervisorConfig};

use async_trait::async_trait;
use lessoncraft_store::Instance;

/// A named background probe run per instance on every sweep.
///
/// Implementations hold their own collaborators (engine factory, storage,
/// event bus) and must tolerate concurrent runs over different instances.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable task name for logs.
    fn name(&self) -> &'static str;

    /// Probe one instance.
    ///
    /// # Errors
    ///
    /// Returns an error when the probe fails; the supervisor logs it and
    /// moves on. Tasks that publish rows must publish a degraded row
    /// before failing.
    async fn run(&self, instance: &Instance) -> Result<()>;
}
