//! Instance provisioning backends for LessonCraft sandboxes.
//!
//! The provisioner turns a session plus an [`InstanceConfig`] into a
//! running instance, and tears it down again. Two backends ship:
//!
//! - [`DindProvisioner`]: container-in-container sandboxes driven through a
//!   [`ContainerEngine`] (the Docker Engine HTTP API on the session host)
//! - [`WindowsProvisioner`]: leases from a pre-provisioned Windows pool
//!
//! [`ProvisionerFactory`] selects the backend by instance type tag. Every
//! outbound engine call is fallible and rides the resilience primitives;
//! partial failures (container created, IP unobtainable) compensate with a
//! best-effort delete before surfacing the error.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dind;
pub mod engine;
pub mod error;
pub mod factory;
pub mod http_engine;
pub mod proxy;
pub mod session_cache;
pub mod tar;
pub mod windows;

pub use config::InstanceConfig;
pub use dind::DindProvisioner;
pub use engine::{
    ContainerEngine, CreateContainerOpts, EngineStats, Terminal,
};
pub use error::{ProvisionError, Result};
pub use factory::{EngineFactory, ProvisionerFactory, SingleEngineFactory};
pub use http_engine::HttpEngine;
pub use proxy::{decode_host, encode_host, HostOpts};
pub use windows::WindowsProvisioner;

use async_trait::async_trait;
use bytes::Bytes;
use lessoncraft_store::{Instance, Session};

/// Lifecycle and I/O operations over instances, implemented per backend.
#[async_trait]
pub trait InstanceProvisioner: Send + Sync {
    /// Create a new instance in the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot materialize the instance; a
    /// half-created container is deleted best-effort first.
    async fn instance_new(&self, session: &Session, config: InstanceConfig) -> Result<Instance>;

    /// Destroy an instance. Idempotent: an already-gone container is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than "no such container".
    async fn instance_delete(&self, session: &Session, instance: &Instance) -> Result<()>;

    /// Execute a command, returning its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec cannot be started.
    async fn instance_exec(&self, instance: &Instance, cmd: &[String]) -> Result<i64>;

    /// Attach a bidirectional terminal stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the attach fails.
    async fn instance_terminal(&self, instance: &Instance) -> Result<Terminal>;

    /// Resize the instance terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    async fn instance_resize(&self, instance: &Instance, rows: u32, cols: u32) -> Result<()>;

    /// Stream a file from a URL into the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or the copy fails.
    async fn instance_upload_from_url(
        &self,
        instance: &Instance,
        file_name: &str,
        dest: &str,
        url: &str,
    ) -> Result<()>;

    /// Upload in-memory data into the instance. `dest` may be absolute or
    /// relative to the instance's current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    async fn instance_upload(
        &self,
        instance: &Instance,
        file_name: &str,
        dest: &str,
        data: Bytes,
    ) -> Result<()>;

    /// Read a file out of the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    async fn instance_file(&self, instance: &Instance, path: &str) -> Result<Vec<u8>>;

    /// Render a JSON tree of the instance's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    async fn instance_fs_tree(&self, instance: &Instance) -> Result<serde_json::Value>;
}
