//! The container engine seam.
//!
//! [`ContainerEngine`] models the container control plane the provisioner
//! consumes: create/inspect/delete, exec, attach, copy in/out, stats, and
//! terminal resize. The production implementation speaks the Docker Engine
//! HTTP API ([`crate::HttpEngine`]); tests use [`mock::MockEngine`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Options for creating a container.
#[derive(Debug, Clone, Default)]
pub struct CreateContainerOpts {
    /// Image to run.
    pub image: String,
    /// Container name.
    pub name: String,
    /// Hostname inside the container.
    pub hostname: String,
    /// Run privileged.
    pub privileged: bool,
    /// Networks to attach; the first is the primary (session) network.
    pub networks: Vec<String>,
    /// Environment variables (`KEY=value`).
    pub envs: Vec<String>,
    /// AppArmor profile to apply.
    pub apparmor_profile: Option<String>,
    /// Process cap.
    pub max_processes: Option<i64>,
    /// Memory cap in megabytes.
    pub max_memory_mb: Option<i64>,
    /// Graph-storage size for DinD volumes.
    pub storage_size: Option<String>,
}

/// One memory/CPU sample from the engine's stats stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    /// Memory used, in bytes.
    pub mem_usage: f64,
    /// Memory limit, in bytes.
    pub mem_limit: f64,
    /// CPU usage, percent of one core times core count.
    pub cpu_percent: f64,
}

/// A bidirectional terminal stream.
///
/// Bytes sent on `input` reach the container's stdin; bytes arriving on
/// `output` are the container's stdout/stderr. Dropping either side closes
/// the stream.
#[derive(Debug)]
pub struct Terminal {
    /// Writer towards the container.
    pub input: mpsc::Sender<Vec<u8>>,
    /// Reader from the container.
    pub output: mpsc::Receiver<Vec<u8>>,
}

impl Terminal {
    /// Create a terminal plus the backing channel ends, for implementations
    /// that pump the stream themselves.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Vec<u8>>, mpsc::Sender<Vec<u8>>) {
        let (input_tx, input_rx) = mpsc::channel(buffer);
        let (output_tx, output_rx) = mpsc::channel(buffer);
        (
            Self {
                input: input_tx,
                output: output_rx,
            },
            input_rx,
            output_tx,
        )
    }
}

/// The container control plane consumed by the DinD provisioner.
///
/// Every call is fallible and retryable per the resilience rules; the
/// production engine routes calls through a circuit breaker.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create and start a container.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or start fails.
    async fn container_create(&self, opts: CreateContainerOpts) -> Result<()>;

    /// The container's IP on the given network.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be inspected or has no
    /// address on that network.
    async fn container_ip(&self, name: &str, network: &str) -> Result<String>;

    /// Force-remove a container.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProvisionError::NoSuchContainer`] if it does not
    /// exist.
    async fn container_delete(&self, name: &str) -> Result<()>;

    /// Run a command and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec cannot run.
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<i64>;

    /// Run a command, returning its exit code and combined output.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec cannot run.
    async fn exec_capture(&self, name: &str, cmd: &[String]) -> Result<(i64, String)>;

    /// Attach a bidirectional terminal stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the attach handshake fails.
    async fn attach(&self, name: &str) -> Result<Terminal>;

    /// Copy a single file into `dest_dir` in the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    async fn copy_to(
        &self,
        name: &str,
        dest_dir: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<()>;

    /// Copy a file out of the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be read.
    async fn copy_from(&self, name: &str, path: &str) -> Result<Vec<u8>>;

    /// Take one stats sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the stats stream fails.
    async fn stats_sample(&self, name: &str) -> Result<EngineStats>;

    /// The container's exposed ports.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be inspected.
    async fn container_ports(&self, name: &str) -> Result<Vec<u16>>;

    /// Resize the container's TTY.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    async fn resize(&self, name: &str, rows: u32, cols: u32) -> Result<()>;
}

/// A mock engine for testing without a container runtime.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{
        async_trait, Bytes, ContainerEngine, CreateContainerOpts, EngineStats, Result, Terminal,
    };
    use crate::error::ProvisionError;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory engine recording created containers and uploads.
    #[derive(Default)]
    pub struct MockEngine {
        containers: Mutex<HashMap<String, CreateContainerOpts>>,
        uploads: Mutex<Vec<(String, String, String, Vec<u8>)>>,
        exec_log: Mutex<Vec<(String, Vec<String>)>>,
        /// Scripted output for `exec_capture`, keyed by the first command
        /// token.
        pub exec_output: Mutex<HashMap<String, (i64, String)>>,
        /// When set, `container_ip` fails to simulate a half-created
        /// container.
        pub fail_ip_lookup: Mutex<bool>,
    }

    impl MockEngine {
        /// Create an empty mock.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of live containers.
        #[must_use]
        pub fn container_count(&self) -> usize {
            self.containers.lock().len()
        }

        /// The creation options for a container.
        #[must_use]
        pub fn created_opts(&self, name: &str) -> Option<CreateContainerOpts> {
            self.containers.lock().get(name).cloned()
        }

        /// Recorded uploads as `(container, dest_dir, file_name, data)`.
        #[must_use]
        pub fn uploads(&self) -> Vec<(String, String, String, Vec<u8>)> {
            self.uploads.lock().clone()
        }

        /// Recorded exec invocations.
        #[must_use]
        pub fn execs(&self) -> Vec<(String, Vec<String>)> {
            self.exec_log.lock().clone()
        }
    }

    #[async_trait]
    impl ContainerEngine for MockEngine {
        async fn container_create(&self, opts: CreateContainerOpts) -> Result<()> {
            self.containers.lock().insert(opts.name.clone(), opts);
            Ok(())
        }

        async fn container_ip(&self, name: &str, _network: &str) -> Result<String> {
            if *self.fail_ip_lookup.lock() {
                return Err(ProvisionError::Transport("inspect failed".to_string()));
            }
            if self.containers.lock().contains_key(name) {
                Ok("10.0.0.2".to_string())
            } else {
                Err(ProvisionError::NoSuchContainer(name.to_string()))
            }
        }

        async fn container_delete(&self, name: &str) -> Result<()> {
            self.containers
                .lock()
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| ProvisionError::NoSuchContainer(name.to_string()))
        }

        async fn exec(&self, name: &str, cmd: &[String]) -> Result<i64> {
            self.exec_capture(name, cmd).await.map(|(code, _)| code)
        }

        async fn exec_capture(&self, name: &str, cmd: &[String]) -> Result<(i64, String)> {
            self.exec_log
                .lock()
                .push((name.to_string(), cmd.to_vec()));
            let key = cmd.first().cloned().unwrap_or_default();
            Ok(self
                .exec_output
                .lock()
                .get(&key)
                .cloned()
                .unwrap_or((0, String::new())))
        }

        async fn attach(&self, _name: &str) -> Result<Terminal> {
            // Loopback: echo whatever is written.
            let (terminal, mut input_rx, output_tx) = Terminal::channel(16);
            tokio::spawn(async move {
                while let Some(data) = input_rx.recv().await {
                    if output_tx.send(data).await.is_err() {
                        break;
                    }
                }
            });
            Ok(terminal)
        }

        async fn copy_to(
            &self,
            name: &str,
            dest_dir: &str,
            file_name: &str,
            data: Bytes,
        ) -> Result<()> {
            self.uploads.lock().push((
                name.to_string(),
                dest_dir.to_string(),
                file_name.to_string(),
                data.to_vec(),
            ));
            Ok(())
        }

        async fn copy_from(&self, _name: &str, path: &str) -> Result<Vec<u8>> {
            Ok(format!("contents of {path}").into_bytes())
        }

        async fn stats_sample(&self, _name: &str) -> Result<EngineStats> {
            Ok(EngineStats {
                mem_usage: 64.0 * 1024.0 * 1024.0,
                mem_limit: 512.0 * 1024.0 * 1024.0,
                cpu_percent: 3.5,
            })
        }

        async fn container_ports(&self, _name: &str) -> Result<Vec<u16>> {
            Ok(vec![80, 8080])
        }

        async fn resize(&self, _name: &str, _rows: u32, _cols: u32) -> Result<()> {
            Ok(())
        }
    }
}
