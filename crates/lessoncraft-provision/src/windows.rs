//! The Windows pool provisioner.
//!
//! Windows sandboxes cannot be spun up on demand the way DinD containers
//! are; a pool of pre-provisioned machines is kept in storage and instances
//! lease a slot for the session's lifetime. Terminal and file I/O go
//! through the machine's agent, not the container engine, so the engine
//! operations are unsupported here.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lessoncraft_store::{Instance, Session, Store};
use tracing::info;

use crate::config::InstanceConfig;
use crate::engine::Terminal;
use crate::error::{ProvisionError, Result};
use crate::proxy::{encode_host, HostOpts};
use crate::InstanceProvisioner;

/// Port of the Windows agent endpoint, encoded into the proxy host.
const AGENT_PORT: u16 = 222;

/// Windows-pool-backed [`InstanceProvisioner`].
pub struct WindowsProvisioner<S> {
    store: Arc<S>,
}

impl<S: Store> WindowsProvisioner<S> {
    /// Create a provisioner over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> InstanceProvisioner for WindowsProvisioner<S> {
    async fn instance_new(&self, session: &Session, config: InstanceConfig) -> Result<Instance> {
        let lease = self
            .store
            .windows_pool_acquire(&session.id)
            .await?
            .ok_or(ProvisionError::PoolExhausted)?;

        info!(session_id = %session.id, lease = %lease.id, "leased windows instance");

        let hostname = config.hostname.unwrap_or_else(|| lease.id.clone());
        let proxy_host = encode_host(
            &session.id,
            &lease.ip,
            HostOpts {
                encoded_port: Some(AGENT_PORT),
            },
        );

        Ok(Instance {
            name: format!("{}_{}", session.id.short(), lease.id),
            session_id: session.id,
            hostname,
            image: "windows".to_string(),
            ip: lease.ip.clone(),
            routable_ip: lease.ip.clone(),
            proxy_host,
            session_host: session.host.clone(),
            tls: config.tls,
            lesson_ctx: config.lesson_ctx,
            windows_id: Some(lease.id),
            kind: "windows".to_string(),
            ports: Vec::new(),
            cluster_role: None,
            max_processes: config.max_processes,
            max_memory_mb: config.max_memory_mb,
            storage_size: config.storage_size,
        })
    }

    async fn instance_delete(&self, _session: &Session, instance: &Instance) -> Result<()> {
        if let Some(lease_id) = &instance.windows_id {
            match self.store.windows_pool_release(lease_id).await {
                Ok(()) | Err(lessoncraft_store::StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn instance_exec(&self, _instance: &Instance, _cmd: &[String]) -> Result<i64> {
        Err(ProvisionError::Unsupported("windows exec"))
    }

    async fn instance_terminal(&self, _instance: &Instance) -> Result<Terminal> {
        Err(ProvisionError::Unsupported("windows terminal attach"))
    }

    async fn instance_resize(&self, _instance: &Instance, _rows: u32, _cols: u32) -> Result<()> {
        // The agent handles its own terminal geometry.
        Ok(())
    }

    async fn instance_upload_from_url(
        &self,
        _instance: &Instance,
        _file_name: &str,
        _dest: &str,
        _url: &str,
    ) -> Result<()> {
        Err(ProvisionError::Unsupported("windows upload"))
    }

    async fn instance_upload(
        &self,
        _instance: &Instance,
        _file_name: &str,
        _dest: &str,
        _data: Bytes,
    ) -> Result<()> {
        Err(ProvisionError::Unsupported("windows upload"))
    }

    async fn instance_file(&self, _instance: &Instance, _path: &str) -> Result<Vec<u8>> {
        Err(ProvisionError::Unsupported("windows file read"))
    }

    async fn instance_fs_tree(&self, _instance: &Instance) -> Result<serde_json::Value> {
        Err(ProvisionError::Unsupported("windows fs tree"))
    }
}
