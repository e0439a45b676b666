//! Swarm membership probing.

use std::sync::Arc;

use async_trait::async_trait;
use lessoncraft_store::{ClusterRole, Instance, Store};
use tracing::debug;

use super::EngineLookup;
use crate::error::Result;
use crate::Task;

/// The `CheckSwarmStatus` sweep task: records whether an instance is a
/// swarm manager or worker.
pub struct CheckSwarmStatus<S> {
    lookup: EngineLookup<S>,
    store: Arc<S>,
}

impl<S: Store> CheckSwarmStatus<S> {
    /// Create the task.
    #[must_use]
    pub fn new(engines: Arc<dyn lessoncraft_provision::EngineFactory>, store: Arc<S>) -> Self {
        Self {
            lookup: EngineLookup::new(engines, Arc::clone(&store)),
            store,
        }
    }
}

/// Interpret `docker info` swarm fields: local node state plus whether the
/// control plane is available on this node.
fn parse_swarm_role(output: &str) -> Option<ClusterRole> {
    let mut fields = output.split_whitespace();
    let state = fields.next()?;
    let control_available = fields.next().unwrap_or("false");

    if state != "active" {
        return None;
    }
    if control_available == "true" {
        Some(ClusterRole::Manager)
    } else {
        Some(ClusterRole::Worker)
    }
}

#[async_trait]
impl<S: Store + 'static> Task for CheckSwarmStatus<S> {
    fn name(&self) -> &'static str {
        "CheckSwarmStatus"
    }

    async fn run(&self, instance: &Instance) -> Result<()> {
        if instance.kind == "windows" || instance.kind == "k8s" {
            return Ok(());
        }

        let engine = self.lookup.engine_for(instance).await?;
        let (code, output) = engine
            .exec_capture(
                &instance.name,
                &[
                    "docker".to_string(),
                    "info".to_string(),
                    "--format".to_string(),
                    "{{.Swarm.LocalNodeState}} {{.Swarm.ControlAvailable}}".to_string(),
                ],
            )
            .await?;

        let role = if code == 0 {
            parse_swarm_role(&output)
        } else {
            None
        };

        if role != instance.cluster_role {
            debug!(instance = %instance.name, ?role, "swarm role changed");
            let mut updated = instance.clone();
            updated.cluster_role = role;
            self.store.instance_put(&updated).await?;
        }
        Ok(())
    }
}
