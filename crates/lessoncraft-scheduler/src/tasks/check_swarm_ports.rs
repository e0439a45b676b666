//! Service-published port probing on swarm managers.

use std::sync::Arc;

use async_trait::async_trait;
use lessoncraft_store::{ClusterRole, Instance, Store};
use tracing::debug;

use super::EngineLookup;
use crate::error::Result;
use crate::Task;

/// The `CheckSwarmPorts` sweep task: merges ports published by swarm
/// services into the manager instance's port list.
pub struct CheckSwarmPorts<S> {
    lookup: EngineLookup<S>,
    store: Arc<S>,
}

impl<S: Store> CheckSwarmPorts<S> {
    /// Create the task.
    #[must_use]
    pub fn new(engines: Arc<dyn lessoncraft_provision::EngineFactory>, store: Arc<S>) -> Self {
        Self {
            lookup: EngineLookup::new(engines, Arc::clone(&store)),
            store,
        }
    }
}

/// Extract published ports from `docker service ls --format {{.Ports}}`
/// output, lines like `*:8080->80/tcp,*:9090->9090/tcp`.
fn parse_published_ports(output: &str) -> Vec<u16> {
    let mut ports: Vec<u16> = output
        .lines()
        .flat_map(|line| line.split(','))
        .filter_map(|entry| {
            let entry = entry.trim();
            let after_colon = entry.strip_prefix("*:")?;
            let published = after_colon.split("->").next()?;
            published.parse().ok()
        })
        .collect();
    ports.sort_unstable();
    ports.dedup();
    ports
}

#[async_trait]
impl<S: Store + 'static> Task for CheckSwarmPorts<S> {
    fn name(&self) -> &'static str {
        "CheckSwarmPorts"
    }

    async fn run(&self, instance: &Instance) -> Result<()> {
        if instance.cluster_role != Some(ClusterRole::Manager) {
            return Ok(());
        }

        let engine = self.lookup.engine_for(instance).await?;
        let (code, output) = engine
            .exec_capture(
                &instance.name,
                &[
                    "docker".to_string(),
                    "service".to_string(),
                    "ls".to_string(),
                    "--format".to_string(),
                    "{{.Ports}}".to_string(),
                ],
            )
            .await?;
        if code != 0 {
            return Ok(());
        }

        let mut merged = instance.ports.clone();
        merged.extend(parse_published_ports(&output));
        merged.sort_unstable();
        merged.dedup();

        if merged != instance.ports {
            debug!(instance = %instance.name, ports = ?merged, "published ports changed");
            let mut updated = instance.clone();
            updated.ports = merged;
            self.store.instance_put(&updated).await?;
        }
        Ok(())
    }
}
