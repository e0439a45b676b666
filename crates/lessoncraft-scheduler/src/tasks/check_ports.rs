//! Exposed-port probing for single instances.

use std::sync::Arc;

use async_trait::async_trait;
use lessoncraft_store::{Instance, Store};
use tracing::debug;

use super::EngineLookup;
use crate::error::Result;
use crate::Task;

/// The `CheckPorts` sweep task: reads each instance's exposed ports from
/// the engine and persists changes.
pub struct CheckPorts<S> {
    lookup: EngineLookup<S>,
    store: Arc<S>,
}

impl<S: Store> CheckPorts<S> {
    /// Create the task.
    #[must_use]
    pub fn new(engines: Arc<dyn lessoncraft_provision::EngineFactory>, store: Arc<S>) -> Self {
        Self {
            lookup: EngineLookup::new(engines, Arc::clone(&store)),
            store,
        }
    }
}

#[async_trait]
impl<S: Store + 'static> Task for CheckPorts<S> {
    fn name(&self) -> &'static str {
        "CheckPorts"
    }

    async fn run(&self, instance: &Instance) -> Result<()> {
        if instance.kind == "windows" {
            return Ok(());
        }

        let engine = self.lookup.engine_for(instance).await?;
        let mut ports = engine.container_ports(&instance.name).await?;
        ports.sort_unstable();

        if ports != instance.ports {
            debug!(instance = %instance.name, ?ports, "exposed ports changed");
            let mut updated = instance.clone();
            updated.ports = ports;
            self.store.instance_put(&updated).await?;
        }
        Ok(())
    }
}
