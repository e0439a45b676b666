//! The standard sweep tasks.

pub mod check_ports;
pub mod check_swarm_ports;
pub mod check_swarm_status;
pub mod collect_stats;
pub mod k8s;

pub use check_ports::CheckPorts;
pub use check_swarm_ports::CheckSwarmPorts;
pub use check_swarm_status::CheckSwarmStatus;
pub use collect_stats::CollectStats;
pub use k8s::{CheckK8sClusterExposedPorts, CheckK8sClusterStatus};

use std::sync::Arc;

use lessoncraft_provision::session_cache::SessionCache;
use lessoncraft_provision::{ContainerEngine, EngineFactory};
use lessoncraft_store::{Instance, Store, StoreError};

use crate::error::Result;

/// Shared engine resolution for probes: session lookup through a bounded
/// cache, then the per-session engine.
pub(crate) struct EngineLookup<S> {
    engines: Arc<dyn EngineFactory>,
    store: Arc<S>,
    cache: SessionCache,
}

impl<S: Store> EngineLookup<S> {
    pub(crate) fn new(engines: Arc<dyn EngineFactory>, store: Arc<S>) -> Self {
        Self {
            engines,
            store,
            cache: SessionCache::default(),
        }
    }

    pub(crate) async fn engine_for(
        &self,
        instance: &Instance,
    ) -> Result<Arc<dyn ContainerEngine>> {
        let session = match self.cache.get(&instance.session_id) {
            Some(session) => session,
            None => {
                let session = self
                    .store
                    .session_get(&instance.session_id)
                    .await?
                    .ok_or(StoreError::NotFound)?;
                self.cache.insert(session.clone());
                session
            }
        };
        Ok(self.engines.for_session(&session).await?)
    }
}

/// Render a byte count the way the stats rows expect (`64.0MiB`).
#[must_use]
pub fn format_bytes(bytes: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * KIB;
    const GIB: f64 = 1024.0 * MIB;

    if bytes >= GIB {
        format!("{:.1}GiB", bytes / GIB)
    } else if bytes >= MIB {
        format!("{:.1}MiB", bytes / MIB)
    } else if bytes >= KIB {
        format!("{:.1}KiB", bytes / KIB)
    } else {
        format!("{bytes:.0}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512.0), "512B");
        assert_eq!(format_bytes(2048.0), "2.0KiB");
        assert_eq!(format_bytes(64.0 * 1024.0 * 1024.0), "64.0MiB");
        assert_eq!(format_bytes(1.5 * 1024.0 * 1024.0 * 1024.0), "1.5GiB");
    }
}
