//! Engine and provisioner factories.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lessoncraft_store::Session;
use parking_lot::RwLock;

use crate::engine::ContainerEngine;
use crate::error::{ProvisionError, Result};
use crate::http_engine::HttpEngine;
use crate::InstanceProvisioner;

/// Resolves the container engine for a session.
///
/// Engines are per-session because each session's DinD daemon is its own
/// endpoint on the session host.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// The engine for the given session.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be constructed.
    async fn for_session(&self, session: &Session) -> Result<Arc<dyn ContainerEngine>>;
}

/// Engine factory caching one engine per session host endpoint.
#[derive(Default)]
pub struct SingleEngineFactory {
    port: u16,
    engines: RwLock<HashMap<String, Arc<dyn ContainerEngine>>>,
}

impl SingleEngineFactory {
    /// Create a factory dialing daemons on the given port.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached engines, for tests and health reporting.
    #[must_use]
    pub fn cached_engines(&self) -> usize {
        self.engines.read().len()
    }
}

#[async_trait]
impl EngineFactory for SingleEngineFactory {
    async fn for_session(&self, session: &Session) -> Result<Arc<dyn ContainerEngine>> {
        let endpoint = format!("{}:{}", session.host, self.port);

        if let Some(engine) = self.engines.read().get(&endpoint) {
            return Ok(Arc::clone(engine));
        }

        let engine: Arc<dyn ContainerEngine> = Arc::new(HttpEngine::new(&endpoint)?);
        self.engines
            .write()
            .insert(endpoint, Arc::clone(&engine));
        Ok(engine)
    }
}

/// Selects the provisioner backend by instance type tag.
pub struct ProvisionerFactory {
    dind: Arc<dyn InstanceProvisioner>,
    windows: Option<Arc<dyn InstanceProvisioner>>,
}

impl ProvisionerFactory {
    /// A factory with a DinD backend and an optional Windows backend.
    #[must_use]
    pub fn new(
        dind: Arc<dyn InstanceProvisioner>,
        windows: Option<Arc<dyn InstanceProvisioner>>,
    ) -> Self {
        Self { dind, windows }
    }

    /// The provisioner for the given type tag.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnknownType`] for a type with no backend.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn InstanceProvisioner>> {
        match kind {
            "windows" => self
                .windows
                .as_ref()
                .map(Arc::clone)
                .ok_or_else(|| ProvisionError::UnknownType("windows".to_string())),
            _ => Ok(Arc::clone(&self.dind)),
        }
    }
}

/// Factories for testing without a container runtime.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, Arc, ContainerEngine, EngineFactory, Result, Session};

    /// An engine factory handing out one shared engine for every session.
    pub struct MockEngineFactory(pub Arc<dyn ContainerEngine>);

    #[async_trait]
    impl EngineFactory for MockEngineFactory {
        async fn for_session(&self, _session: &Session) -> Result<Arc<dyn ContainerEngine>> {
            Ok(Arc::clone(&self.0))
        }
    }
}
