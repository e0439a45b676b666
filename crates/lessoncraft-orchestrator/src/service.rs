//! The orchestration service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use lessoncraft_core::{ClientId, PlaygroundId, SessionId, UserId};
use lessoncraft_events::{EventBus, EventPayload};
use lessoncraft_provision::{
    InstanceConfig, ProvisionError, ProvisionerFactory, Terminal,
};
use lessoncraft_store::{
    Instance, LoginRequest, Playground, Session, Store, StoreError, User,
};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::clients::ClientRegistry;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::load::LoadMonitor;
use crate::types::{Client, SessionConfig, SessionSetupConf, UserProfile, ViewPort};
use crate::SessionFabric;

struct Inner<S> {
    store: Arc<S>,
    events: Arc<EventBus>,
    provisioners: ProvisionerFactory,
    clients: ClientRegistry,
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
    load: Box<dyn LoadMonitor>,
    config: OrchestratorConfig,
}

/// The [`SessionFabric`] implementation.
///
/// Cheap to clone; all state lives behind one shared inner.
pub struct FabricService<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for FabricService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store + 'static> FabricService<S> {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        events: Arc<EventBus>,
        provisioners: ProvisionerFactory,
        load: Box<dyn LoadMonitor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                events,
                provisioners,
                clients: ClientRegistry::new(),
                locks: Mutex::new(HashMap::new()),
                load,
                config,
            }),
        }
    }

    /// The event bus, for subscribers wired up at startup.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Serialize mutations against one session.
    async fn lock_session(&self, session_id: &SessionId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.locks.lock();
            Arc::clone(
                locks
                    .entry(*session_id)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    fn drop_session_lock(&self, session_id: &SessionId) {
        self.inner.locks.lock().remove(session_id);
    }

    async fn session_required(&self, session_id: &SessionId) -> Result<Session> {
        self.inner
            .store
            .session_get(session_id)
            .await?
            .ok_or(OrchestratorError::SessionNotFound(*session_id))
    }

    async fn playground_required(&self, id: &PlaygroundId) -> Result<Playground> {
        self.inner
            .store
            .playground_get(id)
            .await?
            .ok_or_else(|| OrchestratorError::PlaygroundNotFound(id.clone()))
    }

    async fn instance_required(
        &self,
        session_id: &SessionId,
        name: &str,
    ) -> Result<Instance> {
        self.inner
            .store
            .instance_get(name)
            .await?
            .filter(|i| &i.session_id == session_id)
            .ok_or_else(|| OrchestratorError::InstanceNotFound(name.to_string()))
    }

    fn emit(&self, id: impl Into<String>, payload: EventPayload) {
        self.inner.events.emit(id, payload);
    }

    fn builder_out(&self, session_id: &SessionId, line: impl Into<String>) {
        self.emit(
            session_id.to_string(),
            EventPayload::SessionBuilderOut { line: line.into() },
        );
    }

    /// Deploy the session's stack, streaming builder output on the bus and
    /// marking the session ready on success.
    async fn deploy_stack(&self, mut session: Session) -> Result<()> {
        let stack = session.stack.clone().ok_or(OrchestratorError::NoStack)?;
        let stack_name = session
            .stack_name
            .clone()
            .unwrap_or_else(|| "stack".to_string());

        self.builder_out(&session.id, "Creating builder instance");
        let builder = self
            .instance_new(
                &session.id,
                InstanceConfig {
                    image_name: session.image_name.clone(),
                    ..InstanceConfig::default()
                },
            )
            .await?;

        self.builder_out(&session.id, "Uploading stack definition");
        self.instance_upload(
            &session.id,
            &builder.name,
            "stack.yml",
            "/tmp",
            Bytes::from(stack.into_bytes()),
        )
        .await?;

        self.builder_out(&session.id, format!("Deploying stack {stack_name}"));
        let code = self
            .instance_exec(
                &session.id,
                &builder.name,
                &[
                    "docker".to_string(),
                    "stack".to_string(),
                    "deploy".to_string(),
                    "-c".to_string(),
                    "/tmp/stack.yml".to_string(),
                    stack_name.clone(),
                ],
            )
            .await?;

        if code != 0 {
            self.builder_out(
                &session.id,
                format!("Stack deploy failed with exit code {code}"),
            );
            return Err(OrchestratorError::Provision(
                ProvisionError::CommandFailed { code },
            ));
        }

        self.builder_out(&session.id, format!("Stack {stack_name} deployed"));
        session.ready = true;
        self.inner.store.session_put(&session).await?;
        self.emit(session.id.to_string(), EventPayload::SessionReady);
        Ok(())
    }
}

#[async_trait]
impl<S: Store + 'static> SessionFabric for FabricService<S> {
    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn session_new(&self, config: SessionConfig) -> Result<Session> {
        let playground = self.playground_required(&config.playground_id).await?;

        let load = self.inner.load.load_avg();
        if load > self.inner.config.max_load_avg {
            warn!(
                load,
                max = self.inner.config.max_load_avg,
                "session admission rejected"
            );
            return Err(OrchestratorError::SystemOverloaded);
        }

        let now = Utc::now();
        let duration = config.duration.unwrap_or(playground.default_duration);
        let has_stack = config.stack.is_some();
        let session = Session {
            id: SessionId::generate(),
            playground_id: playground.id.clone(),
            host: config.host,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(duration)
                    .unwrap_or_else(|_| chrono::Duration::hours(4)),
            stack: config.stack,
            stack_name: config.stack_name,
            image_name: config.image_name,
            ready: !has_stack,
            teardown_error: None,
        };

        self.inner.store.session_put(&session).await?;
        info!(session_id = %session.id, playground = %playground.id, "session created");
        self.emit(session.id.to_string(), EventPayload::SessionNew);

        if has_stack {
            let service = self.clone();
            let spawned = session.clone();
            tokio::spawn(async move {
                if let Err(e) = service.deploy_stack(spawned.clone()).await {
                    error!(session_id = %spawned.id, error = %e, "stack deploy failed");
                    service.builder_out(&spawned.id, format!("Stack deploy failed: {e}"));
                }
            });
        }

        Ok(session)
    }

    async fn session_get(&self, session_id: &SessionId) -> Result<Session> {
        self.session_required(session_id).await
    }

    async fn session_close(&self, session_id: &SessionId) -> Result<()> {
        let _guard = self.lock_session(session_id).await;

        // Close is idempotent: a missing session is already closed.
        let Some(mut session) = self.inner.store.session_get(session_id).await? else {
            return Ok(());
        };

        let instances = self.inner.store.instances_by_session(session_id).await?;
        for instance in &instances {
            let provisioner = self.inner.provisioners.get(&instance.kind)?;
            if let Err(e) = provisioner.instance_delete(&session, instance).await {
                error!(
                    session_id = %session_id,
                    instance = %instance.name,
                    error = %e,
                    "instance teardown failed, leaving session for retry"
                );
                session.teardown_error = Some(format!("{}: {e}", instance.name));
                self.inner.store.session_put(&session).await?;
                return Err(e.into());
            }
            match self.inner.store.instance_delete(&instance.name).await {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            self.emit(
                session_id.to_string(),
                EventPayload::InstanceDelete {
                    name: instance.name.clone(),
                },
            );
        }

        self.inner.clients.detach_session(session_id);
        match self.inner.store.session_delete(session_id).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        self.drop_session_lock(session_id);

        info!(session_id = %session_id, "session closed");
        self.emit(session_id.to_string(), EventPayload::SessionEnd);
        Ok(())
    }

    async fn session_setup(
        &self,
        session_id: &SessionId,
        conf: SessionSetupConf,
    ) -> Result<()> {
        for desc in conf.instances {
            self.instance_new(
                session_id,
                InstanceConfig {
                    image_name: desc.image,
                    hostname: desc.hostname,
                    kind: desc.kind,
                    ..InstanceConfig::default()
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn session_deploy_stack(&self, session_id: &SessionId) -> Result<()> {
        let session = self.session_required(session_id).await?;
        self.deploy_stack(session).await
    }

    async fn session_smallest_viewport(&self, session_id: &SessionId) -> Option<ViewPort> {
        self.inner.clients.smallest_viewport(session_id)
    }

    // =========================================================================
    // Instance Operations
    // =========================================================================

    async fn instance_new(
        &self,
        session_id: &SessionId,
        mut config: InstanceConfig,
    ) -> Result<Instance> {
        let _guard = self.lock_session(session_id).await;

        let session = self.session_required(session_id).await?;
        let playground = self.playground_required(&session.playground_id).await?;

        if config.kind == "windows" && !playground.allow_windows_instances {
            return Err(OrchestratorError::WindowsNotAllowed);
        }
        config.privileged = playground.privileged;
        config.playground_fqdn = playground.domain.clone();
        if config.apparmor_profile.is_none() {
            config.apparmor_profile = self.inner.config.apparmor_profile.clone();
        }

        let provisioner = self.inner.provisioners.get(&config.kind)?;
        let instance = tokio::time::timeout(
            self.inner.config.provision_timeout,
            provisioner.instance_new(&session, config),
        )
        .await
        .map_err(|_| {
            OrchestratorError::Provision(ProvisionError::Transport(
                "provisioning deadline exceeded".to_string(),
            ))
        })??;

        if let Err(e) = self.inner.store.instance_put(&instance).await {
            // Fail closed: a provisioned container that cannot be persisted
            // is torn down before the error surfaces.
            error!(instance = %instance.name, error = %e, "persist failed, deleting instance");
            if let Err(del) = provisioner.instance_delete(&session, &instance).await {
                warn!(instance = %instance.name, error = %del, "compensating delete failed");
            }
            return Err(e.into());
        }

        info!(
            session_id = %session_id,
            instance = %instance.name,
            hostname = %instance.hostname,
            "instance created"
        );
        self.emit(
            session_id.to_string(),
            EventPayload::InstanceNew {
                name: instance.name.clone(),
                hostname: instance.hostname.clone(),
                proxy_host: instance.proxy_host.clone(),
            },
        );
        Ok(instance)
    }

    async fn instance_get(&self, session_id: &SessionId, name: &str) -> Result<Instance> {
        self.instance_required(session_id, name).await
    }

    async fn instance_find_by_session(&self, session_id: &SessionId) -> Result<Vec<Instance>> {
        Ok(self.inner.store.instances_by_session(session_id).await?)
    }

    async fn instance_delete(&self, session_id: &SessionId, name: &str) -> Result<()> {
        let _guard = self.lock_session(session_id).await;

        let session = self.session_required(session_id).await?;
        let instance = self.instance_required(session_id, name).await?;

        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        provisioner.instance_delete(&session, &instance).await?;

        match self.inner.store.instance_delete(name).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        self.emit(
            session_id.to_string(),
            EventPayload::InstanceDelete {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    async fn instance_exec(
        &self,
        session_id: &SessionId,
        name: &str,
        cmd: &[String],
    ) -> Result<i64> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner.instance_exec(&instance, cmd).await?)
    }

    async fn instance_terminal(&self, session_id: &SessionId, name: &str) -> Result<Terminal> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner.instance_terminal(&instance).await?)
    }

    async fn instance_resize(
        &self,
        session_id: &SessionId,
        name: &str,
        rows: u32,
        cols: u32,
    ) -> Result<()> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner.instance_resize(&instance, rows, cols).await?)
    }

    async fn instance_upload_from_url(
        &self,
        session_id: &SessionId,
        name: &str,
        file_name: &str,
        dest: &str,
        url: &str,
    ) -> Result<()> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner
            .instance_upload_from_url(&instance, file_name, dest, url)
            .await?)
    }

    async fn instance_upload(
        &self,
        session_id: &SessionId,
        name: &str,
        file_name: &str,
        dest: &str,
        data: Bytes,
    ) -> Result<()> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner
            .instance_upload(&instance, file_name, dest, data)
            .await?)
    }

    async fn instance_file(
        &self,
        session_id: &SessionId,
        name: &str,
        path: &str,
    ) -> Result<Vec<u8>> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner.instance_file(&instance, path).await?)
    }

    async fn instance_fs_tree(
        &self,
        session_id: &SessionId,
        name: &str,
    ) -> Result<serde_json::Value> {
        let instance = self.instance_required(session_id, name).await?;
        let provisioner = self.inner.provisioners.get(&instance.kind)?;
        Ok(provisioner.instance_fs_tree(&instance).await?)
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    async fn client_new(&self, session_id: &SessionId) -> Result<Client> {
        self.session_required(session_id).await?;
        Ok(self.inner.clients.attach(*session_id))
    }

    async fn client_resize_viewport(
        &self,
        client_id: &ClientId,
        cols: u32,
        rows: u32,
    ) -> Result<()> {
        let (session_id, minimum) = self
            .inner
            .clients
            .resize(client_id, ViewPort { cols, rows })
            .ok_or(OrchestratorError::ClientNotFound(*client_id))?;

        self.emit(
            session_id.to_string(),
            EventPayload::InstanceViewportResize {
                cols: minimum.cols,
                rows: minimum.rows,
            },
        );
        Ok(())
    }

    async fn client_close(&self, client_id: &ClientId) {
        if let Some((session_id, Some(minimum))) = self.inner.clients.detach(client_id) {
            self.emit(
                session_id.to_string(),
                EventPayload::InstanceViewportResize {
                    cols: minimum.cols,
                    rows: minimum.rows,
                },
            );
        }
    }

    async fn client_count(&self) -> usize {
        self.inner.clients.count()
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    async fn user_new_login_request(&self, provider: &str) -> Result<LoginRequest> {
        let request = LoginRequest {
            id: uuid::Uuid::new_v4().simple().to_string(),
            provider: provider.to_string(),
            created_at: Utc::now(),
        };
        self.inner.store.login_request_put(&request).await?;
        Ok(request)
    }

    async fn user_login(&self, request_id: &str, profile: UserProfile) -> Result<User> {
        let request = self
            .inner
            .store
            .login_request_consume(request_id)
            .await?
            .ok_or_else(|| OrchestratorError::LoginRequestNotFound(request_id.to_string()))?;

        let user = User {
            id: UserId::from_provider(&request.provider, &profile.provider_user_id),
            name: profile.name,
            email: profile.email,
            avatar: profile.avatar,
            provider: request.provider,
            provider_user_id: profile.provider_user_id,
        };

        self.inner.store.user_put(&user).await?;
        info!(user_id = %user.id, provider = %user.provider, "user logged in");
        Ok(user)
    }

    async fn user_get(&self, user_id: &UserId) -> Result<User> {
        self.inner
            .store
            .user_get(user_id)
            .await?
            .ok_or_else(|| OrchestratorError::UserNotFound(user_id.clone()))
    }

    // =========================================================================
    // Playground Operations
    // =========================================================================

    async fn playground_new(&self, playground: Playground) -> Result<Playground> {
        self.inner.store.playground_put(&playground).await?;
        self.emit(playground.id.to_string(), EventPayload::PlaygroundNew);
        Ok(playground)
    }

    async fn playground_get(&self, id: &PlaygroundId) -> Result<Playground> {
        self.playground_required(id).await
    }

    async fn playground_find_by_domain(&self, domain: &str) -> Result<Playground> {
        self.inner
            .store
            .playground_by_domain(domain)
            .await?
            .ok_or_else(|| OrchestratorError::PlaygroundNotFound(PlaygroundId::new(domain)))
    }

    async fn playground_list(&self) -> Result<Vec<Playground>> {
        Ok(self.inner.store.playgrounds_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::FixedLoad;
    use lessoncraft_events::EventKind;
    use lessoncraft_provision::engine::mock::MockEngine;
    use lessoncraft_provision::factory::mock::MockEngineFactory;
    use lessoncraft_provision::DindProvisioner;
    use lessoncraft_store::MemoryStore;

    struct Fixture {
        service: FabricService<MemoryStore>,
        engine: Arc<MockEngine>,
        store: Arc<MemoryStore>,
        playground: Playground,
    }

    async fn fixture_with_load(load: f64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(MockEngine::new());
        let events = Arc::new(EventBus::new());

        let playground = Playground::new(PlaygroundId::new("default"), "play.example.com");
        store.playground_put(&playground).await.unwrap();

        let dind = DindProvisioner::new(
            Arc::new(MockEngineFactory(Arc::clone(&engine) as _)),
            Arc::clone(&store),
            Arc::clone(&store),
        )
        .unwrap();
        let provisioners = ProvisionerFactory::new(Arc::new(dind), None);

        let service = FabricService::new(
            Arc::clone(&store),
            events,
            provisioners,
            Box::new(FixedLoad(load)),
            OrchestratorConfig::default(),
        );

        Fixture {
            service,
            engine,
            store,
            playground,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_load(0.5).await
    }

    fn session_config(playground: &Playground) -> SessionConfig {
        SessionConfig {
            playground_id: playground.id.clone(),
            host: "node-1".to_string(),
            duration: None,
            stack: None,
            stack_name: None,
            image_name: None,
        }
    }

    #[tokio::test]
    async fn session_new_sets_expiry_from_playground() {
        let f = fixture().await;
        let session = f
            .service
            .session_new(session_config(&f.playground))
            .await
            .unwrap();

        let ttl = session.expires_at - session.created_at;
        assert_eq!(ttl.num_hours(), 4);
        assert!(session.ready);

        let stored = f.store.session_get(&session.id).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn overloaded_system_rejects_admission() {
        let f = fixture_with_load(500.0).await;
        let result = f.service.session_new(session_config(&f.playground)).await;
        assert!(matches!(result, Err(OrchestratorError::SystemOverloaded)));
    }

    #[tokio::test]
    async fn unknown_playground_rejected() {
        let f = fixture().await;
        let mut config = session_config(&f.playground);
        config.playground_id = PlaygroundId::new("missing");
        let result = f.service.session_new(config).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::PlaygroundNotFound(_))
        ));
    }

    #[tokio::test]
    async fn instance_lifecycle() {
        let f = fixture().await;
        let session = f
            .service
            .session_new(session_config(&f.playground))
            .await
            .unwrap();

        let first = f
            .service
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();
        assert_eq!(first.hostname, "node1");

        let second = f
            .service
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();
        assert_eq!(second.hostname, "node2");

        let instances = f.service.instance_find_by_session(&session.id).await.unwrap();
        assert_eq!(instances.len(), 2);

        f.service
            .instance_delete(&session.id, &first.name)
            .await
            .unwrap();
        let instances = f.service.instance_find_by_session(&session.id).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(f.engine.container_count(), 1);
    }

    #[tokio::test]
    async fn windows_gated_by_playground() {
        let f = fixture().await;
        let session = f
            .service
            .session_new(session_config(&f.playground))
            .await
            .unwrap();

        let config = InstanceConfig {
            kind: "windows".to_string(),
            ..InstanceConfig::default()
        };
        let result = f.service.instance_new(&session.id, config).await;
        assert!(matches!(result, Err(OrchestratorError::WindowsNotAllowed)));
    }

    #[tokio::test]
    async fn close_destroys_instances_and_is_idempotent() {
        let f = fixture().await;
        let session = f
            .service
            .session_new(session_config(&f.playground))
            .await
            .unwrap();
        f.service
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();

        let events_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events_seen);
        f.service.events().on(EventKind::SessionEnd, move |event| {
            sink.lock().push(event.id.clone());
        });

        f.service.session_close(&session.id).await.unwrap();
        assert_eq!(f.engine.container_count(), 0);
        assert!(f.store.session_get(&session.id).await.unwrap().is_none());
        assert_eq!(events_seen.lock().len(), 1);

        // Second close is a no-op.
        f.service.session_close(&session.id).await.unwrap();
        assert_eq!(events_seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn viewport_minimum_tracks_clients() {
        let f = fixture().await;
        let session = f
            .service
            .session_new(session_config(&f.playground))
            .await
            .unwrap();

        let resizes = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&resizes);
        f.service
            .events()
            .on(EventKind::InstanceViewportResize, move |event| {
                if let EventPayload::InstanceViewportResize { cols, rows } = event.payload {
                    sink.lock().push((cols, rows));
                }
            });

        let a = f.service.client_new(&session.id).await.unwrap();
        let b = f.service.client_new(&session.id).await.unwrap();
        assert_eq!(f.service.client_count().await, 2);

        f.service
            .client_resize_viewport(&a.id, 120, 30)
            .await
            .unwrap();
        f.service
            .client_resize_viewport(&b.id, 80, 40)
            .await
            .unwrap();

        assert_eq!(
            f.service.session_smallest_viewport(&session.id).await,
            Some(ViewPort { cols: 80, rows: 30 })
        );
        assert_eq!(resizes.lock().last(), Some(&(80, 30)));

        // Disconnect does not end the session; the minimum relaxes.
        f.service.client_close(&b.id).await;
        assert_eq!(
            f.service.session_smallest_viewport(&session.id).await,
            Some(ViewPort { cols: 120, rows: 30 })
        );
        assert!(f.store.session_get(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn login_request_is_single_use() {
        let f = fixture().await;
        let request = f.service.user_new_login_request("github").await.unwrap();

        let profile = UserProfile {
            provider_user_id: "1234".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            avatar: String::new(),
        };

        let user = f
            .service
            .user_login(&request.id, profile.clone())
            .await
            .unwrap();
        assert_eq!(user.id, UserId::from_provider("github", "1234"));
        assert_eq!(user.provider, "github");
        assert_eq!(
            f.service.user_get(&user.id).await.unwrap().email,
            "ada@example.com"
        );

        // Replays are rejected.
        let replay = f.service.user_login(&request.id, profile).await;
        assert!(matches!(
            replay,
            Err(OrchestratorError::LoginRequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn session_setup_creates_described_instances() {
        let f = fixture().await;
        let session = f
            .service
            .session_new(session_config(&f.playground))
            .await
            .unwrap();

        f.service
            .session_setup(
                &session.id,
                SessionSetupConf {
                    instances: vec![
                        crate::types::SetupInstance {
                            image: Some("alpine:3".to_string()),
                            hostname: Some("manager1".to_string()),
                            kind: String::new(),
                        },
                        crate::types::SetupInstance::default(),
                    ],
                },
            )
            .await
            .unwrap();

        let instances = f.service.instance_find_by_session(&session.id).await.unwrap();
        assert_eq!(instances.len(), 2);
        assert!(instances.iter().any(|i| i.hostname == "manager1"));
        assert!(instances.iter().any(|i| i.hostname == "node1"));
    }

    #[tokio::test]
    async fn stack_deploy_streams_builder_output() {
        let f = fixture().await;

        let lines = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        f.service
            .events()
            .on(EventKind::SessionBuilderOut, move |event| {
                if let EventPayload::SessionBuilderOut { line } = &event.payload {
                    sink.lock().push(line.clone());
                }
            });
        let ready = Arc::new(parking_lot::Mutex::new(false));
        let ready_sink = Arc::clone(&ready);
        f.service.events().on(EventKind::SessionReady, move |_| {
            *ready_sink.lock() = true;
        });

        let mut config = session_config(&f.playground);
        config.stack = Some("version: '3'\nservices: {}\n".to_string());
        config.stack_name = Some("demo".to_string());

        let session = f.service.session_new(config).await.unwrap();
        assert!(!session.ready);

        // The deploy runs on a spawned task.
        for _ in 0..50 {
            if *ready.lock() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(*ready.lock(), "session never became ready");
        assert!(lines.lock().iter().any(|l| l.contains("Deploying stack demo")));
        let stored = f.store.session_get(&session.id).await.unwrap().unwrap();
        assert!(stored.ready);
    }
}
