//! The container-in-container (DinD) provisioner.
//!
//! Materializes sandbox instances on the session's DinD daemon, applying
//! the lesson-derived image and resource shape, assigning `nodeN`
//! hostnames, and encoding the proxy host for the reverse proxy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lessoncraft_core::SessionId;
use lessoncraft_lesson::Lesson;
use lessoncraft_store::{Instance, LessonStore, Session, Store, StoreError};
use tracing::{info, warn};

use crate::config::InstanceConfig;
use crate::engine::{CreateContainerOpts, Terminal};
use crate::error::{ProvisionError, Result};
use crate::factory::EngineFactory;
use crate::proxy::{encode_host, HostOpts};
use crate::session_cache::SessionCache;
use crate::InstanceProvisioner;

/// Marker file whose contents point at the learner's current working
/// directory inside the sandbox.
const CWD_MARKER: &str = "/var/run/cwd";

/// DinD-backed [`InstanceProvisioner`].
pub struct DindProvisioner<S, L> {
    engines: Arc<dyn EngineFactory>,
    store: Arc<S>,
    lessons: Arc<L>,
    cache: SessionCache,
    downloads: reqwest::Client,
}

impl<S: Store, L: LessonStore> DindProvisioner<S, L> {
    /// Create a provisioner.
    ///
    /// # Errors
    ///
    /// Returns an error if the download client cannot be constructed.
    pub fn new(engines: Arc<dyn EngineFactory>, store: Arc<S>, lessons: Arc<L>) -> Result<Self> {
        let downloads = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProvisionError::Transport(e.to_string()))?;

        Ok(Self {
            engines,
            store,
            lessons,
            cache: SessionCache::default(),
            downloads,
        })
    }

    async fn session(&self, session_id: &SessionId) -> Result<Session> {
        if let Some(session) = self.cache.get(session_id) {
            return Ok(session);
        }

        let session = self
            .store
            .session_get(session_id)
            .await?
            .ok_or(ProvisionError::Store(StoreError::NotFound))?;
        self.cache.insert(session.clone());
        Ok(session)
    }

    async fn engine_for(&self, instance: &Instance) -> Result<Arc<dyn crate::ContainerEngine>> {
        let session = self.session(&instance.session_id).await?;
        self.engines.for_session(&session).await
    }

    /// Shape the config from the lesson context: image, resource caps,
    /// hostname, envs, and networks flow down the precedence chain. A
    /// failed lesson lookup degrades to the playground defaults.
    async fn apply_lesson_shape(&self, config: &mut InstanceConfig) {
        let Some(ctx) = config.lesson_ctx.clone() else {
            return;
        };

        let lesson: Lesson = match self.lessons.get_lesson(&ctx.lesson_id).await {
            Ok(lesson) => lesson,
            Err(e) => {
                warn!(lesson_id = %ctx.lesson_id, error = %e, "lesson lookup failed, using defaults");
                return;
            }
        };

        // The container branch is exclusive for image selection: a step
        // that declares containers never falls back to `step.image` or the
        // lesson default, only to the playground default.
        let mut image_from_containers = false;

        if let Some(step) = lesson.steps.get(ctx.step_index) {
            if let Some(primary) = step.primary_container() {
                image_from_containers = true;
                if config.image_name.is_none() && !primary.image.is_empty() {
                    config.image_name = Some(primary.image.clone());
                }
                if config.hostname.is_none() && !primary.hostname.is_empty() {
                    config.hostname = Some(primary.hostname.clone());
                }
                config.envs.extend(primary.envs.iter().cloned());
                config.networks.extend(primary.networks.iter().cloned());
                config.max_processes = config
                    .max_processes
                    .or(primary.resource_limits.max_processes);
                config.max_memory_mb = config
                    .max_memory_mb
                    .or(primary.resource_limits.max_memory_mb);
                config.storage_size = config
                    .storage_size
                    .take()
                    .or_else(|| primary.resource_limits.storage_size.clone());
            } else if config.image_name.is_none() {
                config.image_name = step.image.clone();
            }

            config.max_processes = config.max_processes.or(step.resource_limits.max_processes);
            config.max_memory_mb = config.max_memory_mb.or(step.resource_limits.max_memory_mb);
            config.storage_size = config
                .storage_size
                .take()
                .or_else(|| step.resource_limits.storage_size.clone());
        }

        if !image_from_containers && config.image_name.is_none() {
            config.image_name = lesson.default_image.clone();
        }
        config.max_processes = config
            .max_processes
            .or(lesson.default_resource_limits.max_processes);
        config.max_memory_mb = config
            .max_memory_mb
            .or(lesson.default_resource_limits.max_memory_mb);
        config.storage_size = config
            .storage_size
            .take()
            .or_else(|| lesson.default_resource_limits.storage_size.clone());
    }

    async fn instance_cwd(&self, instance: &Instance) -> Result<String> {
        let engine = self.engine_for(instance).await?;
        let (code, output) = engine
            .exec_capture(
                &instance.name,
                &[
                    "bash".to_string(),
                    "-c".to_string(),
                    format!("pwdx $(<{CWD_MARKER})"),
                ],
            )
            .await?;
        if code > 0 {
            return Err(ProvisionError::CommandFailed { code });
        }

        output
            .split_once(':')
            .map(|(_, path)| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .ok_or_else(|| ProvisionError::Protocol(format!("unparseable cwd: {output}")))
    }
}

/// The smallest `nodeN` hostname not taken by any existing instance.
#[must_use]
pub fn next_hostname(existing: &[Instance]) -> String {
    for n in 1.. {
        let candidate = format!("node{n}");
        if !existing.iter().any(|i| i.hostname == candidate) {
            return candidate;
        }
    }
    unreachable!()
}

fn generated_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[async_trait]
impl<S: Store + 'static, L: LessonStore + 'static> InstanceProvisioner
    for DindProvisioner<S, L>
{
    async fn instance_new(
        &self,
        session: &Session,
        mut config: InstanceConfig,
    ) -> Result<Instance> {
        self.apply_lesson_shape(&mut config).await;

        let playground = self
            .store
            .playground_get(&session.playground_id)
            .await?
            .ok_or(ProvisionError::Store(StoreError::NotFound))?;

        let image = config
            .image_name
            .clone()
            .unwrap_or_else(|| playground.default_dind_instance_image.clone());
        info!(session_id = %session.id, image = %image, "creating instance");

        let hostname = match config.hostname.clone() {
            Some(hostname) => hostname,
            None => {
                let existing = self.store.instances_by_session(&session.id).await?;
                next_hostname(&existing)
            }
        };

        let mut networks = vec![session.id.to_string()];
        if playground.allow_extra_networks {
            networks.extend(config.networks.iter().cloned());
        }

        let name = format!("{}_{}", session.id.short(), generated_id());
        let engine = self.engines.for_session(session).await?;

        engine
            .container_create(CreateContainerOpts {
                image: image.clone(),
                name: name.clone(),
                hostname: hostname.clone(),
                privileged: config.privileged,
                networks,
                envs: config.envs.clone(),
                apparmor_profile: config.apparmor_profile.clone(),
                max_processes: config.max_processes,
                max_memory_mb: config.max_memory_mb,
                storage_size: config.storage_size.clone(),
            })
            .await?;

        // Fail closed: a container that cannot be fully materialized is
        // torn down before the error surfaces.
        let materialize = async {
            let ip = engine.container_ip(&name, &session.id.to_string()).await?;

            if let Some(tls) = &config.tls {
                for (file, data) in [
                    ("server-cert.pem", &tls.server_cert),
                    ("server-key.pem", &tls.server_key),
                    ("ca.pem", &tls.ca_cert),
                ] {
                    if !data.is_empty() {
                        engine
                            .copy_to(&name, "/var/run/certs", file, Bytes::from(data.clone()))
                            .await?;
                    }
                }
            }

            Ok::<_, ProvisionError>(ip)
        };

        let ip = match materialize.await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(container = %name, error = %e, "instance setup failed, deleting");
                if let Err(del) = engine.container_delete(&name).await {
                    warn!(container = %name, error = %del, "compensating delete failed");
                }
                return Err(e);
            }
        };

        let proxy_host = encode_host(&session.id, &ip, HostOpts::default());

        Ok(Instance {
            name,
            session_id: session.id,
            hostname,
            image,
            routable_ip: ip.clone(),
            ip,
            proxy_host,
            session_host: session.host.clone(),
            tls: config.tls,
            lesson_ctx: config.lesson_ctx,
            windows_id: None,
            kind: config.kind,
            ports: Vec::new(),
            cluster_role: None,
            max_processes: config.max_processes,
            max_memory_mb: config.max_memory_mb,
            storage_size: config.storage_size,
        })
    }

    async fn instance_delete(&self, session: &Session, instance: &Instance) -> Result<()> {
        let engine = self.engines.for_session(session).await?;
        match engine.container_delete(&instance.name).await {
            Ok(()) | Err(ProvisionError::NoSuchContainer(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn instance_exec(&self, instance: &Instance, cmd: &[String]) -> Result<i64> {
        let engine = self.engine_for(instance).await?;
        engine.exec(&instance.name, cmd).await
    }

    async fn instance_terminal(&self, instance: &Instance) -> Result<Terminal> {
        let engine = self.engine_for(instance).await?;
        engine.attach(&instance.name).await
    }

    async fn instance_resize(&self, instance: &Instance, rows: u32, cols: u32) -> Result<()> {
        let engine = self.engine_for(instance).await?;
        engine.resize(&instance.name, rows, cols).await
    }

    async fn instance_upload_from_url(
        &self,
        instance: &Instance,
        file_name: &str,
        dest: &str,
        url: &str,
    ) -> Result<()> {
        info!(url, container = %instance.name, "downloading file");
        let response = self
            .downloads
            .get(url)
            .send()
            .await
            .map_err(|e| ProvisionError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ProvisionError::Download {
                url: url.to_string(),
                reason: format!("status code {}", response.status().as_u16()),
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| ProvisionError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.instance_upload(instance, file_name, dest, data).await
    }

    async fn instance_upload(
        &self,
        instance: &Instance,
        file_name: &str,
        dest: &str,
        data: Bytes,
    ) -> Result<()> {
        let dest_dir = if dest.starts_with('/') {
            dest.to_string()
        } else {
            let cwd = self.instance_cwd(instance).await?;
            if dest.is_empty() {
                cwd
            } else {
                format!("{cwd}/{dest}")
            }
        };

        let engine = self.engine_for(instance).await?;
        engine
            .copy_to(&instance.name, &dest_dir, file_name, data)
            .await
    }

    async fn instance_file(&self, instance: &Instance, path: &str) -> Result<Vec<u8>> {
        let engine = self.engine_for(instance).await?;
        engine.copy_from(&instance.name, path).await
    }

    async fn instance_fs_tree(&self, instance: &Instance) -> Result<serde_json::Value> {
        let engine = self.engine_for(instance).await?;
        let (code, output) = engine
            .exec_capture(
                &instance.name,
                &[
                    "bash".to_string(),
                    "-c".to_string(),
                    "tree --noreport -J $HOME".to_string(),
                ],
            )
            .await?;
        if code > 0 {
            return Err(ProvisionError::CommandFailed { code });
        }

        serde_json::from_str(&output).map_err(|e| ProvisionError::Protocol(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::engine::ContainerEngine;
    use lessoncraft_lesson::{ContainerConfig, LessonStep, ResourceLimits};
    use lessoncraft_store::{LessonContext, MemoryStore, Playground};
    use lessoncraft_core::PlaygroundId;

    struct MockEngineFactory(Arc<MockEngine>);

    #[async_trait]
    impl EngineFactory for MockEngineFactory {
        async fn for_session(&self, _session: &Session) -> Result<Arc<dyn ContainerEngine>> {
            Ok(Arc::clone(&self.0) as Arc<dyn ContainerEngine>)
        }
    }

    struct Fixture {
        engine: Arc<MockEngine>,
        store: Arc<MemoryStore>,
        provisioner: DindProvisioner<MemoryStore, MemoryStore>,
        session: Session,
    }

    async fn fixture() -> Fixture {
        let engine = Arc::new(MockEngine::new());
        let store = Arc::new(MemoryStore::new());

        let playground = Playground::new(PlaygroundId::new("default"), "play.example.com");
        store.playground_put(&playground).await.unwrap();

        let now = chrono::Utc::now();
        let session = Session {
            id: SessionId::generate(),
            playground_id: playground.id.clone(),
            host: "node-1".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(4),
            stack: None,
            stack_name: None,
            image_name: None,
            ready: true,
            teardown_error: None,
        };
        store.session_put(&session).await.unwrap();

        let provisioner = DindProvisioner::new(
            Arc::new(MockEngineFactory(Arc::clone(&engine))),
            Arc::clone(&store),
            Arc::clone(&store),
        )
        .unwrap();

        Fixture {
            engine,
            store,
            provisioner,
            session,
        }
    }

    fn instance_named(session_id: SessionId, hostname: &str) -> Instance {
        Instance {
            name: format!("x_{hostname}"),
            session_id,
            hostname: hostname.to_string(),
            image: "img".to_string(),
            ip: "10.0.0.2".to_string(),
            routable_ip: "10.0.0.2".to_string(),
            proxy_host: String::new(),
            session_host: "node-1".to_string(),
            tls: None,
            lesson_ctx: None,
            windows_id: None,
            kind: String::new(),
            ports: Vec::new(),
            cluster_role: None,
            max_processes: None,
            max_memory_mb: None,
            storage_size: None,
        }
    }

    #[test]
    fn hostname_fills_smallest_gap() {
        // S5: node1 and node3 exist, the next assignment is node2.
        let sid = SessionId::generate();
        let existing = vec![instance_named(sid, "node1"), instance_named(sid, "node3")];
        assert_eq!(next_hostname(&existing), "node2");
        assert_eq!(next_hostname(&[]), "node1");
    }

    #[tokio::test]
    async fn create_uses_playground_default_image() {
        let f = fixture().await;

        let instance = f
            .provisioner
            .instance_new(&f.session, InstanceConfig::default())
            .await
            .unwrap();

        assert_eq!(instance.image, "lessoncraft/dind");
        assert_eq!(instance.hostname, "node1");
        assert_eq!(instance.ip, "10.0.0.2");
        assert!(instance.name.starts_with(&f.session.id.short()));
        assert!(instance.proxy_host.starts_with("ip10-0-0-2-"));

        let opts = f.engine.created_opts(&instance.name).unwrap();
        assert_eq!(opts.networks, vec![f.session.id.to_string()]);
    }

    #[tokio::test]
    async fn explicit_image_beats_lesson_shape() {
        let f = fixture().await;

        let mut lesson = lessoncraft_lesson::Lesson::new("T", "D");
        lesson.default_image = Some("lesson-default:1".to_string());
        let mut step = LessonStep::new("step-a");
        step.content = "c".to_string();
        step.image = Some("step-image:1".to_string());
        lesson.steps.push(step);
        let lesson = f.store.create_lesson(lesson).await.unwrap();

        let config = InstanceConfig {
            image_name: Some("explicit:1".to_string()),
            lesson_ctx: Some(LessonContext {
                lesson_id: lesson.id,
                step_index: 0,
                completed: false,
            }),
            ..InstanceConfig::default()
        };

        let instance = f.provisioner.instance_new(&f.session, config).await.unwrap();
        assert_eq!(instance.image, "explicit:1");
    }

    #[tokio::test]
    async fn primary_container_shapes_instance() {
        let f = fixture().await;

        let mut lesson = lessoncraft_lesson::Lesson::new("T", "D");
        let mut step = LessonStep::new("step-a");
        step.content = "c".to_string();
        step.image = Some("step-image:1".to_string());
        step.resource_limits = ResourceLimits {
            max_processes: Some(500),
            max_memory_mb: Some(256),
            storage_size: None,
        };
        step.containers = vec![ContainerConfig {
            name: "app".to_string(),
            image: "primary:2".to_string(),
            role: "primary".to_string(),
            hostname: "app-host".to_string(),
            envs: vec!["MODE=lesson".to_string()],
            resource_limits: ResourceLimits {
                max_processes: Some(100),
                max_memory_mb: None,
                storage_size: Some("5G".to_string()),
            },
            ..ContainerConfig::default()
        }];
        lesson.steps.push(step);
        let lesson = f.store.create_lesson(lesson).await.unwrap();

        let config = InstanceConfig {
            lesson_ctx: Some(LessonContext {
                lesson_id: lesson.id,
                step_index: 0,
                completed: false,
            }),
            ..InstanceConfig::default()
        };

        let instance = f.provisioner.instance_new(&f.session, config).await.unwrap();
        // Primary container wins over the step image.
        assert_eq!(instance.image, "primary:2");
        assert_eq!(instance.hostname, "app-host");
        // Container limit beats step limit; step fills the gap.
        assert_eq!(instance.max_processes, Some(100));
        assert_eq!(instance.max_memory_mb, Some(256));
        assert_eq!(instance.storage_size.as_deref(), Some("5G"));

        let opts = f.engine.created_opts(&instance.name).unwrap();
        assert!(opts.envs.contains(&"MODE=lesson".to_string()));
    }

    #[tokio::test]
    async fn step_image_used_without_containers() {
        let f = fixture().await;

        let mut lesson = lessoncraft_lesson::Lesson::new("T", "D");
        lesson.default_image = Some("lesson-default:1".to_string());
        let mut step = LessonStep::new("step-a");
        step.content = "c".to_string();
        step.image = Some("step-image:1".to_string());
        lesson.steps.push(step);
        let lesson = f.store.create_lesson(lesson).await.unwrap();

        let config = InstanceConfig {
            lesson_ctx: Some(LessonContext {
                lesson_id: lesson.id,
                step_index: 0,
                completed: false,
            }),
            ..InstanceConfig::default()
        };

        let instance = f.provisioner.instance_new(&f.session, config).await.unwrap();
        assert_eq!(instance.image, "step-image:1");
    }

    #[tokio::test]
    async fn empty_primary_image_falls_to_playground_default() {
        let f = fixture().await;

        let mut lesson = lessoncraft_lesson::Lesson::new("T", "D");
        lesson.default_image = Some("lesson-default:1".to_string());
        let mut step = LessonStep::new("step-a");
        step.content = "c".to_string();
        step.image = Some("step-image:1".to_string());
        step.containers = vec![ContainerConfig {
            name: "app".to_string(),
            image: String::new(),
            role: "primary".to_string(),
            ..ContainerConfig::default()
        }];
        lesson.steps.push(step);
        let lesson = f.store.create_lesson(lesson).await.unwrap();

        let config = InstanceConfig {
            lesson_ctx: Some(LessonContext {
                lesson_id: lesson.id,
                step_index: 0,
                completed: false,
            }),
            ..InstanceConfig::default()
        };

        // A step with containers never falls back to the step image or
        // lesson default, only to the playground default.
        let instance = f.provisioner.instance_new(&f.session, config).await.unwrap();
        assert_eq!(instance.image, "lessoncraft/dind");
    }

    #[tokio::test]
    async fn failed_ip_lookup_compensates_with_delete() {
        let f = fixture().await;
        *f.engine.fail_ip_lookup.lock() = true;

        let result = f
            .provisioner
            .instance_new(&f.session, InstanceConfig::default())
            .await;

        assert!(result.is_err());
        // The half-created container was removed.
        assert_eq!(f.engine.container_count(), 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let f = fixture().await;
        let instance = f
            .provisioner
            .instance_new(&f.session, InstanceConfig::default())
            .await
            .unwrap();

        f.provisioner
            .instance_delete(&f.session, &instance)
            .await
            .unwrap();
        // Second delete hits "no such container" and still succeeds.
        f.provisioner
            .instance_delete(&f.session, &instance)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn extra_networks_gated_by_playground() {
        let f = fixture().await;

        let config = InstanceConfig {
            networks: vec!["shared-net".to_string()],
            ..InstanceConfig::default()
        };
        let instance = f.provisioner.instance_new(&f.session, config).await.unwrap();
        let opts = f.engine.created_opts(&instance.name).unwrap();
        assert_eq!(opts.networks.len(), 1);

        // Allow extra networks and retry.
        let mut playground = f
            .store
            .playground_get(&f.session.playground_id)
            .await
            .unwrap()
            .unwrap();
        playground.allow_extra_networks = true;
        f.store.playground_put(&playground).await.unwrap();

        let config = InstanceConfig {
            networks: vec!["shared-net".to_string()],
            ..InstanceConfig::default()
        };
        let instance = f.provisioner.instance_new(&f.session, config).await.unwrap();
        let opts = f.engine.created_opts(&instance.name).unwrap();
        assert!(opts.networks.contains(&"shared-net".to_string()));
    }

    #[tokio::test]
    async fn relative_upload_resolves_cwd() {
        let f = fixture().await;
        let instance = f
            .provisioner
            .instance_new(&f.session, InstanceConfig::default())
            .await
            .unwrap();

        f.engine
            .exec_output
            .lock()
            .insert("bash".to_string(), (0, "1234: /home/learner\n".to_string()));

        f.provisioner
            .instance_upload(
                &instance,
                "notes.txt",
                "workdir",
                Bytes::from_static(b"hello"),
            )
            .await
            .unwrap();

        let uploads = f.engine.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "/home/learner/workdir");
        assert_eq!(uploads[0].2, "notes.txt");
    }

    #[tokio::test]
    async fn absolute_upload_skips_cwd_lookup() {
        let f = fixture().await;
        let instance = f
            .provisioner
            .instance_new(&f.session, InstanceConfig::default())
            .await
            .unwrap();

        f.provisioner
            .instance_upload(&instance, "notes.txt", "/tmp", Bytes::from_static(b"hi"))
            .await
            .unwrap();

        let uploads = f.engine.uploads();
        assert_eq!(uploads[0].1, "/tmp");
        // No cwd exec ran.
        assert!(f.engine.execs().is_empty());
    }

    #[tokio::test]
    async fn fs_tree_parses_json() {
        let f = fixture().await;
        let instance = f
            .provisioner
            .instance_new(&f.session, InstanceConfig::default())
            .await
            .unwrap();

        f.engine.exec_output.lock().insert(
            "bash".to_string(),
            (0, r#"[{"type":"directory","name":"/home/learner"}]"#.to_string()),
        );

        let tree = f.provisioner.instance_fs_tree(&instance).await.unwrap();
        assert!(tree.is_array());
    }
}
