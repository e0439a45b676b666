//! The sweep supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::Store;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::Task;

/// Supervisor tunables.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Sweep interval.
    pub interval: Duration,
    /// Per-probe deadline.
    pub task_timeout: Duration,
    /// Maximum concurrently running probes.
    pub max_concurrent: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            task_timeout: Duration::from_secs(5),
            max_concurrent: 16,
        }
    }
}

/// Periodic sweeper over all sessions and instances.
///
/// One tick: retire expired sessions through the orchestrator, then fan
/// the registered tasks out over every remaining instance through a
/// bounded pool. An overrunning sweep causes the next tick to be skipped
/// rather than queued.
pub struct Supervisor<S, F> {
    store: Arc<S>,
    fabric: Arc<F>,
    tasks: Vec<Arc<dyn Task>>,
    semaphore: Arc<Semaphore>,
    config: SupervisorConfig,
}

impl<S: Store + 'static, F: SessionFabric + 'static> Supervisor<S, F> {
    /// Create a supervisor with an ordered task registry.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        fabric: Arc<F>,
        tasks: Vec<Arc<dyn Task>>,
        config: SupervisorConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            store,
            fabric,
            tasks,
            semaphore,
            config,
        }
    }

    /// Registered task names, in dispatch order.
    #[must_use]
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Run sweeps until the process exits. Spawn this on its own task.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        // Back-pressure: an overrunning sweep skips the missed tick
        // instead of bursting to catch up.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_s = self.config.interval.as_secs(),
            tasks = ?self.task_names(),
            "sweep supervisor started"
        );

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Run one full sweep.
    pub async fn tick(&self) {
        let sessions = match self.store.sessions_all().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "sweep could not list sessions");
                return;
            }
        };

        let now = Utc::now();
        let mut join_set = JoinSet::new();

        for session in sessions {
            if session.is_expired(now) {
                info!(session_id = %session.id, "session expired, closing");
                if let Err(e) = self.fabric.session_close(&session.id).await {
                    error!(session_id = %session.id, error = %e, "expiry close failed");
                }
                continue;
            }

            let instances = match self.store.instances_by_session(&session.id).await {
                Ok(instances) => instances,
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "sweep could not list instances");
                    continue;
                }
            };

            for instance in instances {
                for task in &self.tasks {
                    // Skip rather than queue when the pool is saturated.
                    let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                        warn!(
                            task = task.name(),
                            instance = %instance.name,
                            "probe pool saturated, skipping"
                        );
                        continue;
                    };

                    let task = Arc::clone(task);
                    let instance = instance.clone();
                    let timeout = self.config.task_timeout;
                    join_set.spawn(async move {
                        let _permit = permit;
                        let name = task.name();
                        match tokio::time::timeout(timeout, task.run(&instance)).await {
                            Ok(Ok(())) => {
                                debug!(task = name, instance = %instance.name, "probe ok");
                            }
                            Ok(Err(e)) => {
                                warn!(task = name, instance = %instance.name, error = %e, "probe failed");
                            }
                            Err(_) => {
                                warn!(task = name, instance = %instance.name, "probe timed out");
                            }
                        }
                    });
                }
            }
        }

        while join_set.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lessoncraft_core::PlaygroundId;
    use lessoncraft_events::EventBus;
    use lessoncraft_orchestrator::{
        FabricService, FixedLoad, OrchestratorConfig, SessionConfig,
    };
    use lessoncraft_provision::engine::mock::MockEngine;
    use lessoncraft_provision::factory::mock::MockEngineFactory;
    use lessoncraft_provision::{
        DindProvisioner, InstanceConfig, ProvisionerFactory,
    };
    use lessoncraft_store::{MemoryStore, Playground};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        runs: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Task for CountingTask {
        fn name(&self) -> &'static str {
            "Counting"
        }

        async fn run(&self, instance: &lessoncraft_store::Instance) -> crate::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(instance.name.clone());
            Ok(())
        }
    }

    struct SlowTask;

    #[async_trait]
    impl Task for SlowTask {
        fn name(&self) -> &'static str {
            "Slow"
        }

        async fn run(&self, _instance: &lessoncraft_store::Instance) -> crate::Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        fabric: Arc<FabricService<MemoryStore>>,
        playground: Playground,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(MockEngine::new());
        let playground = Playground::new(PlaygroundId::new("default"), "play.example.com");
        store.playground_put(&playground).await.unwrap();

        let dind = DindProvisioner::new(
            Arc::new(MockEngineFactory(engine as _)),
            Arc::clone(&store),
            Arc::clone(&store),
        )
        .unwrap();
        let fabric = Arc::new(FabricService::new(
            Arc::clone(&store),
            Arc::new(EventBus::new()),
            ProvisionerFactory::new(Arc::new(dind), None),
            Box::new(FixedLoad(0.0)),
            OrchestratorConfig::default(),
        ));

        Fixture {
            store,
            fabric,
            playground,
        }
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
    async fn tick_runs_tasks_per_instance() {
        let f = fixture().await;
        let session = f
            .fabric
            .session_new(session_config(&f.playground))
            .await
            .unwrap();
        f.fabric
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();
        f.fabric
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let supervisor = Supervisor::new(
            Arc::clone(&f.store),
            Arc::clone(&f.fabric),
            vec![Arc::new(CountingTask {
                runs: Arc::clone(&runs),
                seen: Arc::clone(&seen),
            })],
            SupervisorConfig::default(),
        );

        supervisor.tick().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn expired_sessions_are_closed() {
        let f = fixture().await;
        let session = f
            .fabric
            .session_new(SessionConfig {
                duration: Some(Duration::from_millis(1)),
                ..session_config(&f.playground)
            })
            .await
            .unwrap();
        f.fabric
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        let supervisor = Supervisor::new(
            Arc::clone(&f.store),
            Arc::clone(&f.fabric),
            Vec::new(),
            SupervisorConfig::default(),
        );
        supervisor.tick().await;

        // No session survives past its TTL.
        assert!(f.store.session_get(&session.id).await.unwrap().is_none());
        assert_eq!(f.store.instance_count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probes_are_cut_off_at_the_deadline() {
        let f = fixture().await;
        let session = f
            .fabric
            .session_new(session_config(&f.playground))
            .await
            .unwrap();
        f.fabric
            .instance_new(&session.id, InstanceConfig::default())
            .await
            .unwrap();

        let supervisor = Supervisor::new(
            Arc::clone(&f.store),
            Arc::clone(&f.fabric),
            vec![Arc::new(SlowTask)],
            SupervisorConfig {
                task_timeout: Duration::from_millis(50),
                ..SupervisorConfig::default()
            },
        );

        // Completes despite the 60s task body: the deadline cuts it off.
        supervisor.tick().await;
    }

    #[tokio::test]
    async fn task_registry_keeps_order() {
        let f = fixture().await;
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let supervisor = Supervisor::new(
            Arc::clone(&f.store),
            Arc::clone(&f.fabric),
            vec![
                Arc::new(CountingTask {
                    runs: Arc::clone(&runs),
                    seen: Arc::clone(&seen),
                }),
                Arc::new(SlowTask),
            ],
            SupervisorConfig::default(),
        );
        assert_eq!(supervisor.task_names(), vec!["Counting", "Slow"]);
    }
}
