//! Memory/CPU sampling per instance.
//!
//! Linux instances are sampled through the container engine's stats
//! stream; Windows instances call the machine agent's HTTP endpoint. A
//! failed probe publishes a degraded row so consumers always render one
//! row per instance, then returns the error for logging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lessoncraft_events::{EventBus, EventPayload, InstanceStats};
use lessoncraft_resilience::{BreakerOptions, GuardedHttpClient};
use lessoncraft_store::{Instance, Store};
use tracing::warn;

use super::{format_bytes, EngineLookup};
use crate::error::{Result, SchedulerError};
use crate::Task;

/// Port of the Windows agent's stats endpoint.
const AGENT_PORT: u16 = 222;

/// The `CollectStats` sweep task.
pub struct CollectStats<S> {
    lookup: EngineLookup<S>,
    events: Arc<EventBus>,
    agent: GuardedHttpClient,
}

impl<S: Store> CollectStats<S> {
    /// Create the task.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent HTTP client cannot be constructed.
    pub fn new(
        engines: Arc<dyn lessoncraft_provision::EngineFactory>,
        store: Arc<S>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let agent = GuardedHttpClient::with_timeout(
            Duration::from_secs(5),
            BreakerOptions {
                name: "stats-collector".to_string(),
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(10),
                half_open_success_threshold: 1,
                on_state_change: None,
            },
        )
        .map_err(|e| SchedulerError::Agent(e.to_string()))?;

        Ok(Self {
            lookup: EngineLookup::new(engines, store),
            events,
            agent,
        })
    }

    fn publish(&self, instance: &Instance, stats: InstanceStats) {
        self.events.emit(
            instance.session_id.to_string(),
            EventPayload::InstanceStats(stats),
        );
    }

    fn publish_degraded(&self, instance: &Instance) {
        self.publish(instance, InstanceStats::degraded(&instance.name));
    }

    async fn windows_stats(&self, instance: &Instance) -> Result<InstanceStats> {
        let url = format!("http://{}:{AGENT_PORT}/stats", instance.ip);
        let response = self
            .agent
            .get(&url)
            .await
            .map_err(|e| SchedulerError::Agent(e.to_string()))?;

        let info: HashMap<String, f64> = response
            .json()
            .await
            .map_err(|e| SchedulerError::Malformed(e.to_string()))?;

        let mem_used = *info.get("mem_used").unwrap_or(&0.0);
        let mem_total = *info.get("mem_total").unwrap_or(&0.0);
        let cpu = *info.get("cpu").unwrap_or(&0.0);
        let mem_percent = if mem_total > 0.0 {
            (mem_used / mem_total) * 100.0
        } else {
            0.0
        };

        Ok(InstanceStats {
            instance: instance.name.clone(),
            mem: format!(
                "{mem_percent:.2}% ({} / {})",
                format_bytes(mem_used),
                format_bytes(mem_total)
            ),
            cpu: format!("{:.2}%", cpu * 100.0),
        })
    }

    async fn engine_stats(&self, instance: &Instance) -> Result<InstanceStats> {
        let engine = self.lookup.engine_for(instance).await?;
        let sample = engine.stats_sample(&instance.name).await?;

        let mem_percent = if sample.mem_limit > 0.0 {
            (sample.mem_usage / sample.mem_limit) * 100.0
        } else {
            0.0
        };

        Ok(InstanceStats {
            instance: instance.name.clone(),
            mem: format!(
                "{mem_percent:.2}% ({} / {})",
                format_bytes(sample.mem_usage),
                format_bytes(sample.mem_limit)
            ),
            cpu: format!("{:.2}%", sample.cpu_percent),
        })
    }
}

#[async_trait]
impl<S: Store + 'static> Task for CollectStats<S> {
    fn name(&self) -> &'static str {
        "CollectStats"
    }

    async fn run(&self, instance: &Instance) -> Result<()> {
        let result = if instance.kind == "windows" {
            self.windows_stats(instance).await
        } else {
            self.engine_stats(instance).await
        };

        match result {
            Ok(stats) => {
                self.publish(instance, stats);
                Ok(())
            }
            Err(e) => {
                warn!(instance = %instance.name, error = %e, "stats collection failed");
                self.publish_degraded(instance);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessoncraft_core::{PlaygroundId, SessionId};
    use lessoncraft_events::EventKind;
    use lessoncraft_provision::engine::mock::MockEngine;
    use lessoncraft_provision::factory::mock::MockEngineFactory;
    use lessoncraft_store::{MemoryStore, Session};
    use parking_lot::Mutex;

    fn instance(session_id: SessionId) -> Instance {
        Instance {
            name: "abc_x1".to_string(),
            session_id,
            hostname: "node1".to_string(),
            image: "lessoncraft/dind".to_string(),
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

    async fn seeded_store() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let now = chrono::Utc::now();
        let session = Session {
            id: SessionId::generate(),
            playground_id: PlaygroundId::new("default"),
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
        (store, session)
    }

    fn capture_stats(events: &EventBus) -> Arc<Mutex<Vec<InstanceStats>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.on(EventKind::InstanceStats, move |event| {
            if let EventPayload::InstanceStats(stats) = &event.payload {
                sink.lock().push(stats.clone());
            }
        });
        seen
    }

    #[tokio::test]
    async fn publishes_formatted_sample() {
        let (store, session) = seeded_store().await;
        let events = Arc::new(EventBus::new());
        let seen = capture_stats(&events);

        let task = CollectStats::new(
            Arc::new(MockEngineFactory(Arc::new(MockEngine::new()) as _)),
            store,
            Arc::clone(&events),
        )
        .unwrap();

        task.run(&instance(session.id)).await.unwrap();

        let rows = seen.lock();
        assert_eq!(rows.len(), 1);
        // Mock engine reports 64MiB of 512MiB.
        assert_eq!(rows[0].mem, "12.50% (64.0MiB / 512.0MiB)");
        assert_eq!(rows[0].cpu, "3.50%");
    }

    #[tokio::test]
    async fn failure_publishes_degraded_row() {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::new());
        let seen = capture_stats(&events);

        let task = CollectStats::new(
            Arc::new(MockEngineFactory(Arc::new(MockEngine::new()) as _)),
            store,
            Arc::clone(&events),
        )
        .unwrap();

        // Session missing from storage: the probe fails but still
        // publishes a row.
        let result = task.run(&instance(SessionId::generate())).await;
        assert!(result.is_err());

        let rows = seen.lock();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mem, "N/A (stats collection failed)");
        assert_eq!(rows[0].cpu, "N/A (stats collection failed)");
    }
}
