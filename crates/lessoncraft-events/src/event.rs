//! Event kinds and their typed payloads.

use serde::{Deserialize, Serialize};

/// The kind tag of an event, used for subscription filtering and the wire
/// format `{kind, id, ...}` consumed by external observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A session was created.
    SessionNew,
    /// A session's stack finished building and the session is usable.
    SessionReady,
    /// A session was closed or expired.
    SessionEnd,
    /// A line of stack-builder output.
    SessionBuilderOut,
    /// An instance was created inside a session.
    InstanceNew,
    /// An instance was deleted.
    InstanceDelete,
    /// A stats sample for an instance.
    InstanceStats,
    /// The session's effective terminal viewport changed.
    InstanceViewportResize,
    /// A learner started a lesson.
    LessonStart,
    /// A learner completed a lesson step.
    LessonStepComplete,
    /// A lesson command was executed in an instance.
    LessonCommandExecute,
    /// A step output was checked against its expectation.
    LessonValidate,
    /// A playground was created.
    PlaygroundNew,
}

/// A memory/CPU sample for one instance.
///
/// When collection fails the fields carry a degraded placeholder instead of
/// being omitted, so consumers always render a row per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    /// Instance (container) name.
    pub instance: String,
    /// Formatted memory usage, e.g. `"12.50% (64MiB / 512MiB)"`.
    pub mem: String,
    /// Formatted CPU usage, e.g. `"3.20%"`.
    pub cpu: String,
}

impl InstanceStats {
    /// The placeholder row published when a probe fails.
    #[must_use]
    pub fn degraded(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            mem: "N/A (stats collection failed)".to_string(),
            cpu: "N/A (stats collection failed)".to_string(),
        }
    }
}

/// Typed payload for each event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A session was created.
    SessionNew,
    /// A session became ready.
    SessionReady,
    /// A session ended.
    SessionEnd,
    /// One line of builder output.
    SessionBuilderOut {
        /// The raw output line.
        line: String,
    },
    /// An instance was created.
    InstanceNew {
        /// Container name.
        name: String,
        /// Hostname within the session.
        hostname: String,
        /// Externally-routable proxy hostname.
        proxy_host: String,
    },
    /// An instance was deleted.
    InstanceDelete {
        /// Container name.
        name: String,
    },
    /// A stats sample.
    InstanceStats(InstanceStats),
    /// The session viewport changed.
    InstanceViewportResize {
        /// Terminal columns.
        cols: u32,
        /// Terminal rows.
        rows: u32,
    },
    /// A lesson started.
    LessonStart {
        /// The lesson.
        lesson_id: String,
    },
    /// A lesson step completed.
    LessonStepComplete {
        /// The lesson.
        lesson_id: String,
        /// Zero-based step index.
        step_index: usize,
    },
    /// A lesson command was executed.
    LessonCommandExecute {
        /// The lesson.
        lesson_id: String,
        /// Zero-based step index.
        step_index: usize,
        /// The command that ran.
        command: String,
    },
    /// A step output was checked.
    LessonValidate {
        /// The lesson.
        lesson_id: String,
        /// Zero-based step index.
        step_index: usize,
        /// Whether the output matched.
        valid: bool,
    },
    /// A playground was created.
    PlaygroundNew,
}

impl EventPayload {
    /// The kind tag for this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::SessionNew => EventKind::SessionNew,
            Self::SessionReady => EventKind::SessionReady,
            Self::SessionEnd => EventKind::SessionEnd,
            Self::SessionBuilderOut { .. } => EventKind::SessionBuilderOut,
            Self::InstanceNew { .. } => EventKind::InstanceNew,
            Self::InstanceDelete { .. } => EventKind::InstanceDelete,
            Self::InstanceStats(_) => EventKind::InstanceStats,
            Self::InstanceViewportResize { .. } => EventKind::InstanceViewportResize,
            Self::LessonStart { .. } => EventKind::LessonStart,
            Self::LessonStepComplete { .. } => EventKind::LessonStepComplete,
            Self::LessonCommandExecute { .. } => EventKind::LessonCommandExecute,
            Self::LessonValidate { .. } => EventKind::LessonValidate,
            Self::PlaygroundNew => EventKind::PlaygroundNew,
        }
    }
}

/// A published event: the owning entity ID (session or playground) plus
/// the typed payload. The wire form is `{kind, id, ...}`; the kind tag
/// comes from the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Session or playground ID the event belongs to.
    pub id: String,
    /// The typed payload, flattened with its `kind` tag.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// The kind tag of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_matches() {
        assert_eq!(EventPayload::SessionNew.kind(), EventKind::SessionNew);
        assert_eq!(
            EventPayload::InstanceStats(InstanceStats::degraded("node1")).kind(),
            EventKind::InstanceStats
        );
        assert_eq!(
            EventPayload::LessonValidate {
                lesson_id: "l1".to_string(),
                step_index: 0,
                valid: true,
            }
            .kind(),
            EventKind::LessonValidate
        );
    }

    #[test]
    fn degraded_stats_placeholder() {
        let stats = InstanceStats::degraded("node2");
        assert_eq!(stats.mem, "N/A (stats collection failed)");
        assert_eq!(stats.cpu, "N/A (stats collection failed)");
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = Event {
            id: "s1".to_string(),
            payload: EventPayload::SessionBuilderOut {
                line: "Pulling image...".to_string(),
            },
        };
        assert_eq!(event.kind(), EventKind::SessionBuilderOut);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "session_builder_out");
        assert_eq!(json["id"], "s1");
        assert_eq!(json["line"], "Pulling image...");
    }
}
