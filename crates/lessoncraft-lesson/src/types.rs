//! Lesson document types.
//!
//! These mirror the persisted lesson document: a lesson owns ordered steps,
//! each step optionally carries commands, an expected output, a question,
//! and per-step container or resource overrides.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lessoncraft_core::LessonId;
use serde::{Deserialize, Serialize};

/// The default timeout assigned to parsed steps.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Resource caps applied to a sandbox container.
///
/// Unset fields fall through the precedence chain
/// (container → step → lesson default → playground default).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<i64>,
    /// Maximum memory in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<i64>,
    /// Maximum storage size, e.g. `"10G"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

impl ResourceLimits {
    /// Fill unset fields from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        Self {
            max_processes: self.max_processes.or(fallback.max_processes),
            max_memory_mb: self.max_memory_mb.or(fallback.max_memory_mb),
            storage_size: self.storage_size.or_else(|| fallback.storage_size.clone()),
        }
    }
}

/// One container in a multi-container step environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Unique name within the step.
    pub name: String,
    /// Image to run.
    pub image: String,
    /// Purpose of the container, e.g. `"primary"`, `"database"`.
    #[serde(default)]
    pub role: String,
    /// Hostname to assign.
    #[serde(default)]
    pub hostname: String,
    /// Ports to expose.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Environment variables (`KEY=value`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
    /// Additional networks to attach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Container-level resource caps.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
}

/// One ordered unit of a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonStep {
    /// Unique ID within the lesson.
    pub id: String,
    /// Markdown content shown to the learner.
    #[serde(default)]
    pub content: String,
    /// Shell commands runnable in the sandbox.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Expected output for validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Optional question shown to the learner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Step-specific image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Maximum duration allowed for the step.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Step-level resource caps.
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// Multi-container environment; empty means single container from
    /// `image` / lesson defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerConfig>,
}

const fn default_timeout() -> Duration {
    DEFAULT_STEP_TIMEOUT
}

impl LessonStep {
    /// A fresh step with the default timeout.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: String::new(),
            commands: Vec::new(),
            expected: None,
            question: None,
            image: None,
            timeout: DEFAULT_STEP_TIMEOUT,
            resource_limits: ResourceLimits::default(),
            containers: Vec::new(),
        }
    }

    /// The primary container: the one with `role == "primary"`, else the
    /// first configured container.
    #[must_use]
    pub fn primary_container(&self) -> Option<&ContainerConfig> {
        self.containers
            .iter()
            .find(|c| c.role == "primary")
            .or_else(|| self.containers.first())
    }

    /// Whether the step is still accepting commands during parsing: a step
    /// is closed once it carries an expectation or a question.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.expected.is_none() && self.question.is_none()
    }
}

/// Metadata about one historical version of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Version number (monotonic, starts at 1).
    pub version: u32,
    /// When this version was superseded.
    pub timestamp: DateTime<Utc>,
    /// Description of the changes in the *following* update.
    pub change_summary: String,
}

/// A complete lesson document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    /// Unique lesson ID. Assigned by the store on create; a fresh one is
    /// generated when a submitted document omits it.
    #[serde(default = "LessonId::generate")]
    pub id: LessonId,
    /// Lesson title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Primary category, e.g. `"Docker"`.
    #[serde(default)]
    pub category: String,
    /// Tags for filtering and search.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Difficulty label, e.g. `"Beginner"`.
    #[serde(default)]
    pub difficulty: String,
    /// Estimated completion time in minutes.
    #[serde(default)]
    pub estimated_time_minutes: u32,
    /// Default image for all steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
    /// Default resource caps for all steps.
    #[serde(default)]
    pub default_resource_limits: ResourceLimits,
    /// Ordered steps.
    pub steps: Vec<LessonStep>,
    /// Current version number.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Prior versions, oldest first.
    #[serde(default)]
    pub version_history: Vec<VersionInfo>,
    /// Creation timestamp. Assigned by the store on create.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update timestamp. Maintained by the store.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Index of the learner's current step.
    #[serde(default)]
    pub current_step: usize,
}

const fn default_version() -> u32 {
    1
}

impl Lesson {
    /// An empty lesson shell with a fresh ID and current timestamps.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: LessonId::generate(),
            title: title.into(),
            description: description.into(),
            category: String::new(),
            tags: Vec::new(),
            difficulty: String::new(),
            estimated_time_minutes: 0,
            default_image: None,
            default_resource_limits: ResourceLimits::default(),
            steps: Vec::new(),
            version: 1,
            version_history: Vec::new(),
            created_at: now,
            updated_at: now,
            current_step: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_limits_fallthrough() {
        let specific = ResourceLimits {
            max_processes: Some(100),
            max_memory_mb: None,
            storage_size: None,
        };
        let fallback = ResourceLimits {
            max_processes: Some(1000),
            max_memory_mb: Some(512),
            storage_size: Some("10G".to_string()),
        };

        let merged = specific.or(&fallback);
        assert_eq!(merged.max_processes, Some(100));
        assert_eq!(merged.max_memory_mb, Some(512));
        assert_eq!(merged.storage_size.as_deref(), Some("10G"));
    }

    #[test]
    fn primary_container_prefers_role() {
        let mut step = LessonStep::new("step-a");
        step.containers = vec![
            ContainerConfig {
                name: "db".to_string(),
                image: "postgres:16".to_string(),
                role: "database".to_string(),
                ..ContainerConfig::default()
            },
            ContainerConfig {
                name: "app".to_string(),
                image: "alpine:3".to_string(),
                role: "primary".to_string(),
                ..ContainerConfig::default()
            },
        ];

        assert_eq!(step.primary_container().unwrap().name, "app");
    }

    #[test]
    fn primary_container_falls_back_to_first() {
        let mut step = LessonStep::new("step-a");
        step.containers = vec![ContainerConfig {
            name: "only".to_string(),
            image: "alpine:3".to_string(),
            ..ContainerConfig::default()
        }];

        assert_eq!(step.primary_container().unwrap().name, "only");
    }

    #[test]
    fn step_open_until_expected_or_question() {
        let mut step = LessonStep::new("step-a");
        assert!(step.is_open());

        step.expected = Some("hi".to_string());
        assert!(!step.is_open());

        let mut step = LessonStep::new("step-b");
        step.question = Some("why?".to_string());
        assert!(!step.is_open());
    }

    #[test]
    fn lesson_json_roundtrip() {
        let mut lesson = Lesson::new("T", "D");
        lesson.steps.push(LessonStep::new("step-a"));

        let json = serde_json::to_string(&lesson).unwrap();
        let parsed: Lesson = serde_json::from_str(&json).unwrap();
        assert_eq!(lesson, parsed);
    }
}
