//! Domain types stored in the database.
//!
//! These types represent the persisted state of playgrounds, sessions,
//! instances, users, and login requests. Lessons live in
//! `lessoncraft-lesson`; this crate stores them as-is.

use std::time::Duration;

use chrono::{DateTime, Utc};
use lessoncraft_core::{LessonId, PlaygroundId, SessionId, UserId};
use lessoncraft_lesson::SafetyPolicy;
use serde::{Deserialize, Serialize};

/// Tenant-scoped configuration and defaults.
///
/// Playgrounds are created at startup or by an admin and are never
/// destroyed. `domain` is unique across playgrounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playground {
    /// Unique identifier.
    pub id: PlaygroundId,
    /// Unique domain serving this playground.
    pub domain: String,
    /// Default session duration.
    pub default_duration: Duration,
    /// Whether sandboxes run privileged.
    pub privileged: bool,
    /// Image used when nothing more specific applies.
    pub default_dind_instance_image: String,
    /// Images learners may select.
    pub available_dind_instance_images: Vec<String>,
    /// Whether Windows instances may be requested.
    pub allow_windows_instances: bool,
    /// Where to send users after login.
    pub default_login_redirect: String,
    /// Whether instances may join networks beyond the session overlay.
    pub allow_extra_networks: bool,
    /// Command-safety policy for lessons in this playground.
    #[serde(default)]
    pub safety_policy: SafetyPolicy,
}

/// A TTL-bounded workspace owning a set of instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Owning playground.
    pub playground_id: PlaygroundId,
    /// Node that owns this session's network.
    pub host: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp (`created_at + playground.default_duration` unless
    /// overridden).
    pub expires_at: DateTime<Utc>,
    /// Optional Compose stack to deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Name for the deployed stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,
    /// Image override for stack instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    /// Whether the session (and any stack) is ready for clients.
    pub ready: bool,
    /// Set when a close attempt failed to tear down an instance, so the
    /// scheduler can retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

/// Transient per-instance lesson pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContext {
    /// The lesson being followed.
    pub lesson_id: LessonId,
    /// Zero-based current step.
    pub step_index: usize,
    /// Whether the lesson has been completed.
    pub completed: bool,
}

/// TLS material mounted into an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    /// Server certificate (PEM).
    pub server_cert: Vec<u8>,
    /// Server key (PEM).
    pub server_key: Vec<u8>,
    /// CA certificate (PEM).
    pub ca_cert: Vec<u8>,
    /// Client certificate (PEM).
    pub cert: Vec<u8>,
    /// Client key (PEM).
    pub key: Vec<u8>,
}

/// Which role an instance plays in a cluster, when it is part of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterRole {
    /// Swarm or Kubernetes control-plane node.
    Manager,
    /// Worker node.
    Worker,
}

/// A running sandbox container within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Container name, unique within the orchestrator
    /// (`{session_short}_{generated}`).
    pub name: String,
    /// Owning session.
    pub session_id: SessionId,
    /// Hostname, unique within the session (`nodeN`).
    pub hostname: String,
    /// Image the instance runs.
    pub image: String,
    /// IP on the session network.
    pub ip: String,
    /// IP the reverse proxy routes to.
    pub routable_ip: String,
    /// Encoded externally-routable hostname.
    pub proxy_host: String,
    /// Node that owns the session's network.
    pub session_host: String,
    /// TLS material, when TLS is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsMaterial>,
    /// Lesson pointer, when the instance backs a lesson.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_ctx: Option<LessonContext>,
    /// Windows pool lease ID, for Windows instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_id: Option<String>,
    /// Backend type tag (`"windows"` or empty for DinD).
    #[serde(default)]
    pub kind: String,
    /// Exposed ports, maintained by the port sweeper.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Cluster role, maintained by the swarm/k8s sweepers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_role: Option<ClusterRole>,
    /// Maximum number of processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<i64>,
    /// Maximum memory in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<i64>,
    /// Maximum storage size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

/// An identity record synced at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (`{provider}-{subject}`).
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Avatar URL.
    pub avatar: String,
    /// OAuth provider name.
    pub provider: String,
    /// Provider-assigned subject.
    pub provider_user_id: String,
}

/// A transient nonce created when a login starts and consumed exactly once
/// on the OAuth callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Request nonce.
    pub id: String,
    /// Provider the login was initiated with.
    pub provider: String,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

/// A slot in the pre-provisioned Windows instance pool.
///
/// A lease with no session is available; acquiring binds it to a session,
/// releasing unbinds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsLease {
    /// Pool slot ID (the machine identifier).
    pub id: String,
    /// Address of the machine's agent endpoint.
    pub ip: String,
    /// Session currently holding the slot, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Playground {
    /// A playground with sensible defaults for the given id/domain.
    #[must_use]
    pub fn new(id: PlaygroundId, domain: impl Into<String>) -> Self {
        Self {
            id,
            domain: domain.into(),
            default_duration: Duration::from_secs(4 * 3600),
            privileged: true,
            default_dind_instance_image: "lessoncraft/dind".to_string(),
            available_dind_instance_images: vec!["lessoncraft/dind".to_string()],
            allow_windows_instances: false,
            default_login_redirect: "/".to_string(),
            allow_extra_networks: false,
            safety_policy: SafetyPolicy::default(),
        }
    }
}

impl Session {
    /// Whether the session has passed its expiry time.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
