//! Instance creation configuration.

use lessoncraft_store::{LessonContext, TlsMaterial};

/// Parameters for creating one instance.
///
/// Most fields are optional; the provisioner resolves the effective image,
/// hostname, and resource caps through the precedence chain (explicit
/// config → lesson step containers → step → lesson defaults → playground
/// defaults).
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    /// Explicit image; highest precedence.
    pub image_name: Option<String>,
    /// Run privileged.
    pub privileged: bool,
    /// Explicit hostname; assigned as the lowest free `nodeN` when unset.
    pub hostname: Option<String>,
    /// TLS material to mount.
    pub tls: Option<TlsMaterial>,
    /// AppArmor profile applied to the container.
    pub apparmor_profile: Option<String>,
    /// Playground FQDN for proxy-host encoding.
    pub playground_fqdn: String,
    /// Backend type tag (`"windows"` selects the Windows pool).
    pub kind: String,
    /// Size of the DinD graph-storage volume.
    pub dind_volume_size: Option<String>,
    /// Environment variables (`KEY=value`).
    pub envs: Vec<String>,
    /// Extra networks (honored only when the playground allows them).
    pub networks: Vec<String>,
    /// Lesson pointer shaping image and resource selection.
    pub lesson_ctx: Option<LessonContext>,
    /// Maximum number of processes.
    pub max_processes: Option<i64>,
    /// Maximum memory in megabytes.
    pub max_memory_mb: Option<i64>,
    /// Maximum storage size.
    pub storage_size: Option<String>,
}
