//! Orchestrator configuration.

use std::time::Duration;

/// Tunables for the orchestration service.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum 1-minute load average under which new sessions are admitted.
    pub max_load_avg: f64,
    /// Deadline for a single provisioning call.
    pub provision_timeout: Duration,
    /// Default session duration when the playground does not specify one.
    pub default_session_duration: Duration,
    /// AppArmor profile applied to sandbox containers.
    pub apparmor_profile: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_load_avg: 100.0,
            provision_timeout: Duration::from_secs(60),
            default_session_duration: Duration::from_secs(4 * 3600),
            apparmor_profile: None,
        }
    }
}
