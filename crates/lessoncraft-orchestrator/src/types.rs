//! Orchestrator request and client types.

use std::time::Duration;

use lessoncraft_core::{ClientId, PlaygroundId, SessionId};
use serde::{Deserialize, Serialize};

/// Terminal geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPort {
    /// Columns.
    pub cols: u32,
    /// Rows.
    pub rows: u32,
}

impl ViewPort {
    /// The component-wise minimum of two viewports.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self {
            cols: self.cols.min(other.cols),
            rows: self.rows.min(other.rows),
        }
    }
}

/// A browser attachment to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier.
    pub id: ClientId,
    /// The session the client watches.
    pub session_id: SessionId,
    /// The client's terminal geometry, once reported.
    pub viewport: Option<ViewPort>,
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Owning playground.
    pub playground_id: PlaygroundId,
    /// Node that will own the session's network.
    pub host: String,
    /// Override of the playground's default duration.
    pub duration: Option<Duration>,
    /// Compose stack to deploy once the session exists.
    pub stack: Option<String>,
    /// Name for the deployed stack.
    pub stack_name: Option<String>,
    /// Image for the stack's builder instance.
    pub image_name: Option<String>,
}

/// Profile returned by an OAuth provider, used to complete a login.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Provider-assigned subject.
    pub provider_user_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: String,
}

/// One instance described by a setup manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupInstance {
    /// Image to run; playground default when unset.
    #[serde(default)]
    pub image: Option<String>,
    /// Hostname; assigned as `nodeN` when unset.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Backend type tag.
    #[serde(default)]
    pub kind: String,
}

/// Declarative multi-instance session setup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSetupConf {
    /// Instances to create, in order.
    #[serde(default)]
    pub instances: Vec<SetupInstance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_min_is_componentwise() {
        let a = ViewPort { cols: 120, rows: 30 };
        let b = ViewPort { cols: 80, rows: 40 };
        assert_eq!(a.min(b), ViewPort { cols: 80, rows: 30 });
    }
}
