//! Gateway application state.

use std::sync::Arc;

use lessoncraft_auth::TokenService;
use lessoncraft_events::EventBus;
use lessoncraft_lesson::SafetyPolicy;
use lessoncraft_orchestrator::SessionFabric;
use lessoncraft_store::LessonStore;

use crate::config::GatewayConfig;

/// Shared state for all request handlers.
pub struct AppState<F, L> {
    /// The orchestration service.
    pub fabric: Arc<F>,
    /// The lesson store (optionally cache-decorated).
    pub lessons: Arc<L>,
    /// The event bus, for lesson lifecycle events.
    pub events: Arc<EventBus>,
    /// Token issuing and validation.
    pub tokens: Arc<TokenService>,
    /// Command-safety policy of the serving playground.
    pub safety_policy: SafetyPolicy,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<F, L> AppState<F, L>
where
    F: SessionFabric,
    L: LessonStore,
{
    /// Create the state.
    #[must_use]
    pub fn new(
        fabric: Arc<F>,
        lessons: Arc<L>,
        events: Arc<EventBus>,
        tokens: Arc<TokenService>,
        safety_policy: SafetyPolicy,
        config: GatewayConfig,
    ) -> Self {
        Self {
            fabric,
            lessons,
            events,
            tokens,
            safety_policy,
            config,
        }
    }
}
