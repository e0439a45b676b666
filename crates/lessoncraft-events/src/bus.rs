//! The local event broker.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::event::{Event, EventKind, EventPayload};

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    /// `None` subscribes to every kind.
    filter: Option<EventKind>,
    handler: Handler,
}

/// A local publish/subscribe broker.
///
/// Dispatch is synchronous and in subscription order within one emit; no
/// ordering is guaranteed across kinds. The subscriber table is read-mostly:
/// subscriptions happen at startup, emits happen constantly.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Subscriber {
            filter: Some(kind),
            handler: Arc::new(handler),
        });
    }

    /// Subscribe a handler to every event kind.
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Subscriber {
            filter: None,
            handler: Arc::new(handler),
        });
    }

    /// Publish an event for the given session or playground ID.
    ///
    /// Handlers run inline; delivery is best-effort.
    pub fn emit(&self, id: impl Into<String>, payload: EventPayload) {
        let event = Event {
            id: id.into(),
            payload,
        };

        trace!(kind = ?event.kind(), id = %event.id, "emitting event");

        let subscribers = self.subscribers.read();
        for sub in subscribers.iter() {
            if sub.filter.is_none() || sub.filter == Some(event.kind()) {
                (sub.handler)(&event);
            }
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn kind_filter() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.on(EventKind::SessionNew, move |event| {
            sink.lock().push(event.id.clone());
        });

        bus.emit("s1", EventPayload::SessionNew);
        bus.emit("s2", EventPayload::SessionEnd);

        assert_eq!(*seen.lock(), vec!["s1".to_string()]);
    }

    #[test]
    fn catch_all_sees_everything() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.on_any(move |event| {
            sink.lock().push(event.kind());
        });

        bus.emit("s1", EventPayload::SessionNew);
        bus.emit("s1", EventPayload::SessionEnd);
        bus.emit("p1", EventPayload::PlaygroundNew);

        assert_eq!(
            *seen.lock(),
            vec![
                EventKind::SessionNew,
                EventKind::SessionEnd,
                EventKind::PlaygroundNew
            ]
        );
    }

    #[test]
    fn dispatch_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let sink = Arc::clone(&order);
            bus.on(EventKind::SessionReady, move |_| {
                sink.lock().push(n);
            });
        }

        bus.emit("s1", EventPayload::SessionReady);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn typed_payload_reaches_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        bus.on(EventKind::InstanceViewportResize, move |event| {
            if let EventPayload::InstanceViewportResize { cols, rows } = event.payload {
                *sink.lock() = Some((cols, rows));
            }
        });

        bus.emit(
            "s1",
            EventPayload::InstanceViewportResize { cols: 80, rows: 24 },
        );
        assert_eq!(*seen.lock(), Some((80, 24)));
    }
}
