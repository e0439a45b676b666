//! In-process publish/subscribe for LessonCraft state changes.
//!
//! The orchestrator, provisioner, and scheduler publish lifecycle events
//! here; terminal streams and background sweepers subscribe. Payloads are
//! tagged variants: subscribers pattern-match on [`EventPayload`] and get
//! a typed struct, never a bag of untyped arguments.
//!
//! Delivery is best-effort and synchronous from the emitter's perspective:
//! handlers run inline, in subscription order, and must not block. Long
//! work belongs on a queue owned by the handler.
//!
//! # Example
//!
//! ```
//! use lessoncraft_events::{EventBus, EventKind, EventPayload};
//!
//! let bus = EventBus::new();
//! bus.on(EventKind::SessionNew, |event| {
//!     println!("session {} created", event.id);
//! });
//! bus.emit("ab12cd34", EventPayload::SessionNew);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::{Event, EventKind, EventPayload, InstanceStats};
