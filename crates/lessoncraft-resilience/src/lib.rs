//! Resilience primitives for LessonCraft's outbound calls.
//!
//! Every dependency the platform talks to (the container engine, the
//! document store, stats agents, OAuth providers) is treated as fallible.
//! This crate provides the three wrappers the rest of the system composes
//! around those calls:
//!
//! - [`CircuitBreaker`]: short-circuits calls to a dependency that keeps
//!   failing, with Closed → Open → HalfOpen recovery
//! - [`RetryPolicy`]: bounded retries with exponential backoff and jitter
//! - [`Guard`]: retries composed *inside* one breaker decision, so a burst
//!   of local retries counts as a single failure observation
//! - [`GuardedHttpClient`]: an HTTP client whose 5xx responses feed the
//!   breaker
//!
//! # Example
//!
//! ```
//! use lessoncraft_resilience::{BreakerOptions, CircuitBreaker};
//!
//! # async fn demo() {
//! let breaker = CircuitBreaker::new(BreakerOptions::named("docker"));
//! let result: Result<u32, _> = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>(42) })
//!     .await;
//! assert!(result.is_ok());
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod breaker;
pub mod guard;
pub mod http;
pub mod retry;

pub use breaker::{BreakerError, BreakerOptions, BreakerState, CircuitBreaker, State};
pub use guard::Guard;
pub use http::{GuardedHttpClient, HttpGuardError};
pub use retry::{Retryable, RetryPolicy};
