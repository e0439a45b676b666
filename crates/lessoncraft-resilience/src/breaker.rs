//! Circuit breaker state machine.
//!
//! The breaker tracks consecutive failures of a named dependency and stops
//! issuing calls once a threshold is reached. After `reset_timeout` the next
//! request is admitted as a trial (HalfOpen); enough trial successes close
//! the circuit again, a single trial failure re-opens it.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Requests pass through; failures are counted.
    Closed,
    /// Requests are rejected without invoking the operation.
    Open,
    /// Trial requests are admitted; successes close the circuit.
    HalfOpen,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Callback invoked when the breaker changes state.
///
/// Arguments are `(name, from, to)`. Callbacks run on a spawned task so they
/// cannot block the transition itself.
pub type StateChangeFn = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Configuration for a [`CircuitBreaker`].
#[derive(Clone)]
pub struct BreakerOptions {
    /// Descriptive name used in logs and state-change callbacks.
    pub name: String,
    /// Consecutive failures that trip the circuit.
    pub failure_threshold: u32,
    /// Time to wait before admitting a trial request.
    pub reset_timeout: Duration,
    /// Consecutive trial successes needed to close the circuit.
    pub half_open_success_threshold: u32,
    /// Observer for state changes.
    pub on_state_change: Option<StateChangeFn>,
}

impl BreakerOptions {
    /// Default options with the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(10),
            half_open_success_threshold: 2,
            on_state_change: None,
        }
    }
}

impl std::fmt::Debug for BreakerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerOptions")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field(
                "half_open_success_threshold",
                &self.half_open_success_threshold,
            )
            .finish_non_exhaustive()
    }
}

/// A point-in-time snapshot of breaker state, for health reporting.
#[derive(Debug, Clone)]
pub struct BreakerState {
    /// The breaker's name.
    pub name: String,
    /// Current state.
    pub state: State,
    /// Consecutive failure count.
    pub failure_count: u32,
    /// Consecutive success count (meaningful in HalfOpen).
    pub success_count: u32,
    /// How long ago the state last changed.
    pub since_change: Duration,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit breaker is open")]
    Open,
    /// The operation itself failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Return the inner error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Inner(e) => Some(e),
        }
    }
}

struct Inner {
    state: State,
    failure_count: u32,
    success_count: u32,
    last_change: Instant,
}

/// Circuit breaker guarding calls to one external dependency.
///
/// Mutations are serialized by an internal lock; the breaker is cheap to
/// share behind an `Arc` across every call site that talks to the same
/// dependency.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_success_threshold: u32,
    on_state_change: Option<StateChangeFn>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new breaker. Zero thresholds fall back to the defaults.
    #[must_use]
    pub fn new(options: BreakerOptions) -> Self {
        let defaults = BreakerOptions::default();
        let failure_threshold = if options.failure_threshold == 0 {
            defaults.failure_threshold
        } else {
            options.failure_threshold
        };
        let reset_timeout = if options.reset_timeout.is_zero() {
            defaults.reset_timeout
        } else {
            options.reset_timeout
        };
        let half_open_success_threshold = if options.half_open_success_threshold == 0 {
            defaults.half_open_success_threshold
        } else {
            options.half_open_success_threshold
        };

        Self {
            name: options.name,
            failure_threshold,
            reset_timeout,
            half_open_success_threshold,
            on_state_change: options.on_state_change,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                last_change: Instant::now(),
            }),
        }
    }

    /// The breaker's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The state as last recorded. The lazy Open → HalfOpen transition
    /// happens in [`Self::allow_request`], not here, so an Open breaker
    /// whose reset timeout has elapsed still reads as Open until a
    /// request arrives.
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Snapshot the breaker for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> BreakerState {
        let inner = self.inner.lock();
        BreakerState {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            since_change: inner.last_change.elapsed(),
        }
    }

    /// Execute `op` if the circuit admits it, recording the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] without invoking `op` when the circuit
    /// is open, or [`BreakerError::Inner`] with the operation's own error.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(BreakerError::Open);
        }

        let result = op().await;
        self.record(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    /// Check whether a request should be admitted, performing the
    /// Open → HalfOpen transition when the reset timeout has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                if inner.last_change.elapsed() > self.reset_timeout {
                    self.set_state(&mut inner, State::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of an admitted request.
    pub fn record(&self, success: bool) {
        let mut inner = self.inner.lock();
        if success {
            inner.success_count += 1;
            inner.failure_count = 0;
            if inner.state == State::HalfOpen
                && inner.success_count >= self.half_open_success_threshold
            {
                self.set_state(&mut inner, State::Closed);
            }
        } else {
            inner.failure_count += 1;
            inner.success_count = 0;
            match inner.state {
                State::Closed if inner.failure_count >= self.failure_threshold => {
                    self.set_state(&mut inner, State::Open);
                }
                State::HalfOpen => self.set_state(&mut inner, State::Open),
                _ => {}
            }
        }
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.set_state(&mut inner, State::Closed);
    }

    fn set_state(&self, inner: &mut Inner, new_state: State) {
        if inner.state == new_state {
            return;
        }

        let old_state = inner.state;
        inner.state = new_state;
        inner.last_change = Instant::now();
        inner.failure_count = 0;
        inner.success_count = 0;

        debug!(
            breaker = %self.name,
            from = %old_state,
            to = %new_state,
            "circuit breaker state changed"
        );

        if let Some(observer) = &self.on_state_change {
            let observer = Arc::clone(observer);
            let name = self.name.clone();
            // Observer runs off the transition path so it cannot block the
            // lock holder.
            tokio::spawn(async move {
                observer(&name, old_state, new_state);
            });
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(BreakerOptions {
            name: "test".to_string(),
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(100),
            half_open_success_threshold: 1,
            on_state_change: None,
        })
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.execute(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test]
    async fn trips_after_threshold() {
        let breaker = fast_breaker(2);
        assert_eq!(breaker.state(), State::Closed);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), State::Closed);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), State::Open);
    }

    #[tokio::test]
    async fn open_rejects_without_invoking() {
        let breaker = fast_breaker(1);
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), State::Open);

        let invoked = AtomicU32::new(0);
        let result = breaker
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_open_success_closes() {
        // S4: threshold 2, reset 100ms, half-open success 1.
        let breaker = fast_breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert!(matches!(fail(&breaker).await, Err(BreakerError::Open)));

        tokio::time::sleep(Duration::from_millis(150)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = fast_breaker(1);
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), State::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The trial request is admitted and fails.
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), State::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = fast_breaker(2);
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        // One failure after a success, below threshold again.
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let breaker = fast_breaker(1);
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), State::Open);

        breaker.reset();
        assert_eq!(breaker.state(), State::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test]
    async fn observer_notified_on_trip() {
        let count = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&count);
        let breaker = CircuitBreaker::new(BreakerOptions {
            name: "observed".to_string(),
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(100),
            half_open_success_threshold: 1,
            on_state_change: Some(Arc::new(move |name, from, to| {
                assert_eq!(name, "observed");
                assert_eq!(from, State::Closed);
                assert_eq!(to, State::Open);
                observed.fetch_add(1, Ordering::SeqCst);
            })),
        });

        fail(&breaker).await.unwrap_err();
        // Observer runs on a spawned task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_thresholds_use_defaults() {
        let breaker = CircuitBreaker::new(BreakerOptions {
            name: "defaults".to_string(),
            failure_threshold: 0,
            reset_timeout: Duration::ZERO,
            half_open_success_threshold: 0,
            on_state_change: None,
        });
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(10));
        assert_eq!(breaker.half_open_success_threshold, 2);
    }
}
