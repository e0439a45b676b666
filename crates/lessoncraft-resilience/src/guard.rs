//! Breaker and retry composed into one wrapper.

use std::future::Future;
use std::sync::Arc;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::retry::{Retryable, RetryPolicy};

/// A retry loop wrapped inside a circuit breaker.
///
/// The retry loop runs *inside* the breaker so repeated local retries count
/// as a single breaker decision: one exhausted retry burst records one
/// failure, one eventual success records one success.
#[derive(Clone)]
pub struct Guard {
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl Guard {
    /// Compose a shared breaker with a retry policy.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Self {
        Self { breaker, policy }
    }

    /// The underlying breaker, for health snapshots.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `op` through retry-inside-breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] when the circuit rejects the call, or
    /// the operation's final error after retries are exhausted.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<T, BreakerError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker
            .execute(|| self.policy.run(operation, op))
            .await
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("breaker", &self.breaker.name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerOptions, State};
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Transient;

    impl fmt::Display for Transient {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "transient")
        }
    }

    impl Retryable for Transient {
        fn is_retryable(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_burst_is_one_breaker_decision() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerOptions {
            name: "guarded".to_string(),
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(10),
            half_open_success_threshold: 1,
            on_state_change: None,
        }));
        let guard = Guard::new(
            Arc::clone(&breaker),
            RetryPolicy {
                max_retries: 3,
                base_backoff: Duration::from_millis(1),
            },
        );

        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = guard
            .execute("always-fails", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Transient) }
            })
            .await;

        assert!(result.is_err());
        // 4 local attempts ran, but the breaker saw a single failure and
        // stays closed with threshold 2.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(breaker.state(), State::Closed);
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eventual_success_records_success() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerOptions::named("guarded")));
        let guard = Guard::new(
            Arc::clone(&breaker),
            RetryPolicy {
                max_retries: 2,
                base_backoff: Duration::from_millis(1),
            },
        );

        let attempts = AtomicU32::new(0);
        let result = guard
            .execute("flaky", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(Transient)
                    } else {
                        Ok(1u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn open_breaker_skips_retries() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerOptions {
            name: "guarded".to_string(),
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            half_open_success_threshold: 1,
            on_state_change: None,
        }));
        breaker.record(false);
        assert_eq!(breaker.state(), State::Open);

        let guard = Guard::new(Arc::clone(&breaker), RetryPolicy::default());
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = guard
            .execute("rejected", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Transient) }
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
