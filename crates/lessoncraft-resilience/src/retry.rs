//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Classifies which errors are worth retrying.
///
/// Validation, not-found, and permission errors are terminal and must return
/// `false`; deadline and transient transport errors return `true`.
pub trait Retryable {
    /// Whether a retry could plausibly succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for reqwest::Error {
    fn is_retryable(&self) -> bool {
        self.is_timeout() || self.is_connect() || self.is_request()
    }
}

/// Bounded retry policy: `max_retries` *additional* attempts after the
/// first, sleeping `base_backoff * 2^(attempt-1)` scaled by jitter uniform
/// in `[0.75, 1.25]` between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Base duration for exponential backoff.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::from_millis(100),
        }
    }

    /// Backoff before the given attempt (1-based), jitter applied.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_backoff.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_secs_f64(exp * jitter)
    }

    /// Run `op`, retrying retryable failures up to `max_retries` times.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or immediately
    /// for errors the classifier rejects.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_err: Option<E> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let sleep = self.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_retries = self.max_retries,
                    sleep_ms = sleep.as_millis() as u64,
                    error = %last_err.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "retrying operation"
                );
                tokio::time::sleep(sleep).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        warn!(
            operation,
            attempts = self.max_retries + 1,
            "operation failed after all retry attempts"
        );
        // At least one attempt always runs, so an error is recorded here.
        Err(last_err.take().map_or_else(|| unreachable!(), |e| e))
    }
}
