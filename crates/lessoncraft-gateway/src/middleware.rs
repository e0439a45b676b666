//! Gateway middleware: rate limiting, request IDs, and panic recovery.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

use crate::error::ApiError;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// A process-wide token bucket.
///
/// Tokens refill continuously at `rate` per second up to `capacity`; each
/// request spends one.
pub struct RateLimiter {
    capacity: f64,
    rate: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// A bucket admitting `rate_per_second` requests, with a burst equal
    /// to one second of traffic.
    #[must_use]
    pub fn new(rate_per_second: u32) -> Self {
        let capacity = f64::from(rate_per_second.max(1));
        Self {
            capacity,
            rate: capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Try to take one token.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.refilled_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Reject requests over the configured rate with a 429 envelope.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.allow() {
        next.run(request).await
    } else {
        ApiError::RateLimited.into_response()
    }
}

/// Stamp every response with an `x-request-id` for log correlation.
pub async fn request_id(request: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

/// Render a panic as the standard 500 envelope.
#[must_use]
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string());
    tracing::error!(panic = %detail, "handler panicked");
    ApiError::InternalServerError("unexpected panic".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_admits_burst_then_rejects() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());
    }

    #[test]
    fn bucket_refills_over_time() {
        let limiter = RateLimiter::new(1000);
        for _ in 0..1000 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(limiter.allow());
    }
}
