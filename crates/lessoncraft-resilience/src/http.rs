//! HTTP client wrapped with a circuit breaker.
//!
//! Elevates 5xx responses to breaker failures so repeated server errors trip
//! the circuit, and surfaces `CircuitOpen` as a dedicated error variant so
//! callers can render degraded responses instead of hard failures.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Request, Response, StatusCode};
use thiserror::Error;

use crate::breaker::{BreakerError, BreakerOptions, CircuitBreaker};

/// Error from a guarded HTTP call.
#[derive(Debug, Error)]
pub enum HttpGuardError {
    /// The breaker rejected the call without issuing the request.
    #[error("circuit breaker is open")]
    CircuitOpen,
    /// The server answered with a 5xx status.
    #[error("server error: {0}")]
    Server(StatusCode),
    /// The request itself failed (connect, timeout, protocol).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl HttpGuardError {
    /// Whether the caller should fall back to a degraded response.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }
}

/// A `reqwest` client with breaker accounting on every request.
#[derive(Clone)]
pub struct GuardedHttpClient {
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedHttpClient {
    /// Wrap an existing client with a new breaker.
    #[must_use]
    pub fn new(client: reqwest::Client, options: BreakerOptions) -> Self {
        Self {
            client,
            breaker: Arc::new(CircuitBreaker::new(options)),
        }
    }

    /// Build a client with the given request timeout and a new breaker.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn with_timeout(
        timeout: Duration,
        options: BreakerOptions,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, options))
    }

    /// Wrap a client sharing an existing breaker.
    #[must_use]
    pub fn with_breaker(client: reqwest::Client, breaker: Arc<CircuitBreaker>) -> Self {
        Self { client, breaker }
    }

    /// The underlying breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The raw client, for building requests.
    #[must_use]
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Execute a request with breaker protection.
    ///
    /// # Errors
    ///
    /// Returns [`HttpGuardError::CircuitOpen`] when the breaker rejects the
    /// call, [`HttpGuardError::Server`] for 5xx responses (counted as
    /// failures), or [`HttpGuardError::Transport`] for request errors.
    pub async fn execute(&self, request: Request) -> Result<Response, HttpGuardError> {
        let result = self
            .breaker
            .execute(|| async {
                let response = self.client.execute(request).await?;
                if response.status().is_server_error() {
                    return Err(HttpGuardError::Server(response.status()));
                }
                Ok(response)
            })
            .await;

        match result {
            Ok(response) => Ok(response),
            Err(BreakerError::Open) => Err(HttpGuardError::CircuitOpen),
            Err(BreakerError::Inner(e)) => Err(e),
        }
    }

    /// Convenience GET with breaker protection.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`], plus request-building failures.
    pub async fn get(&self, url: &str) -> Result<Response, HttpGuardError> {
        let request = self.client.get(url).build()?;
        self.execute(request).await
    }
}

impl std::fmt::Debug for GuardedHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedHttpClient")
            .field("breaker", &self.breaker.name())
            .finish_non_exhaustive()
    }
}
