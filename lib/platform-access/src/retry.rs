//! Bounded timeouts and retry with backoff for identity provider calls.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// How provider calls are bounded and retried.
///
/// Only transient failures ([`ProviderError::is_transient`]) are retried;
/// a timeout counts as transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Default: 200
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Default: 2000
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-attempt timeout. Default: 5000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt with the given timeout.
    #[must_use]
    pub fn no_retry(request_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            request_timeout_ms: u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let max_backoff = Duration::from_millis(self.max_backoff_ms);
        let mut backoff = Duration::from_millis(self.initial_backoff_ms).min(max_backoff);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.request_timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Unavailable {
                    reason: format!("{operation} timed out after {}ms", self.request_timeout_ms),
                }),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "identity provider call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
