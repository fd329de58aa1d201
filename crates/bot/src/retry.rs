//! Fixed-delay retry for transient failures

use std::future::Future;
use std::time::Duration;

use refill_types::{RefillError, RefillResult};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::MonitorConfig;

/// Retry bound and the constant delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl From<&MonitorConfig> for RetryPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }
}

/// Run `operation` until it succeeds or the policy is exhausted
///
/// Only transient errors are retried. Anything else is returned as is on the
/// attempt that produced it; exhausting the policy returns the last error
/// wrapped with the attempt count.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RefillResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RefillResult<T>>,
{
    let total_attempts = policy.total_attempts();
    let mut attempt = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retriable() => return Err(err),
            Err(err) => err,
        };

        if attempt >= total_attempts {
            return Err(RefillError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        warn!(
            operation = operation_name,
            attempt,
            total_attempts,
            error = %err,
            "Attempt failed, retrying in {:?}",
            policy.delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RefillError::cancelled(operation_name)),
            _ = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}
