//! Retry logic for connection establishment.
//!
//! # Responsibilities
//! - Classify connect errors as transient or fatal
//! - Re-run the connect phase with exponential backoff + jitter
//! - Bound the number of attempts

use std::future::Future;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::upstream::{ConnectError, ConnectErrorKind};

/// Whether a failed connect attempt may be retried.
pub fn is_retryable(error: &ConnectError) -> bool {
    matches!(
        error.kind(),
        ConnectErrorKind::Dns | ConnectErrorKind::Timeout
    )
}

/// Bounded retry policy for the connect phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` until it succeeds, fails with a fatal error, or the
    /// attempt budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, ConnectError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ConnectError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match attempt(attempts).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            metrics::record_connect_error(error.kind().as_str());
            if attempts >= self.max_attempts || !is_retryable(&error) {
                return Err(error);
            }

            let delay = calculate_backoff(attempts, self.base_delay_ms, self.max_delay_ms);
            tracing::info!(
                attempt = attempts,
                delay = ?delay,
                error = %error,
                "Retrying upstream connect"
            );
            metrics::record_connect_retry();
            tokio::time::sleep(delay).await;
        }
    }
}
