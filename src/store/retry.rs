//! Bounded exponential backoff for remote store calls

use crate::config::schema::RemoteConfig;
use crate::error::DevstageResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt cap and first delay; the delay doubles after every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Build from the `[remote]` config section
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Delay slept after the `failures`-th consecutive failure (1-based)
    pub fn delay_after(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1u32 << shift)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> DevstageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DevstageResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation, attempt, max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
