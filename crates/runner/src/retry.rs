use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;

/// Exponential backoff around store operations that may hit a cold or
/// restarting database.
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms)
    }

    /// Backoff before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff_for(&self, retry: usize) -> Duration {
        let doublings = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(doublings).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Runs `f` up to `max_retries + 1` times. The last error is returned
    /// unchanged.
    pub async fn retry<F, Fut, T, E>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        for retry in 1..=self.max_retries {
            match f().await {
                Ok(value) => {
                    if retry > 1 {
                        info!(operation, attempts = retry, "Recovered after retries");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let backoff = self.backoff_for(retry);
                    warn!(
                        operation,
                        retry,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    sleep(backoff).await;
                }
            }
        }

        let attempts = self.max_retries + 1;
        match f().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(operation, attempts, "Recovered after retries");
                }
                Ok(value)
            }
            Err(e) => {
                warn!(operation, attempts, error = %e, "Giving up");
                Err(e)
            }
        }
    }
}
