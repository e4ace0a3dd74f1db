//! Retry-with-backoff confirmation that a release is visible.
//!
//! After an install or upgrade returns, the release store may lag behind.
//! The poller retries a read until it succeeds or the elapsed-time budget
//! runs out, then returns the last error.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

/// Default delay before the first retry.
const DEFAULT_INITIAL_INTERVAL_MS: u64 = 250;

/// Default upper bound on the delay between attempts.
const DEFAULT_MAX_INTERVAL_MS: u64 = 1000;

/// Default total time budget.
const DEFAULT_MAX_ELAPSED_MS: u64 = 4000;

/// Exponential backoff poller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationPoller {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
}

impl Default for ConfirmationPoller {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(DEFAULT_INITIAL_INTERVAL_MS),
            multiplier: 2.0,
            max_interval: Duration::from_millis(DEFAULT_MAX_INTERVAL_MS),
            max_elapsed: Duration::from_millis(DEFAULT_MAX_ELAPSED_MS),
        }
    }
}

impl ConfirmationPoller {
    /// Creates a poller with the default schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub const fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the maximum delay between attempts.
    #[must_use]
    pub const fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Sets the total time budget.
    #[must_use]
    pub const fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = elapsed;
        self
    }

    /// Returns the total time budget.
    #[must_use]
    pub const fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Runs `attempt` until it succeeds or the budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once no further attempt fits
    /// in the budget.
    pub async fn poll<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut interval = self.initial_interval;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let err = match attempt().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("Confirmed {what} after {attempts} attempts");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if start.elapsed() + interval > self.max_elapsed {
                warn!("Giving up on {what} after {attempts} attempts: {err}");
                return Err(err);
            }

            if err.is_retryable() {
                debug!("Unable to confirm {what}: {err} (may retry)");
            } else {
                debug!("Unable to confirm {what}: {err}");
            }
            tokio::time::sleep(interval).await;
            interval = interval.mul_f64(self.multiplier).min(self.max_interval);
        }
    }
}
