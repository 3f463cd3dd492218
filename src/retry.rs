//! Bounded retry for flaky network calls
//!
//! Fixed delay, no jitter, no backoff. Meant for short blips during provider
//! discovery, not for sustained outages.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::debug;

/// Default pause between two attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    delay: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RetryExecutor {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// A `max_attempts` of zero is treated as one attempt.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt, unchanged, once attempts are
    /// exhausted.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F, max_attempts: u32) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    debug!("🔁 Attempt {attempt}/{max_attempts} failed: {e}. Retrying");
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
