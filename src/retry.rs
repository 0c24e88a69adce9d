//! Shared retry policy for external calls
//!
//! The price fetcher and the decision engine both retry with the same shape:
//! a fixed number of attempts with a linear backoff (attempt x step).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff step; attempt N sleeps N x step before the next try
    pub step: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, step: Duration) -> Self {
        Self { max_attempts, step }
    }

    /// Run `op` until it succeeds or attempts are exhausted, returning the
    /// last error. The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!("{} attempt {}/{} failed: {}", what, attempt, self.max_attempts, err);
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    sleep(self.step * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}
