//! Exponential backoff around fallible async operations
//!
//! Only wrap operations that fail transiently (network calls). Logical
//! failures such as "no segments found" must be returned directly.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::config::calculate_backoff;

/// Retry ceiling and initial delay. Delays double after every failure: `d, 2d, 4d, ...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below one are raised to one.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Sleep applied after `failed_attempts` consecutive failures
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        calculate_backoff(self.initial_delay, failed_attempts)
    }

    /// Run `op` until it succeeds or the attempt ceiling is hit.
    ///
    /// `op` receives the 1-based attempt number. Each failure is logged
    /// before the backoff sleep; exhaustion returns the last error.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, |_| true, op).await
    }

    /// Like [`RetryPolicy::run`], but errors rejected by `should_retry` are
    /// returned immediately without consuming further attempts.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        should_retry: P,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation,
                            "Retry attempt {}/{} succeeded", attempt, self.max_attempts
                        );
                    }
                    return Ok(value);
                }
                Err(err) if !should_retry(&err) => return Err(err),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            operation,
                            attempts = attempt,
                            error = %err,
                            "Giving up after {} attempts", attempt
                        );
                        return Err(err);
                    }

                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
                        attempt + 1,
                        self.max_attempts,
                        err,
                        delay.as_secs_f64()
                    );
                    crate::metrics::record_retry(operation, attempt, delay);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `op` with up to `max_attempts` attempts, starting at `initial_delay`.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: u32,
    initial_delay: Duration,
    op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    RetryPolicy::new(max_attempts, initial_delay)
        .run("operation", op)
        .await
}
