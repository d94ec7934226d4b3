//! Dual token-bucket rate limiting
//!
//! Every outbound call acquires one permit from both an hourly and a
//! per-minute budget. Budgets refill in full once their window has elapsed
//! (fixed-window reset, no sliding accounting).

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::config::RateLimitConfig;

const HOUR: Duration = Duration::from_secs(60 * 60);
const MINUTE: Duration = Duration::from_secs(60);

/// One fixed-window permit budget.
///
/// Invariant: `0 <= remaining <= capacity`. `remaining` resets to `capacity`
/// exactly when `now - window_start >= window_length`, and `window_start`
/// advances to `now` on that reset.
#[derive(Debug, Clone)]
pub struct RateBudget {
    capacity: u32,
    remaining: u32,
    window_start: Instant,
    window_length: Duration,
}

impl RateBudget {
    /// Create a full budget whose window opens at `now`
    pub fn new(capacity: u32, window_length: Duration, now: Instant) -> Self {
        Self {
            capacity,
            remaining: capacity,
            window_start: now,
            window_length,
        }
    }

    /// Reset to full capacity if the window has elapsed. Returns true on reset.
    pub fn refill(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= self.window_length {
            self.remaining = self.capacity;
            self.window_start = now;
            return true;
        }
        false
    }

    /// Whether at least one permit is left in the current window
    pub fn has_capacity(&self) -> bool {
        self.remaining > 0
    }

    /// Take one permit. Returns false (and changes nothing) when empty.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Permits per window
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Permits left in the current window
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Start of the current window
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Window length
    pub fn window_length(&self) -> Duration {
        self.window_length
    }
}

#[derive(Debug)]
struct Budgets {
    hourly: RateBudget,
    per_minute: RateBudget,
}

/// Point-in-time view of both budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Permits left this hour
    pub hourly_remaining: u32,
    /// Permits left this minute
    pub per_minute_remaining: u32,
}

/// Admission gate shared by every outbound call.
///
/// Budget state sits behind a mutex so concurrent callers observe a
/// serialized read-modify-write of `remaining`.
#[derive(Debug)]
pub struct RateLimiter {
    budgets: Mutex<Budgets>,
    poll_interval: Duration,
}

impl RateLimiter {
    /// Create a limiter from buffered budgets
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_windows(
            config.hourly_capacity,
            HOUR,
            config.per_minute_capacity,
            MINUTE,
            config.poll_interval,
        )
    }

    /// Create a limiter with explicit window lengths
    pub fn with_windows(
        hourly_capacity: u32,
        hourly_window: Duration,
        per_minute_capacity: u32,
        per_minute_window: Duration,
        poll_interval: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            budgets: Mutex::new(Budgets {
                hourly: RateBudget::new(hourly_capacity, hourly_window, now),
                per_minute: RateBudget::new(per_minute_capacity, per_minute_window, now),
            }),
            poll_interval,
        }
    }

    /// Wait until both budgets have a permit, then take one from each.
    ///
    /// Never fails; while either budget is empty the caller sleeps for the
    /// poll interval and re-checks after refilling.
    pub async fn acquire(&self) {
        let started = Instant::now();
        let mut announced = false;

        loop {
            if self.try_acquire().await {
                let waited = started.elapsed();
                if announced {
                    debug!(waited_ms = waited.as_millis() as u64, "Rate limit permit acquired");
                }
                crate::metrics::record_rate_limit_wait(waited);
                return;
            }

            if !announced {
                debug!(
                    poll_ms = self.poll_interval.as_millis() as u64,
                    "Rate limit budget exhausted, waiting for window reset"
                );
                announced = true;
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Take a permit from both budgets without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut budgets = self.budgets.lock().await;
        let now = Instant::now();
        budgets.hourly.refill(now);
        budgets.per_minute.refill(now);

        if budgets.hourly.has_capacity() && budgets.per_minute.has_capacity() {
            budgets.hourly.try_consume();
            budgets.per_minute.try_consume();
            return true;
        }
        false
    }

    /// Current remaining permits (after applying any due refill)
    pub async fn snapshot(&self) -> RateLimitSnapshot {
        let mut budgets = self.budgets.lock().await;
        let now = Instant::now();
        budgets.hourly.refill(now);
        budgets.per_minute.refill(now);
        RateLimitSnapshot {
            hourly_remaining: budgets.hourly.remaining(),
            per_minute_remaining: budgets.per_minute.remaining(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}
