//! Download configuration constants and tunables

use std::time::Duration;

/// Segments transferred concurrently per batch.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Upper bound accepted for the concurrency cap.
/// Anything higher mostly queues on the rate limiter anyway.
pub const MAX_CONCURRENCY: usize = 32;

/// Total attempts per segment (initial try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubled after every failed attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Provider's documented hourly request ceiling.
pub const PROVIDER_HOURLY_LIMIT: u32 = 1_000;

/// Provider's documented per-minute request ceiling.
pub const PROVIDER_PER_MINUTE_LIMIT: u32 = 100;

/// Fraction of the provider ceilings the limiter is allowed to use.
/// The remainder absorbs clock skew and other clients on the same credential.
pub const DEFAULT_SAFETY_RATIO: f64 = 0.97;

/// Re-check cadence while both budgets are exhausted.
pub const DEFAULT_LIMITER_POLL: Duration = Duration::from_secs(1);

/// Delay between report status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Status polls before a run is declared timed out (one hour at the default interval).
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 360;

/// Knobs for [`crate::downloader::BatchDownloader`] and the segment fetcher.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum segments in flight at once
    pub concurrency: usize,
    /// Attempts per segment before it is reported as failed
    pub max_attempts: u32,
    /// Initial retry delay
    pub backoff_base: Duration,
    /// Replace segment files that already exist
    pub overwrite: bool,
    /// Enforce SHA-256 checksums advertised by the provider
    pub verify_checksums: bool,
    /// Concatenate each instance's segments into `merged.csv`
    pub merge: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            overwrite: false,
            verify_checksums: true,
            merge: true,
        }
    }
}

impl DownloadConfig {
    /// Set the concurrency cap (clamped to `1..=MAX_CONCURRENCY`)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set the attempt ceiling (at least one attempt is always made)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the initial backoff delay
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Replace existing segment files instead of resuming
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Toggle checksum enforcement
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Toggle the per-instance merge step
    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

/// Budgets for the dual token-bucket limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Permits per hour
    pub hourly_capacity: u32,
    /// Permits per minute
    pub per_minute_capacity: u32,
    /// Sleep between checks while both budgets are empty
    pub poll_interval: Duration,
}

impl RateLimitConfig {
    /// Derive buffered budgets from the provider's documented ceilings.
    ///
    /// Each budget is `floor(limit * ratio)`, never below one permit.
    pub fn from_provider_limits(hourly_limit: u32, per_minute_limit: u32, ratio: f64) -> Self {
        Self {
            hourly_capacity: buffered(hourly_limit, ratio),
            per_minute_capacity: buffered(per_minute_limit, ratio),
            poll_interval: DEFAULT_LIMITER_POLL,
        }
    }

    /// Override the re-check cadence
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from_provider_limits(
            PROVIDER_HOURLY_LIMIT,
            PROVIDER_PER_MINUTE_LIMIT,
            DEFAULT_SAFETY_RATIO,
        )
    }
}

fn buffered(limit: u32, ratio: f64) -> u32 {
    let ratio = ratio.clamp(0.0, 1.0);
    ((f64::from(limit) * ratio).floor() as u32).max(1)
}

/// Report status polling cadence.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between polls
    pub interval: Duration,
    /// Polls before giving up with a timeout
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

/// Backoff delay before retry number `failed_attempts` (1-based): `base * 2^(n-1)`.
///
/// No jitter and no cap; the attempt ceiling bounds the total wait.
pub fn calculate_backoff(base: Duration, failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}
