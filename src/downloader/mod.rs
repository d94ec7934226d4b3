//! Download orchestration, rate limiting and retries
//!
//! # Overview
//!
//! 1. **Admission**: every outbound call takes a permit from
//!    [`rate_limit::RateLimiter`] (hourly + per-minute budgets)
//! 2. **Retries**: transient failures are retried by [`retry::RetryPolicy`]
//!    with doubling delays
//! 3. **Batching**: [`batch::BatchDownloader`] runs segments through the
//!    [`crate::fetcher::SegmentFetcher`] under a concurrency cap
//! 4. **Progress**: [`progress::DownloadProgress`] snapshots are pushed to a
//!    [`progress::ProgressObserver`] after every settled segment
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use report_segment_downloader::downloader::{BatchDownloader, DownloadConfig, RateLimiter};
//! use report_segment_downloader::fetcher::{HttpSegmentSource, SegmentFetcher};
//! use report_segment_downloader::Segment;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::default();
//! let limiter = Arc::new(RateLimiter::default());
//! let source = Arc::new(HttpSegmentSource::new()?);
//! let fetcher = Arc::new(SegmentFetcher::new(source, limiter, &config));
//!
//! let segments = vec![Segment::new("a", Some("https://cdn.example.com/a.csv.gz"))];
//! let report = BatchDownloader::new(fetcher, config.concurrency)
//!     .download_segments(&segments, "./out".as_ref(), false)
//!     .await?;
//! println!("{} files", report.paths.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Segment-level transfer failures never abort a batch; they show up as
//! `failed` in the report. Only structural problems (the output directory
//! cannot be created) surface as [`DownloadError`].

use std::path::PathBuf;

pub mod batch;
pub mod config;
pub mod progress;
pub mod rate_limit;
pub mod retry;

pub use batch::{BatchDownloader, BatchReport, SegmentFailure};
pub use config::{DownloadConfig, PollConfig, RateLimitConfig};
pub use progress::{DownloadProgress, LogProgress, ProgressObserver};
pub use rate_limit::{RateBudget, RateLimitSnapshot, RateLimiter};
pub use retry::{with_retry, RetryPolicy};

/// Batch download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Output directory could not be created
    #[error("cannot create output directory {path}: {message}")]
    OutputDirectory {
        /// Directory requested
        path: PathBuf,
        /// Underlying error
        message: String,
    },
}

impl DownloadError {
    /// Remediation hint for the user
    pub fn hint(&self) -> &'static str {
        match self {
            Self::OutputDirectory { .. } => {
                "Check that the output path is writable and not an existing file"
            }
        }
    }
}
