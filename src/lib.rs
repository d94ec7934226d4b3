//! # Report Segment Downloader Library
//!
//! Materializes server-generated reports onto local disk. A report is
//! requested, polled until the service finishes generating it, and then
//! fetched as one or more instances, each split into independently
//! downloadable segments.
//!
//! ## Features
//!
//! - **Rate Limiting**: every outbound call is admitted by a dual
//!   hourly/per-minute budget kept below the provider's published limits
//! - **Bounded Concurrency**: segments download through a worker pool with a
//!   configurable cap
//! - **Resume**: segments already on disk are never fetched again
//! - **Gzip Normalization**: gzip payloads are stored decompressed
//! - **Merge**: per-instance segment files are concatenated under a single
//!   header line
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use report_segment_downloader::client::{HttpReportClient, StaticToken};
//! use report_segment_downloader::downloader::{DownloadConfig, PollConfig, RateLimiter};
//! use report_segment_downloader::fetcher::HttpSegmentSource;
//! use report_segment_downloader::materializer::Materializer;
//! use report_segment_downloader::ReportParams;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::default());
//! let api = Arc::new(HttpReportClient::new(
//!     "https://reports.example.com/v1",
//!     Arc::new(StaticToken::new("token")),
//!     limiter.clone(),
//! )?);
//! let source = Arc::new(HttpSegmentSource::new()?);
//!
//! let materializer = Materializer::new(api, source, limiter, "./reports")
//!     .with_download_config(DownloadConfig::default())
//!     .with_poll_config(PollConfig::default());
//!
//! let outcome = materializer.run(&ReportParams::new()).await?;
//! println!("request {} -> {} files", outcome.request_id, outcome.files().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - report lifecycle API (create, poll, list, delete)
//! - [`downloader`] - rate limiting, retries, progress and the batch pool
//! - [`fetcher`] - single-segment transfer, gzip detection, checksums
//! - [`output`] - atomic writes, file naming, merging, manifests, run locks
//! - [`materializer`] - the end-to-end request/poll/download/merge flow
//! - [`shutdown`] - cooperative Ctrl+C handling

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Report lifecycle API
pub mod client;

/// Download orchestration
pub mod downloader;

/// Segment fetchers
pub mod fetcher;

/// Request-to-disk orchestration
pub mod materializer;

/// Metrics recording and export
pub mod metrics;

/// Output files
pub mod output;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Opaque report parameters, forwarded verbatim to the service
pub type ReportParams = serde_json::Map<String, serde_json::Value>;

/// A downloadable slice of a report instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Identifier, unique within its instance
    pub id: String,
    /// Download location; segments without one are skipped
    #[serde(default, alias = "url")]
    pub source_url: Option<String>,
    /// Advertised checksum of the payload as served
    #[serde(default)]
    pub checksum: Option<String>,
    /// Advertised payload size
    #[serde(default, alias = "size")]
    pub size_bytes: Option<u64>,
}

impl Segment {
    /// Create a segment with an optional download location
    pub fn new(id: impl Into<String>, source_url: Option<&str>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.map(str::to_string),
            checksum: None,
            size_bytes: None,
        }
    }

    /// Attach an advertised checksum
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Attach an advertised size
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Usable download location; blank strings count as absent
    pub fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Generation state of a report request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Accepted, not started
    #[serde(alias = "pending", alias = "queued")]
    Created,
    /// Being generated
    #[serde(alias = "running", alias = "in_progress")]
    Processing,
    /// Ready for download
    #[serde(alias = "complete", alias = "done")]
    Completed,
    /// Generation failed
    #[serde(alias = "error")]
    Failed,
}

impl ReportStatus {
    /// No further transitions will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "pending" | "queued" => Ok(Self::Created),
            "processing" | "running" | "in_progress" => Ok(Self::Processing),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed),
            other => Err(format!("unknown report status '{other}'")),
        }
    }
}
