//! Single-segment download: resume check, rate-limited GET, checksum,
//! gzip normalization and atomic write, wrapped in bounded retries.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::gzip::{decompress_if_gzip, try_decompress};
use super::retry_formatter::FailureReport;
use super::{FetchError, FetchResult, SegmentSource};
use crate::downloader::config::DownloadConfig;
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::retry::RetryPolicy;
use crate::output::write_atomic;
use crate::Segment;

/// Why a segment produced no file without being attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The segment carries no source location
    MissingSource,
}

/// Result of fetching one segment
#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    /// Payload fetched and written
    Downloaded {
        /// Written file
        path: PathBuf,
        /// Payload bytes received
        bytes: u64,
    },
    /// File already existed and overwrite was off; no network call made
    Resumed {
        /// Existing file
        path: PathBuf,
    },
    /// Not attempted
    Skipped {
        /// Why
        reason: SkipReason,
    },
    /// Every attempt failed
    Failed {
        /// Last error
        error: FetchError,
        /// Attempts made
        attempts: u32,
    },
}

impl SegmentOutcome {
    /// Path of the file on disk, if one exists after this outcome
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Downloaded { path, .. } | Self::Resumed { path } => Some(path),
            Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Downloads individual segments.
///
/// Shared across concurrent workers; holds no per-segment state.
pub struct SegmentFetcher {
    source: Arc<dyn SegmentSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    verify_checksums: bool,
}

impl SegmentFetcher {
    /// Create a fetcher pulling from `source`, gated by `limiter`
    pub fn new(
        source: Arc<dyn SegmentSource>,
        limiter: Arc<RateLimiter>,
        config: &DownloadConfig,
    ) -> Self {
        Self {
            source,
            limiter,
            retry: RetryPolicy::new(config.max_attempts, config.backoff_base),
            verify_checksums: config.verify_checksums,
        }
    }

    /// Retry policy applied per segment
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Materialize `segment` at `path`.
    ///
    /// - no source location: skipped, no attempt consumed
    /// - `path` exists and `overwrite` is off: returned as-is, no network call
    /// - otherwise: fetched with retries; exhaustion yields [`SegmentOutcome::Failed`]
    pub async fn fetch(&self, segment: &Segment, path: &Path, overwrite: bool) -> SegmentOutcome {
        let Some(url) = segment.source_url() else {
            warn!(
                segment_id = %segment.id,
                "Segment has no download location, skipping"
            );
            crate::metrics::record_segment_skipped();
            return SegmentOutcome::Skipped {
                reason: SkipReason::MissingSource,
            };
        };

        if !overwrite && path.exists() {
            debug!(
                segment_id = %segment.id,
                path = %path.display(),
                "Segment already on disk, skipping download"
            );
            crate::metrics::record_segment_resumed();
            return SegmentOutcome::Resumed {
                path: path.to_path_buf(),
            };
        }

        let operation = format!("segment {}", segment.id);
        let mut attempts = 0;
        let result = self
            .retry
            .run(&operation, |attempt| {
                attempts = attempt;
                let last_attempt = attempt >= self.retry.max_attempts();
                self.transfer(segment, url, path, last_attempt)
            })
            .await;

        match result {
            Ok(bytes) => {
                info!(
                    segment_id = %segment.id,
                    path = %path.display(),
                    bytes,
                    "Segment downloaded"
                );
                crate::metrics::record_segment_downloaded(bytes);
                SegmentOutcome::Downloaded {
                    path: path.to_path_buf(),
                    bytes,
                }
            }
            Err(error) => {
                let report = FailureReport::new(
                    segment.id.clone(),
                    attempts,
                    error.kind(),
                    error.to_string(),
                    url,
                );
                warn!("{}", report.format_failure());
                crate::metrics::record_segment_failed();
                SegmentOutcome::Failed { error, attempts }
            }
        }
    }

    /// One attempt: permit, GET, checksum, decode, atomic write.
    ///
    /// A gzip payload that fails to inflate is retried; on the last attempt
    /// the raw bytes are written instead.
    async fn transfer(
        &self,
        segment: &Segment,
        url: &str,
        path: &Path,
        last_attempt: bool,
    ) -> FetchResult<u64> {
        self.limiter.acquire().await;

        let payload = self.source.fetch(url).await?;
        let received = payload.len() as u64;

        if self.verify_checksums {
            verify_checksum(segment, &payload)?;
        }

        let data = if last_attempt {
            decompress_if_gzip(payload)
        } else {
            try_decompress(payload).map_err(|e| FetchError::Decompress(e.to_string()))?
        };
        write_atomic(path, &data)?;
        Ok(received)
    }
}

/// Compare the SHA-256 of `payload` with the segment's advertised checksum.
///
/// Only 64-hex-digit checksums are enforced; other formats are logged and
/// accepted since their algorithm is unknown.
pub fn verify_checksum(segment: &Segment, payload: &Bytes) -> FetchResult<()> {
    let Some(expected) = segment.checksum.as_deref().map(str::trim) else {
        return Ok(());
    };
    if expected.is_empty() {
        return Ok(());
    }
    if !is_sha256_hex(expected) {
        debug!(
            segment_id = %segment.id,
            checksum = expected,
            "Checksum format not recognized, not enforcing"
        );
        return Ok(());
    }

    let actual = sha256_hex(payload);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(FetchError::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        });
    }
    Ok(())
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
