//! Bounded-concurrency batch download
//!
//! Segments are pulled lazily into a pool of at most `concurrency` in-flight
//! transfers (`buffer_unordered`), so a fast worker picks up the next
//! segment as soon as it settles instead of waiting for a whole group.
//! Progress is mutated only here, in the single consumer loop.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::progress::{DownloadProgress, ProgressObserver};
use super::DownloadError;
use crate::fetcher::{SegmentFetcher, SegmentOutcome};
use crate::output::segment_file_name;
use crate::shutdown::SharedShutdown;
use crate::Segment;

/// A segment that exhausted its retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    /// Segment identifier
    pub segment_id: String,
    /// Last error text
    pub error: String,
}

/// Result of a batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Files present after the batch, sorted by path
    pub paths: Vec<PathBuf>,
    /// Final counters
    pub progress: DownloadProgress,
    /// Of `paths`, how many already existed
    pub resumed: u64,
    /// Segments without a source location
    pub skipped: Vec<String>,
    /// Segments that exhausted retries
    pub failed: Vec<SegmentFailure>,
    /// Shutdown stopped the batch before every segment was scheduled
    pub cancelled: bool,
}

impl BatchReport {
    /// Every scheduled segment settled and none failed
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed.is_empty()
    }
}

/// Orchestrates a set of segments into one directory.
pub struct BatchDownloader {
    fetcher: Arc<SegmentFetcher>,
    concurrency: usize,
    observer: Option<Arc<dyn ProgressObserver>>,
    shutdown: Option<SharedShutdown>,
}

impl BatchDownloader {
    /// Create a downloader running at most `concurrency` transfers at once
    pub fn new(fetcher: Arc<SegmentFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            observer: None,
            shutdown: None,
        }
    }

    /// Receive a progress snapshot after every settled segment
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Stop scheduling new segments once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Concurrency cap
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Download `segments` into `output_dir`.
    ///
    /// File names come from each segment's position in `segments`. Segment
    /// level failures never abort the batch; they are reported in the
    /// returned [`BatchReport`] for the caller to judge.
    pub async fn download_segments(
        &self,
        segments: &[Segment],
        output_dir: &Path,
        overwrite: bool,
    ) -> Result<BatchReport, DownloadError> {
        if segments.is_empty() {
            return Ok(BatchReport::default());
        }

        std::fs::create_dir_all(output_dir).map_err(|e| DownloadError::OutputDirectory {
            path: output_dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let total = segments.len();
        let bytes_expected = segments.iter().filter_map(|s| s.size_bytes).sum();
        let mut report = BatchReport {
            progress: DownloadProgress::new(total as u64, bytes_expected),
            ..BatchReport::default()
        };

        info!(
            segments = total,
            concurrency = self.concurrency,
            dir = %output_dir.display(),
            "Starting segment batch"
        );

        let fetcher = &self.fetcher;
        let mut scheduled = 0usize;
        let mut settled = stream::iter(segments.iter().enumerate())
            .take_while(|_| futures::future::ready(!self.shutdown_requested()))
            .map(|(index, segment)| {
                scheduled += 1;
                let path = output_dir.join(segment_file_name(index + 1, total));
                async move {
                    let outcome = fetcher.fetch(segment, &path, overwrite).await;
                    (segment, outcome)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((segment, outcome)) = settled.next().await {
            match outcome {
                SegmentOutcome::Downloaded { path, bytes } => {
                    report.progress.record_success(bytes);
                    report.paths.push(path);
                }
                SegmentOutcome::Resumed { path } => {
                    report.progress.record_success(0);
                    report.resumed += 1;
                    report.paths.push(path);
                }
                SegmentOutcome::Skipped { .. } => {
                    report.skipped.push(segment.id.clone());
                }
                SegmentOutcome::Failed { error, .. } => {
                    report.progress.record_failure();
                    report.failed.push(SegmentFailure {
                        segment_id: segment.id.clone(),
                        error: error.to_string(),
                    });
                }
            }

            if let Some(observer) = &self.observer {
                observer.on_progress(&report.progress);
            }
        }
        drop(settled);

        report.cancelled = scheduled < total;
        report.paths.sort();

        if report.cancelled {
            warn!(
                scheduled,
                total, "Shutdown requested, remaining segments were not started"
            );
        }
        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                "Some segments failed; re-run the same command to retry them"
            );
        }
        info!(
            succeeded = report.progress.succeeded,
            failed = report.progress.failed,
            skipped = report.skipped.len(),
            resumed = report.resumed,
            "Segment batch finished"
        );
        Ok(report)
    }
}
