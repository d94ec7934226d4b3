//! Batch progress counters and the observer hook.
//!
//! The batch orchestrator is the only writer of [`DownloadProgress`]; it
//! hands a snapshot to the registered [`ProgressObserver`] every time a
//! segment settles. Counters only ever increase.

use std::fmt;

/// Counters for one batch of segments.
///
/// `succeeded + failed <= total` while running. Segments skipped before any
/// network attempt (no source location) count toward neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Segments in the batch
    pub total: u64,
    /// Segments written or already present on disk
    pub succeeded: u64,
    /// Segments that exhausted their retries
    pub failed: u64,
    /// Sum of advertised segment sizes
    pub bytes_expected: u64,
    /// Payload bytes received over the network
    pub bytes_transferred: u64,
}

impl DownloadProgress {
    /// Fresh counters for `total` segments
    pub fn new(total: u64, bytes_expected: u64) -> Self {
        Self {
            total,
            bytes_expected,
            ..Self::default()
        }
    }

    /// Completion percentage, `succeeded / total` (100 for an empty batch).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }

    /// Segments that have settled either way
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub(crate) fn record_success(&mut self, bytes: u64) {
        self.succeeded += 1;
        self.bytes_transferred += bytes;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
    }
}

impl fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[PROGRESS] {}/{} segments ({:.1}%)",
            self.succeeded,
            self.total,
            self.percentage()
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.bytes_transferred > 0 {
            write!(f, ", {} transferred", format_bytes(self.bytes_transferred))?;
        }
        Ok(())
    }
}

/// Receives a progress snapshot after every settled segment.
pub trait ProgressObserver: Send + Sync {
    /// Called from the orchestrator; keep it cheap
    fn on_progress(&self, progress: &DownloadProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &DownloadProgress) {
        self(progress)
    }
}

/// Observer that emits each snapshot as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, progress: &DownloadProgress) {
        tracing::info!("{progress}");
    }
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes < KIB {
        format!("{bytes:.0} B")
    } else if bytes < KIB * KIB {
        format!("{:.1} KiB", bytes / KIB)
    } else if bytes < KIB * KIB * KIB {
        format!("{:.1} MiB", bytes / (KIB * KIB))
    } else {
        format!("{:.2} GiB", bytes / (KIB * KIB * KIB))
    }
}
