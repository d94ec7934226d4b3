//! End-to-end report materialization
//!
//! ```text
//! Requested -> Polling(created|processing) -> Completed
//!           -> Fetching(instance) -> [Merging(instance)] -> Done
//!                                \-> Failed
//! ```
//!
//! Polling stops on a terminal provider status, on the attempt ceiling
//! (`Timeout`, distinct from a provider-reported failure) or on shutdown
//! (`Cancelled`). The request directory is guarded by a [`RunLock`] for the
//! whole run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::client::{ReportApi, ReportError};
use crate::downloader::{
    BatchDownloader, BatchReport, DownloadConfig, DownloadError, PollConfig, ProgressObserver,
    RateLimiter,
};
use crate::fetcher::{SegmentFetcher, SegmentSource};
use crate::output::{
    merge, InstanceSummary, MergeError, MergeSummary, OutputError, ReportLayout, RunLock,
    RunManifest,
};
use crate::shutdown::SharedShutdown;
use crate::{ReportParams, ReportStatus, Segment};

/// Observable stage of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Report creation requested
    Requested,
    /// Waiting for generation; carries the last observed status
    Polling(ReportStatus),
    /// Downloading the segments of one instance
    Fetching {
        /// Instance being fetched
        instance_id: String,
        /// 1-based position among instances with segments
        index: usize,
        /// Instances with segments
        total: usize,
    },
    /// Concatenating one instance's segment files
    Merging {
        /// Instance being merged
        instance_id: String,
    },
    /// Run finished
    Done,
    /// Run aborted
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Polling(status) => write!(f, "polling ({status})"),
            Self::Fetching {
                instance_id,
                index,
                total,
            } => write!(f, "fetching instance {instance_id} ({index}/{total})"),
            Self::Merging { instance_id } => write!(f, "merging instance {instance_id}"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Receives every state transition of a run.
pub trait RunObserver: Send + Sync {
    /// Called synchronously on each transition
    fn on_state(&self, state: &RunState);
}

impl<F> RunObserver for F
where
    F: Fn(&RunState) + Send + Sync,
{
    fn on_state(&self, state: &RunState) {
        self(state)
    }
}

/// Run-level errors
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// The provider marked the report as failed
    #[error("report {request_id} failed on the provider side")]
    ReportFailed {
        /// Request identifier
        request_id: String,
    },

    /// Polling ceiling reached before a terminal status
    #[error("report {request_id} not ready after {attempts} status checks")]
    Timeout {
        /// Request identifier
        request_id: String,
        /// Polls made
        attempts: u32,
    },

    /// Shutdown requested mid-run
    #[error("run for report {request_id} cancelled")]
    Cancelled {
        /// Request identifier
        request_id: String,
    },

    /// The completed report has no instances
    #[error("report {request_id} has no instances")]
    NoInstances {
        /// Request identifier
        request_id: String,
    },

    /// No instance of the report lists any segment
    #[error("report {request_id} has no segments")]
    NoSegments {
        /// Request identifier
        request_id: String,
    },

    /// Report API call failed
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Batch could not run
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Merge step failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Lock or manifest failure
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl MaterializeError {
    /// Remediation hint for the user
    pub fn hint(&self) -> &'static str {
        match self {
            Self::ReportFailed { .. } => {
                "Check the report parameters and request a new report"
            }
            Self::Timeout { .. } => {
                "The report is still generating; continue later with `resume --request-id`"
            }
            Self::Cancelled { .. } => crate::fetcher::RESUME_HINT,
            Self::NoInstances { .. } | Self::NoSegments { .. } => {
                "The report produced no data; check the report parameters"
            }
            Self::Report(e) => e.hint(),
            Self::Download(e) => e.hint(),
            Self::Merge(e) => e.hint(),
            Self::Output(OutputError::LockError(_)) => {
                "Another run is materializing this request; wait for it to finish"
            }
            Self::Output(_) => "Check that the output directory is writable",
        }
    }
}

/// Result of one instance
#[derive(Debug, Clone)]
pub struct InstanceOutcome {
    /// Remote instance identifier
    pub instance_id: String,
    /// Directory holding the segment files
    pub dir: PathBuf,
    /// Batch result
    pub report: BatchReport,
    /// Merge result, when merging ran
    pub merged: Option<MergeSummary>,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Remote request identifier
    pub request_id: String,
    /// Instances that listed segments, in provider order
    pub instances: Vec<InstanceOutcome>,
    /// Where the run manifest was written
    pub manifest_path: PathBuf,
    /// Whether the remote request was deleted afterwards
    pub deleted: bool,
}

impl RunOutcome {
    /// Every segment file present after the run
    pub fn files(&self) -> Vec<&Path> {
        self.instances
            .iter()
            .flat_map(|i| i.report.paths.iter().map(PathBuf::as_path))
            .collect()
    }

    /// Segments that exhausted their retries, across instances
    pub fn failed_count(&self) -> usize {
        self.instances.iter().map(|i| i.report.failed.len()).sum()
    }
}

/// Drives a report from request to files on disk.
pub struct Materializer {
    api: Arc<dyn ReportApi>,
    source: Arc<dyn SegmentSource>,
    limiter: Arc<RateLimiter>,
    layout: ReportLayout,
    download: DownloadConfig,
    poll: PollConfig,
    delete_after: bool,
    progress: Option<Arc<dyn ProgressObserver>>,
    observer: Option<Arc<dyn RunObserver>>,
    shutdown: Option<SharedShutdown>,
}

impl Materializer {
    /// Materializer writing under `output_root`
    pub fn new(
        api: Arc<dyn ReportApi>,
        source: Arc<dyn SegmentSource>,
        limiter: Arc<RateLimiter>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            source,
            limiter,
            layout: ReportLayout::new(output_root),
            download: DownloadConfig::default(),
            poll: PollConfig::default(),
            delete_after: false,
            progress: None,
            observer: None,
            shutdown: None,
        }
    }

    /// Segment download knobs
    pub fn with_download_config(mut self, config: DownloadConfig) -> Self {
        self.download = config;
        self
    }

    /// Status polling cadence
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poll = config;
        self
    }

    /// Delete the remote request once every segment is on disk
    pub fn with_delete_after(mut self, delete: bool) -> Self {
        self.delete_after = delete;
        self
    }

    /// Receive batch progress snapshots
    pub fn with_progress_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Receive state transitions
    pub fn with_state_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Make polling and batches interruptible
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Output layout
    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    fn transition(&self, state: RunState) {
        info!(state = %state, "Run state changed");
        if let Some(observer) = &self.observer {
            observer.on_state(&state);
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    async fn wait_for_shutdown(&self) {
        match &self.shutdown {
            Some(shutdown) => shutdown.wait_for_shutdown().await,
            None => std::future::pending().await,
        }
    }

    /// Request a new report and materialize it
    pub async fn run(&self, params: &ReportParams) -> Result<RunOutcome, MaterializeError> {
        self.transition(RunState::Requested);
        let request_id = match self.api.create_report(params).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Report request failed");
                self.transition(RunState::Failed);
                return Err(e.into());
            }
        };
        self.resume(&request_id).await
    }

    /// Materialize an existing request; segments already on disk are kept
    pub async fn resume(&self, request_id: &str) -> Result<RunOutcome, MaterializeError> {
        match self.materialize(request_id).await {
            Ok(outcome) => {
                self.transition(RunState::Done);
                Ok(outcome)
            }
            Err(e) => {
                error!(request_id, error = %e, "Run failed");
                self.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    async fn materialize(&self, request_id: &str) -> Result<RunOutcome, MaterializeError> {
        let mut lock = RunLock::open(&self.layout.lock_path(request_id))?;
        let _guard = lock.try_exclusive()?;

        self.wait_until_complete(request_id).await?;

        let instances = self.api.list_instances(request_id).await?;
        if instances.is_empty() {
            return Err(MaterializeError::NoInstances {
                request_id: request_id.to_string(),
            });
        }

        let mut listed: Vec<(String, Vec<Segment>)> = Vec::with_capacity(instances.len());
        for instance_id in instances {
            let segments = self.api.list_segments(&instance_id).await?;
            if segments.is_empty() {
                warn!(request_id, instance_id = %instance_id, "Instance has no segments, skipping");
                continue;
            }
            listed.push((instance_id, segments));
        }
        if listed.is_empty() {
            return Err(MaterializeError::NoSegments {
                request_id: request_id.to_string(),
            });
        }

        let fetcher = Arc::new(SegmentFetcher::new(
            self.source.clone(),
            self.limiter.clone(),
            &self.download,
        ));
        let mut batch = BatchDownloader::new(fetcher, self.download.concurrency);
        if let Some(progress) = &self.progress {
            batch = batch.with_observer(progress.clone());
        }
        if let Some(shutdown) = &self.shutdown {
            batch = batch.with_shutdown(shutdown.clone());
        }

        let total = listed.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, (instance_id, segments)) in listed.into_iter().enumerate() {
            if self.shutdown_requested() {
                return Err(MaterializeError::Cancelled {
                    request_id: request_id.to_string(),
                });
            }
            self.transition(RunState::Fetching {
                instance_id: instance_id.clone(),
                index: index + 1,
                total,
            });

            let dir = self.layout.instance_dir(request_id, &instance_id);
            let report = batch
                .download_segments(&segments, &dir, self.download.overwrite)
                .await?;
            if report.cancelled {
                return Err(MaterializeError::Cancelled {
                    request_id: request_id.to_string(),
                });
            }

            let merged = if self.download.merge && !report.paths.is_empty() {
                self.transition(RunState::Merging {
                    instance_id: instance_id.clone(),
                });
                Some(merge(
                    &report.paths,
                    &self.layout.merged_path(request_id, &instance_id),
                )?)
            } else {
                None
            };

            outcomes.push(InstanceOutcome {
                instance_id,
                dir,
                report,
                merged,
            });
        }

        let manifest = RunManifest::new(
            request_id,
            outcomes.iter().map(summarize).collect(),
        );
        let manifest_path = self.layout.manifest_path(request_id);
        manifest.save(&manifest_path)?;

        let mut outcome = RunOutcome {
            request_id: request_id.to_string(),
            instances: outcomes,
            manifest_path,
            deleted: false,
        };

        let failed = outcome.failed_count();
        if failed > 0 {
            warn!(
                request_id,
                failed,
                "{} segment(s) failed. {}",
                failed,
                crate::fetcher::RESUME_HINT
            );
        } else if self.delete_after {
            self.api.delete_request(request_id).await?;
            outcome.deleted = true;
        }

        info!(
            request_id,
            files = outcome.files().len(),
            failed,
            "Report materialized"
        );
        Ok(outcome)
    }

    async fn wait_until_complete(&self, request_id: &str) -> Result<(), MaterializeError> {
        let max_attempts = self.poll.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if self.shutdown_requested() {
                return Err(MaterializeError::Cancelled {
                    request_id: request_id.to_string(),
                });
            }

            let status = self.api.poll_status(request_id).await?;
            crate::metrics::record_poll(status);
            self.transition(RunState::Polling(status));

            match status {
                ReportStatus::Completed => return Ok(()),
                ReportStatus::Failed => {
                    return Err(MaterializeError::ReportFailed {
                        request_id: request_id.to_string(),
                    })
                }
                ReportStatus::Created | ReportStatus::Processing => {}
            }

            if attempt == max_attempts {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll.interval) => {}
                _ = self.wait_for_shutdown() => {
                    return Err(MaterializeError::Cancelled {
                        request_id: request_id.to_string(),
                    });
                }
            }
        }

        Err(MaterializeError::Timeout {
            request_id: request_id.to_string(),
            attempts: max_attempts,
        })
    }
}

fn summarize(outcome: &InstanceOutcome) -> InstanceSummary {
    InstanceSummary {
        instance_id: outcome.instance_id.clone(),
        segments_total: outcome.report.progress.total,
        written: outcome.report.paths.clone(),
        resumed: outcome.report.resumed,
        skipped: outcome.report.skipped.clone(),
        failed: outcome
            .report
            .failed
            .iter()
            .map(|f| f.segment_id.clone())
            .collect(),
        merged: outcome.merged.as_ref().map(|m| m.output.clone()),
    }
}
