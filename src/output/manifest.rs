//! Per-request run summary persisted next to the segment files

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::atomic::write_atomic;
use super::{OutputError, OutputResult};

/// Manifest schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Outcome of one instance within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    /// Remote instance identifier
    pub instance_id: String,
    /// Segments listed for the instance
    pub segments_total: u64,
    /// Segment files present after the run
    pub written: Vec<PathBuf>,
    /// Segments already on disk before the run
    pub resumed: u64,
    /// Segment ids without a source location
    pub skipped: Vec<String>,
    /// Segment ids that exhausted their retries
    pub failed: Vec<String>,
    /// Merged output, when merging was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<PathBuf>,
}

/// Summary of a materialization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    schema_version: String,
    /// Remote request identifier
    pub request_id: String,
    /// One entry per processed instance
    pub instances: Vec<InstanceSummary>,
    /// Completion time (milliseconds since epoch)
    pub completed_at: i64,
}

impl RunManifest {
    /// Manifest for `request_id`, stamped now
    pub fn new(request_id: impl Into<String>, instances: Vec<InstanceSummary>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            request_id: request_id.into(),
            instances,
            completed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Total segments that exhausted retries across instances
    pub fn failed_count(&self) -> usize {
        self.instances.iter().map(|i| i.failed.len()).sum()
    }

    /// Total segment files present across instances
    pub fn written_count(&self) -> usize {
        self.instances.iter().map(|i| i.written.len()).sum()
    }

    /// Atomically write the manifest as pretty JSON
    pub fn save(&self, path: &Path) -> OutputResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        write_atomic(path, json.as_bytes())?;
        debug!(path = %path.display(), "Run manifest saved");
        Ok(())
    }

    /// Load a manifest written by [`RunManifest::save`]
    pub fn load(path: &Path) -> OutputResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OutputError::IoError(format!("Failed to read {}: {e}", path.display())))?;
        let manifest: Self = serde_json::from_str(&contents)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(OutputError::SerializationError(format!(
                "manifest schema {} is not supported (expected {SCHEMA_VERSION})",
                manifest.schema_version
            )));
        }
        Ok(manifest)
    }
}
