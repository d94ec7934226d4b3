//! On-disk artifacts: layout, atomic writes, merging, run lock and manifest

pub mod atomic;
pub mod lock;
pub mod manifest;
pub mod merge;
pub mod path;

pub use atomic::{write_atomic, AtomicFile};
pub use lock::RunLock;
pub use manifest::{InstanceSummary, RunManifest};
pub use merge::{collect_segment_files, merge, MergeError, MergeSummary};
pub use path::{segment_file_name, ReportLayout, MERGED_FILE_NAME};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Another process holds the run lock
    #[error("lock error: {0}")]
    LockError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
