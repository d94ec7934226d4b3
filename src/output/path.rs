//! Deterministic on-disk layout
//!
//! ```text
//! {root}/{request_id}/instance-{instance_id}/segment-NNN.csv
//! {root}/{request_id}/instance-{instance_id}/merged.csv
//! {root}/{request_id}/manifest.json
//! ```
//!
//! `NNN` is the 1-based position of the segment in discovery order, padded
//! to at least three digits (wider when the instance has more than 999
//! segments) so lexical order equals discovery order.

use std::path::{Path, PathBuf};

/// Name of the merged output inside an instance directory
pub const MERGED_FILE_NAME: &str = "merged.csv";

/// Name of the run manifest inside a request directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Name of the run lock inside a request directory
pub const LOCK_FILE_NAME: &str = ".lock";

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_EXTENSION: &str = "csv";
const MIN_ORDINAL_WIDTH: usize = 3;

/// Path builder rooted at the output directory.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    root: PathBuf,
}

impl ReportLayout {
    /// Layout under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{request_id}`
    pub fn request_dir(&self, request_id: &str) -> PathBuf {
        self.root.join(sanitize_component(request_id))
    }

    /// `{root}/{request_id}/instance-{instance_id}`
    pub fn instance_dir(&self, request_id: &str, instance_id: &str) -> PathBuf {
        self.request_dir(request_id)
            .join(format!("instance-{}", sanitize_component(instance_id)))
    }

    /// Merged output for an instance
    pub fn merged_path(&self, request_id: &str, instance_id: &str) -> PathBuf {
        self.instance_dir(request_id, instance_id)
            .join(MERGED_FILE_NAME)
    }

    /// Run manifest for a request
    pub fn manifest_path(&self, request_id: &str) -> PathBuf {
        self.request_dir(request_id).join(MANIFEST_FILE_NAME)
    }

    /// Run lock for a request
    pub fn lock_path(&self, request_id: &str) -> PathBuf {
        self.request_dir(request_id).join(LOCK_FILE_NAME)
    }
}

/// Zero-padded width for `total` segments
pub fn ordinal_width(total: usize) -> usize {
    let digits = total.max(1).to_string().len();
    digits.max(MIN_ORDINAL_WIDTH)
}

/// File name of the segment at 1-based `ordinal` out of `total`
pub fn segment_file_name(ordinal: usize, total: usize) -> String {
    let width = ordinal_width(total);
    format!("{SEGMENT_PREFIX}{ordinal:0width$}.{SEGMENT_EXTENSION}")
}

/// Whether `name` looks like a file produced by [`segment_file_name`]
pub fn is_segment_file_name(name: &str) -> bool {
    name.strip_prefix(SEGMENT_PREFIX)
        .and_then(|rest| rest.strip_suffix(".csv"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Make a remote identifier safe to use as a single path component.
///
/// Separators, `.` and `..` are replaced so a hostile identifier cannot
/// escape or alias the output root.
pub fn sanitize_component(name: &str) -> String {
    let cleaned = name.replace("..", "__").replace(['/', '\\', ':'], "_");
    if cleaned.is_empty() || cleaned == "." {
        "_".to_string()
    } else {
        cleaned
    }
}
