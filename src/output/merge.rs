//! Segment concatenation with header de-duplication
//!
//! Every segment file repeats the same CSV header. The first non-empty line
//! seen across all inputs becomes the header and is written once. The first
//! non-empty line of every later file is dropped when it repeats that header
//! and kept (with a warning) when it does not, so a header-less segment
//! loses no rows. Everything else is appended verbatim.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::atomic::AtomicFile;
use super::path::is_segment_file_name;
use super::OutputError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Merge errors
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// No input paths were given
    #[error("nothing to merge: no segment files were provided")]
    NothingToMerge,

    /// Reading an input failed
    #[error("failed to read {path}: {message}")]
    ReadError {
        /// Input being read
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Writing the merged output failed
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),
}

impl MergeError {
    /// Remediation hint for the user
    pub fn hint(&self) -> &'static str {
        match self {
            Self::NothingToMerge => "Download the report segments first, then merge",
            Self::ReadError { .. } => {
                "Re-run with --overwrite to fetch the unreadable segment again"
            }
            Self::OutputError(_) => "Check free disk space and permissions on the output directory",
        }
    }
}

/// What a merge produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Output path
    pub output: PathBuf,
    /// Inputs that were read
    pub files_merged: usize,
    /// Inputs that did not exist
    pub files_missing: usize,
    /// Header line written, if any input had content
    pub header: Option<String>,
    /// Lines written after the header
    pub data_lines: u64,
}

/// Concatenate `paths` (in the given order) into `output`.
///
/// Missing inputs are skipped, blank lines are dropped everywhere, and the
/// output is replaced atomically. Every merge rewrites the output in full.
pub fn merge(paths: &[PathBuf], output: &Path) -> Result<MergeSummary, MergeError> {
    if paths.is_empty() {
        return Err(MergeError::NothingToMerge);
    }

    let mut summary = MergeSummary {
        output: output.to_path_buf(),
        ..MergeSummary::default()
    };
    let mut writer = BufWriter::new(AtomicFile::create(output)?);

    for path in paths {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Segment file missing, skipping");
                summary.files_missing += 1;
                continue;
            }
            Err(e) => {
                return Err(MergeError::ReadError {
                    path: path.clone(),
                    message: e.to_string(),
                })
            }
        };

        append_file(file, path, &mut writer, &mut summary)?;
        summary.files_merged += 1;
    }

    let file = writer.into_inner().map_err(|e| {
        OutputError::IoError(format!(
            "Failed to flush merged output {}: {}",
            output.display(),
            e.error()
        ))
    })?;
    file.commit()?;

    info!(
        output = %output.display(),
        files = summary.files_merged,
        missing = summary.files_missing,
        rows = summary.data_lines,
        "Merged segment files"
    );
    Ok(summary)
}

fn append_file<W: Write>(
    file: File,
    path: &Path,
    writer: &mut W,
    summary: &mut MergeSummary,
) -> Result<(), MergeError> {
    let read_error = |e: std::io::Error| MergeError::ReadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let write_error = |e: std::io::Error| {
        MergeError::OutputError(OutputError::IoError(format!(
            "Failed to write merged output: {e}"
        )))
    };

    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut line = String::new();
    let mut first_in_file = true;

    loop {
        line.clear();
        if reader.read_line(&mut line).map_err(read_error)? == 0 {
            break;
        }
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            continue;
        }

        let is_file_header = first_in_file;
        first_in_file = false;

        match &summary.header {
            None => {
                summary.header = Some(content.to_string());
            }
            Some(header) if is_file_header && header == content => continue,
            Some(header) => {
                if is_file_header {
                    warn!(
                        path = %path.display(),
                        expected = %header,
                        found = content,
                        "Segment does not start with the canonical header, keeping its first line"
                    );
                }
                summary.data_lines += 1;
            }
        }

        writer.write_all(content.as_bytes()).map_err(write_error)?;
        writer.write_all(b"\n").map_err(write_error)?;
    }
    Ok(())
}

/// Segment files in `dir`, sorted by name (which is discovery order).
pub fn collect_segment_files(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| MergeError::ReadError {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MergeError::ReadError {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let is_segment = entry
            .file_name()
            .to_str()
            .is_some_and(is_segment_file_name);
        if is_segment {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}
