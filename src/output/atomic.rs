//! Write-to-temp-then-rename file replacement
//!
//! The temp file lives in the destination directory so the final rename
//! never crosses filesystems. A reader sees either the old file, the new
//! one, or nothing; never a partial write.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{OutputError, OutputResult};

/// A file that only appears at its final path on [`AtomicFile::commit`].
///
/// Dropping without committing deletes the temp file.
#[derive(Debug)]
pub struct AtomicFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl AtomicFile {
    /// Start a new atomic write targeting `target`
    pub fn create(target: &Path) -> OutputResult<Self> {
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(parent)
            .map_err(|e| {
                OutputError::IoError(format!(
                    "Failed to create temp file in {}: {e}",
                    parent.display()
                ))
            })?;
        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Final destination
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush, fsync and rename over the target
    pub fn commit(mut self) -> OutputResult<PathBuf> {
        self.temp
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush temp file: {e}")))?;
        self.temp
            .as_file()
            .sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync temp file: {e}")))?;
        self.temp.persist(&self.target).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to move temp file into {}: {}",
                self.target.display(),
                e.error
            ))
        })?;

        // Make the rename durable
        if let Some(parent) = self.target.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(self.target)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Atomically replace `target` with `data`
pub fn write_atomic(target: &Path, data: &[u8]) -> OutputResult<()> {
    let mut file = AtomicFile::create(target)?;
    file.write_all(data).map_err(|e| {
        OutputError::IoError(format!("Failed to write {}: {e}", target.display()))
    })?;
    file.commit()?;
    Ok(())
}
