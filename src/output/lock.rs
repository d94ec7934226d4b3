//! Advisory lock guarding a request directory
//!
//! Two processes materializing the same request would race on the same
//! segment paths. The first one to take the lock wins; the second fails fast.

use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::{OutputError, OutputResult};

/// Lock file handle for one request directory.
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish()
    }
}

impl RunLock {
    /// Open (creating if needed) the lock file at `path`
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::IoError(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| OutputError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Take the exclusive lock without blocking.
    ///
    /// The lock is held until the returned guard is dropped.
    pub fn try_exclusive(&mut self) -> OutputResult<RwLockWriteGuard<'_, File>> {
        let path = self.path.display().to_string();
        self.lock.try_write().map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                OutputError::LockError(format!(
                    "{path} is held by another run; wait for it to finish"
                ))
            } else {
                OutputError::LockError(format!("Failed to acquire lock {path}: {e}"))
            }
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
