//! Partition lock
//!
//! Advisory lock held for as long as a process works a partition, so two
//! archivers pointed at the same output root cannot interleave checkpoint
//! writes.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on a partition, released on drop.
#[derive(Debug)]
pub struct PartitionLock {
    path: PathBuf,
    #[allow(dead_code)]
    lock: RwLock<File>,
}

impl PartitionLock {
    /// Try to take the lock at `path` without blocking.
    ///
    /// Returns [`ResumeError::Locked`] when another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Self, ResumeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;
        let mut lock = RwLock::new(file);

        match lock.try_write() {
            // The lock lives as long as the descriptor; dropping the guard would unlock it.
            Ok(guard) => std::mem::forget(guard),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(ResumeError::Locked(path.display().to_string()))
            }
            Err(e) => {
                return Err(ResumeError::LockError(format!("Failed to acquire lock: {e}")))
            }
        }

        debug!(path = %path.display(), "Partition lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            lock,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
