use crate::error::{MemError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive repository lock backed by `.mem/LOCK`.
/// Released when dropped, including on error paths.
pub struct RepoLock {
    _file: File,
}

impl RepoLock {
    /// Try to acquire the lock without blocking. A lock held by another
    /// process is reported as a concurrent modification.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(MemError::io(path))?;

        file.try_lock_exclusive()
            .map_err(|_| MemError::ConcurrentModification {
                detail: format!("repository is locked by another process ({})", path.display()),
            })?;

        Ok(Self { _file: file })
    }
}
