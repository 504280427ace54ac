//! Advisory locking on the writer's lock file.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};

/// Holds an advisory exclusive lock on `root/index/lock` for the lifetime
/// of the writable engine. Released on drop.
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Attempts to acquire an exclusive advisory lock at `path`, creating
    /// the file if needed. Fails with `Error::Locked` if another writer
    /// already holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| Error::Locked)?;

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
