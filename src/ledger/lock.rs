//! Exclusive lock serialising load → invoke → save cycles on one snapshot file.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::StoreError;

/// Held for the whole cycle; released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Blocks until `<state_path>.lock` is exclusively ours.
    pub fn acquire(state_path: &Path) -> Result<Self, StoreError> {
        let path = Self::lock_path(state_path);
        fs::create_dir_all(super::parent_dir(&path))?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        debug!(path = %path.display(), "state lock acquired");
        Ok(Self { file, path })
    }

    pub fn lock_path(state_path: &Path) -> PathBuf {
        let mut name = OsString::from(state_path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), "state lock release failed: {err}");
        }
    }
}
