//! Data directory ownership
//!
//! A `commit.lock` file marks the log/index pair as open. It holds the
//! owner's process id and is removed again on drop.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{CfgError, Result};

pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    /// Create the lock file exclusively.
    ///
    /// With `force`, an existing lock file (left by a crashed process) is
    /// removed first.
    pub fn acquire(path: &Path, force: bool) -> Result<Self> {
        Self::acquire_with(path, force, |file| {
            writeln!(file, "{}", std::process::id())?;
            file.sync_all()
        })
    }

    /// Create the lock file, then fill it with `stamp`.
    ///
    /// A failed stamp removes the file again so the directory is not left
    /// locked by nobody.
    fn acquire_with<S>(path: &Path, force: bool, stamp: S) -> Result<Self>
    where
        S: FnOnce(&mut File) -> io::Result<()>,
    {
        if force && path.exists() {
            tracing::warn!("Removing stale lock file {}", path.display());
            fs::remove_file(path)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let dir = path.parent().unwrap_or(path);
                return Err(CfgError::DirectoryLocked(dir.display().to_string()));
            }
            Err(e) => return Err(CfgError::Io(e)),
        };
        let lock = Self { path: path.to_path_buf() };

        if let Err(e) = stamp(&mut file) {
            drop(file);
            drop(lock);
            return Err(CfgError::Io(e));
        }

        Ok(lock)
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!("Could not remove lock file {}: {}", self.path.display(), e);
        }
    }
}
