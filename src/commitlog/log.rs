//! Commit Log
//!
//! Append-only data file of encoded records.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::SyncMode;
use crate::error::{CfgError, Result};

use super::reader::{read_record_at, LogIterator, LogReader};
use super::LogRecord;

/// Appends records to the log file and reads them back by offset.
///
/// Single writer: `append` takes `&mut self`; callers that share a log
/// put it behind a mutex (see [`super::Journal`]).
pub struct CommitLog {
    path: PathBuf,
    file: File,
    /// Logical end of the log (bytes of complete, acknowledged records)
    len: u64,
    sync_mode: SyncMode,
    /// Set when a failed append could not be rolled back
    poisoned: Option<String>,
}

impl CommitLog {
    /// Open or create a log file, positioned at its current end
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            sync_mode,
            poisoned: None,
        })
    }

    /// Append a record and force it to disk.
    ///
    /// Returns the byte offset at which the record starts. On failure any
    /// partially written bytes are cut off again before the error returns.
    pub fn append(&mut self, record: &LogRecord) -> Result<u64> {
        let bytes = record.encode()?;
        self.append_encoded(&bytes)
    }

    /// Append bytes produced by [`LogRecord::encode`]
    pub(crate) fn append_encoded(&mut self, bytes: &[u8]) -> Result<u64> {
        if let Some(reason) = &self.poisoned {
            return Err(CfgError::LogUnavailable(reason.clone()));
        }

        let offset = self.len;
        let result = self
            .file
            .write_all(bytes)
            .and_then(|_| self.force());

        match result {
            Ok(()) => {
                self.len += bytes.len() as u64;
                Ok(offset)
            }
            Err(e) => {
                tracing::error!(
                    "Commit log append at offset {} failed: {}; rolling back",
                    offset,
                    e
                );
                self.rollback(offset);
                Err(CfgError::Io(e))
            }
        }
    }

    /// Read exactly one record starting at `offset`
    pub fn read_at(&self, offset: u64) -> Result<LogRecord> {
        if offset >= self.len {
            return Err(CfgError::OutOfRange(format!(
                "offset {} beyond log end {}",
                offset, self.len
            )));
        }
        read_record_at(&self.path, offset, self.len)
    }

    /// Lazily iterate records from `offset` to the end of the log.
    ///
    /// `offset` must be a record boundary; `offset == file_size()` yields
    /// nothing.
    pub fn scan_from(&self, offset: u64) -> Result<LogIterator> {
        if offset > self.len {
            return Err(CfgError::OutOfRange(format!(
                "scan offset {} beyond log end {}",
                offset, self.len
            )));
        }
        Ok(LogReader::open_range(&self.path, offset, self.len)?.records())
    }

    /// Size of the log in bytes
    pub fn file_size(&self) -> u64 {
        self.len
    }

    /// Cut the log back to `len` bytes (recovery and append rollback)
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(())
    }

    /// Force buffered data to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.force()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether appends are refused after an unrecoverable failure
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn force(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        match self.sync_mode {
            SyncMode::All => self.file.sync_all(),
            SyncMode::Data => self.file.sync_data(),
        }
    }

    /// Undo a partial append so the next record starts at `offset`
    pub(crate) fn rollback(&mut self, offset: u64) {
        if let Err(e) = self.truncate(offset) {
            let reason = format!("rollback to offset {} failed: {}", offset, e);
            tracing::error!("{}; refusing further appends until recovery", reason);
            self.poisoned = Some(reason);
        }
    }
}
