//! Journal
//!
//! The commit log and its index opened, recovered and appended to as one
//! unit, together with the directory lock that owns them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SyncMode;
use crate::error::{CfgError, Result};

use super::dir_lock::DirLock;
use super::reader::LogIterator;
use super::{CommitIndex, CommitLog, LogRecord, LogRecovery, RecoveryReport};

/// Where an appended record landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Byte offset of the record in the log
    pub offset: u64,

    /// Position of the record in the index (0-based)
    pub record_no: u64,

    /// Encoded length written to the index
    pub length: u32,
}

/// Log + index pair in one data directory
pub struct Journal {
    dir: PathBuf,
    log: CommitLog,
    index: CommitIndex,
    last_timestamp: u64,
    /// Declared last so the files close before the lock file goes away
    _lock: DirLock,
}

impl Journal {
    pub const LOG_FILENAME: &'static str = "commit.log";
    pub const INDEX_FILENAME: &'static str = "commit.idx";
    pub const LOCK_FILENAME: &'static str = "commit.lock";

    /// Open (or create) the pair in `dir` and run recovery.
    ///
    /// Returns the journal, every surviving record in log order, and the
    /// recovery report.
    pub fn open(
        dir: &Path,
        sync_mode: SyncMode,
        force: bool,
    ) -> Result<(Self, Vec<LogRecord>, RecoveryReport)> {
        if dir.is_file() {
            return Err(CfgError::Config(format!("{} is a file", dir.display())));
        }
        fs::create_dir_all(dir)?;

        let lock = DirLock::acquire(&dir.join(Self::LOCK_FILENAME), force)?;
        let mut log = CommitLog::open(&dir.join(Self::LOG_FILENAME), sync_mode)?;
        let mut index = CommitIndex::open(&dir.join(Self::INDEX_FILENAME), sync_mode)?;

        let (records, report) = LogRecovery::recover(&mut log, &mut index)?;

        let journal = Self {
            dir: dir.to_path_buf(),
            log,
            index,
            last_timestamp: report.last_timestamp,
            _lock: lock,
        };
        Ok((journal, records, report))
    }

    /// Append a record to the log, then its length to the index.
    ///
    /// The record is on disk when this returns `Ok`. If either file fails
    /// the log is cut back so that neither file keeps the record.
    pub fn append(&mut self, record: &LogRecord) -> Result<AppendReceipt> {
        if record.timestamp < self.last_timestamp {
            return Err(CfgError::InvalidRecord(format!(
                "timestamp {} precedes last logged timestamp {}",
                record.timestamp, self.last_timestamp
            )));
        }

        let bytes = record.encode()?;
        let length = bytes.len() as u32;
        let record_no = self.index.len() as u64;

        let offset = self.log.append_encoded(&bytes)?;
        if let Err(e) = self.index.append(length) {
            tracing::error!(
                "Index append for record {} failed: {}; rolling back log to {}",
                record_no,
                e,
                offset
            );
            self.log.rollback(offset);
            return Err(e);
        }

        self.last_timestamp = record.timestamp;
        tracing::trace!("Appended {:?} record {} at offset {}", record.op, record_no, offset);
        Ok(AppendReceipt { offset, record_no, length })
    }

    /// Read the record starting at byte `offset`
    pub fn read_at(&self, offset: u64) -> Result<LogRecord> {
        self.log.read_at(offset)
    }

    /// Read record `record_no` via the index
    pub fn read_record(&self, record_no: usize) -> Result<LogRecord> {
        let offset = self.index.offset_of(record_no)?;
        self.log.read_at(offset)
    }

    /// The `n`-th record counted from the end (1 = most recent)
    pub fn read_from_end(&self, n: usize) -> Result<LogRecord> {
        let len = self.index.len();
        if n == 0 || n > len {
            return Err(CfgError::OutOfRange(format!(
                "position {} from end of a log with {} records",
                n, len
            )));
        }
        self.read_record(len - n)
    }

    /// The last `n` records, newest first
    pub fn records_from_end(&self, n: usize) -> Result<Vec<LogRecord>> {
        (1..=n).map(|i| self.read_from_end(i)).collect()
    }

    /// Lazily iterate records from byte `offset`
    pub fn scan_from(&self, offset: u64) -> Result<LogIterator> {
        self.log.scan_from(offset)
    }

    /// Copy log and index into `dest` as a matched pair
    pub fn backup(&self, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;
        fs::copy(self.log.path(), dest.join(Self::LOG_FILENAME))?;
        fs::copy(self.index.path(), dest.join(Self::INDEX_FILENAME))?;
        tracing::info!(
            "Backed up {} records ({} bytes) to {}",
            self.index.len(),
            self.log.file_size(),
            dest.display()
        );
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    pub fn log_size(&self) -> u64 {
        self.log.file_size()
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log(&self) -> &CommitLog {
        &self.log
    }

    pub fn index(&self) -> &CommitIndex {
        &self.index
    }

    /// Rebuild the index from the log
    pub fn rebuild_index(&mut self) -> Result<usize> {
        self.index.rebuild(&self.log)
    }
}
