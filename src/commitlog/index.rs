//! Commit Index
//!
//! Parallel file holding the encoded length of every log record as a
//! big-endian u32, so record `i` can be located without decoding records
//! `0..i`. The lengths and their running offsets are also kept in memory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::SyncMode;
use crate::error::{CfgError, Result};

use super::CommitLog;

/// Width of one index entry
pub const INDEX_ENTRY_SIZE: usize = 4;

/// Index of record lengths, kept in lockstep with a [`CommitLog`]
pub struct CommitIndex {
    path: PathBuf,
    file: File,
    /// Encoded length of each record
    lengths: Vec<u32>,
    /// Start offset of each record in the log
    offsets: Vec<u64>,
    /// Sum of all lengths (the log size the index implies)
    total: u64,
    /// Bytes on disk that do not form a whole entry
    partial_tail: usize,
    sync_mode: SyncMode,
}

impl CommitIndex {
    /// Open or create an index file and load its entries
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let bytes = fs::read(path)?;
        let partial_tail = bytes.len() % INDEX_ENTRY_SIZE;
        if partial_tail != 0 {
            tracing::warn!(
                "Index {} ends with a partial entry ({} bytes)",
                path.display(),
                partial_tail
            );
        }

        let mut index = Self {
            path: path.to_path_buf(),
            file,
            lengths: Vec::with_capacity(bytes.len() / INDEX_ENTRY_SIZE),
            offsets: Vec::with_capacity(bytes.len() / INDEX_ENTRY_SIZE),
            total: 0,
            partial_tail,
            sync_mode,
        };
        for chunk in bytes.chunks_exact(INDEX_ENTRY_SIZE) {
            let mut raw = [0u8; INDEX_ENTRY_SIZE];
            raw.copy_from_slice(chunk);
            index.push(u32::from_be_bytes(raw));
        }
        Ok(index)
    }

    /// Record the length of the record just appended to the log
    pub fn append(&mut self, length: u32) -> Result<()> {
        if self.partial_tail != 0 {
            return Err(CfgError::LogUnavailable(
                "index has a partial trailing entry; rebuild required".to_string(),
            ));
        }

        let result = self
            .file
            .write_all(&length.to_be_bytes())
            .and_then(|_| self.force());
        if let Err(e) = result {
            // Best effort: drop whatever part of the entry reached the file.
            let entries_len = (self.lengths.len() * INDEX_ENTRY_SIZE) as u64;
            if let Err(trunc) = self.file.set_len(entries_len) {
                tracing::error!("Index rollback failed: {}", trunc);
                self.partial_tail = 1;
            }
            return Err(CfgError::Io(e));
        }

        self.push(length);
        Ok(())
    }

    /// Length of record `record_no`, O(1)
    pub fn length_of(&self, record_no: usize) -> Result<u32> {
        self.lengths
            .get(record_no)
            .copied()
            .ok_or_else(|| self.out_of_range(record_no))
    }

    /// Starting log offset of record `record_no`, O(1) from the cached sums
    pub fn offset_of(&self, record_no: usize) -> Result<u64> {
        self.offsets
            .get(record_no)
            .copied()
            .ok_or_else(|| self.out_of_range(record_no))
    }

    /// Number of records indexed
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Log size implied by the index
    pub fn total_length(&self) -> u64 {
        self.total
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the index describes a log of exactly `log_size` bytes
    pub fn is_consistent_with(&self, log_size: u64) -> bool {
        self.partial_tail == 0 && self.total == log_size
    }

    /// Reconstruct the index by scanning `log` from offset 0.
    ///
    /// The new index is written to a temporary file and renamed over the old
    /// one. Running it twice over the same log yields identical contents.
    /// Returns the number of records indexed.
    pub fn rebuild(&mut self, log: &CommitLog) -> Result<usize> {
        let mut lengths = Vec::new();
        for item in log.scan_from(0)? {
            let (_, record) = item?;
            lengths.push(record.encoded_len() as u32);
        }
        self.rewrite(&lengths)?;
        tracing::info!(
            "Rebuilt index {} from log: {} records, {} bytes",
            self.path.display(),
            lengths.len(),
            self.total
        );
        Ok(lengths.len())
    }

    fn rewrite(&mut self, lengths: &[u32]) -> Result<()> {
        let tmp_path = self.path.with_extension("idx.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let mut buf = Vec::with_capacity(lengths.len() * INDEX_ENTRY_SIZE);
            for length in lengths {
                buf.extend_from_slice(&length.to_be_bytes());
            }
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.lengths.clear();
        self.offsets.clear();
        self.total = 0;
        self.partial_tail = 0;
        for &length in lengths {
            self.push(length);
        }
        Ok(())
    }

    fn push(&mut self, length: u32) {
        self.offsets.push(self.total);
        self.lengths.push(length);
        self.total += length as u64;
    }

    fn force(&mut self) -> std::io::Result<()> {
        match self.sync_mode {
            SyncMode::All => self.file.sync_all(),
            SyncMode::Data => self.file.sync_data(),
        }
    }

    fn out_of_range(&self, record_no: usize) -> CfgError {
        CfgError::OutOfRange(format!(
            "record {} not in index of {} entries",
            record_no,
            self.lengths.len()
        ))
    }
}
