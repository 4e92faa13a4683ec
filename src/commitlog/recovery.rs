//! Commit Log Recovery
//!
//! Brings a log/index pair back to a consistent state after a crash and
//! hands back every surviving record for replay.

use std::fs;
use std::path::Path;

use crate::error::{CfgError, Result};

use super::index::INDEX_ENTRY_SIZE;
use super::reader::{LogReader, ScanEnd};
use super::{CommitIndex, CommitLog, LogRecord};

/// Handles recovery of a log/index pair
pub struct LogRecovery;

/// Result of a recovery (or verification) pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of complete records found
    pub records_recovered: u64,

    /// Offset just past the last complete record
    pub valid_len: u64,

    /// Bytes cut (or, for `verify`, that would be cut) from the log tail
    pub truncated_bytes: u64,

    /// Whether the log tail was a partial or corrupt record
    pub was_truncated: bool,

    /// Why the tail was cut, if it was
    pub truncation_reason: Option<String>,

    /// Whether the index disagreed with the log
    pub index_inconsistent: bool,

    /// Whether the index was rebuilt (always false for `verify`)
    pub index_rebuilt: bool,

    /// Timestamp of the last complete record (0 for an empty log)
    pub last_timestamp: u64,
}

impl LogRecovery {
    /// Recover a log/index pair in place.
    ///
    /// This will:
    /// 1. Read all complete records from offset 0
    /// 2. Treat a torn or corrupt tail as the logical end and truncate it
    /// 3. Rebuild the index if it does not match the surviving records
    /// 4. Return all surviving records in order
    pub fn recover(
        log: &mut CommitLog,
        index: &mut CommitIndex,
    ) -> Result<(Vec<LogRecord>, RecoveryReport)> {
        let (records, mut report) = Self::scan(log.path(), log.file_size())?;

        if report.was_truncated {
            tracing::warn!(
                "Truncating commit log {} from {} to {} bytes: {}",
                log.path().display(),
                log.file_size(),
                report.valid_len,
                report.truncation_reason.as_deref().unwrap_or("unknown")
            );
            log.truncate(report.valid_len)?;
        }

        let lengths: Vec<u32> = records.iter().map(|r| r.encoded_len() as u32).collect();
        report.index_inconsistent =
            !index.is_consistent_with(report.valid_len) || index.lengths() != lengths.as_slice();

        if report.index_inconsistent {
            tracing::warn!(
                "Index {} inconsistent with log ({} entries / {} bytes vs {} records / {} bytes)",
                index.path().display(),
                index.len(),
                index.total_length(),
                records.len(),
                report.valid_len
            );
            index.rebuild(log)?;
            report.index_rebuilt = true;
        }

        Ok((records, report))
    }

    /// Inspect a log/index pair without modifying either file
    pub fn verify(log_path: &Path, index_path: &Path) -> Result<RecoveryReport> {
        let log_len = fs::metadata(log_path)?.len();
        let (records, mut report) = Self::scan(log_path, log_len)?;

        let index_bytes = match fs::read(index_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CfgError::Io(e)),
        };
        let expected: Vec<u8> = records
            .iter()
            .flat_map(|r| (r.encoded_len() as u32).to_be_bytes())
            .collect();
        report.index_inconsistent = index_bytes.len() % INDEX_ENTRY_SIZE != 0
            || index_bytes != expected;

        Ok(report)
    }

    /// Read every complete record in `[0, log_len)`
    fn scan(path: &Path, log_len: u64) -> Result<(Vec<LogRecord>, RecoveryReport)> {
        let mut reader = LogReader::open_range(path, 0, log_len)?;
        let mut records = Vec::new();
        let mut report = RecoveryReport::default();

        loop {
            match reader.next_record() {
                Ok(Some((_, record))) => {
                    report.last_timestamp = record.timestamp;
                    records.push(record);
                }
                Ok(None) => break,
                Err(CfgError::CorruptRecord { offset, reason }) => {
                    tracing::warn!("Corrupt record at offset {} during recovery: {}", offset, reason);
                    report.truncation_reason = Some(reason);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        report.records_recovered = records.len() as u64;
        report.valid_len = reader.position();
        if let ScanEnd::Torn { reason, .. } = reader.scan_end() {
            report.truncation_reason = Some(reason.clone());
        }
        report.truncated_bytes = log_len - report.valid_len;
        report.was_truncated = report.truncated_bytes > 0;

        Ok((records, report))
    }
}
