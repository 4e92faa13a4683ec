//! Commit Log Reader
//!
//! Sequential and positional reads of the log file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{CfgError, Result};

use super::record::{RecordHeader, HEADER_SIZE};
use super::LogRecord;

/// How a scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    /// Still iterating
    Open,

    /// Reached the end exactly on a record boundary
    Clean,

    /// The last record is incomplete (partial write); `offset` is where it starts
    Torn { offset: u64, reason: String },

    /// A complete header failed validation at `offset`
    Corrupt { offset: u64 },

    /// Reading the record at `offset` failed with an I/O error
    Failed { offset: u64, reason: String },
}

/// Reads records sequentially from a log file
pub struct LogReader {
    reader: BufReader<File>,
    position: u64,
    /// End of readable data, fixed when the reader was opened
    end: u64,
    state: ScanEnd,
}

impl LogReader {
    /// Open a log file for reading from the start
    pub fn open(path: &Path) -> Result<Self> {
        let end = std::fs::metadata(path)?.len();
        Self::open_range(path, 0, end)
    }

    /// Open a reader over `[start, end)` of the file
    pub fn open_range(path: &Path, start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(CfgError::OutOfRange(format!(
                "read start {} beyond end {}",
                start, end
            )));
        }
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;

        Ok(Self {
            reader: BufReader::new(file),
            position: start,
            end,
            state: ScanEnd::Open,
        })
    }

    /// Read the next record along with its offset.
    ///
    /// Returns `Ok(None)` at the end of the log, including when the tail is
    /// a partial record; inspect [`LogReader::scan_end`] to tell them apart.
    pub fn next_record(&mut self) -> Result<Option<(u64, LogRecord)>> {
        if self.state != ScanEnd::Open {
            return Ok(None);
        }

        let offset = self.position;
        let remaining = self.end - offset;
        if remaining == 0 {
            self.state = ScanEnd::Clean;
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(self.torn(offset, format!("incomplete header: {} bytes", remaining)));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header_buf) {
            return self.read_failed(offset, e);
        }
        let header = match RecordHeader::parse(&header_buf, offset) {
            Ok(h) => h,
            Err(e) => {
                self.state = ScanEnd::Corrupt { offset };
                return Err(e);
            }
        };

        let record_len = header.record_len() as u64;
        if record_len > remaining {
            return Ok(self.torn(
                offset,
                format!("short read: record needs {} bytes, {} remain", record_len, remaining),
            ));
        }

        let mut body = vec![0u8; header.body_len()];
        if let Err(e) = self.reader.read_exact(&mut body) {
            return self.read_failed(offset, e);
        }
        let record = match header.into_record(&body, offset) {
            Ok(r) => r,
            Err(e) => {
                self.state = ScanEnd::Corrupt { offset };
                return Err(e);
            }
        };

        self.position += record_len;
        Ok(Some((offset, record)))
    }

    /// Offset of the next record to be read
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn scan_end(&self) -> &ScanEnd {
        &self.state
    }

    /// Iterate over all remaining records
    pub fn records(self) -> LogIterator {
        LogIterator { reader: self }
    }

    fn torn(&mut self, offset: u64, reason: String) -> Option<(u64, LogRecord)> {
        tracing::debug!("Torn record at offset {}: {}", offset, reason);
        self.state = ScanEnd::Torn { offset, reason };
        None
    }

    /// End the scan on a failed read.
    ///
    /// A file that shrank under the reader is a torn tail; anything else is
    /// returned once and then the reader stays finished.
    fn read_failed(
        &mut self,
        offset: u64,
        err: std::io::Error,
    ) -> Result<Option<(u64, LogRecord)>> {
        if err.kind() == ErrorKind::UnexpectedEof {
            return Ok(self.torn(offset, format!("file shrank during read: {}", err)));
        }
        self.state = ScanEnd::Failed {
            offset,
            reason: err.to_string(),
        };
        Err(CfgError::Io(err))
    }
}

/// Iterator over `(offset, record)` pairs.
///
/// Finite: stops at the end of the log, at a torn tail, or after yielding
/// one corruption or I/O error.
pub struct LogIterator {
    reader: LogReader,
}

impl LogIterator {
    /// How the scan ended (meaningful once the iterator returned `None`)
    pub fn scan_end(&self) -> &ScanEnd {
        self.reader.scan_end()
    }

    /// Offset just past the last record yielded
    pub fn position(&self) -> u64 {
        self.reader.position()
    }
}

impl Iterator for LogIterator {
    type Item = Result<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record().transpose()
    }
}

/// Positional read of one record, bounded by `log_len`
pub(crate) fn read_record_at(path: &Path, offset: u64, log_len: u64) -> Result<LogRecord> {
    let mut reader = LogReader::open_range(path, offset, log_len)?;
    match reader.next_record()? {
        Some((_, record)) => Ok(record),
        None => match reader.scan_end() {
            ScanEnd::Torn { reason, .. } => Err(CfgError::corrupt(offset, reason.clone())),
            _ => Err(CfgError::OutOfRange(format!("no record at offset {}", offset))),
        },
    }
}
