//! Commit Log Module
//!
//! Provides durability through an append-only record log and a parallel
//! length index.
//!
//! ## Responsibilities
//! - Encode/decode mutation records (fixed 16-byte header, then key, value)
//! - Append records and force them to disk before acknowledging
//! - Keep one index entry per record so any record can be located directly
//! - Crash recovery: cut torn tails, rebuild a stale index, replay
//!
//! ## File Format
//! ```text
//! commit.log                               commit.idx
//! ┌───────────────────────────────────┐   ┌──────────┐
//! │ Record 0                          │   │ len0 (4) │
//! │ ┌──────┬────┬───────┬──────┬────┐ │   ├──────────┤
//! │ │ts (8)│op+kl│vl (4)│ key  │val │ │   │ len1 (4) │
//! │ └──────┴────┴───────┴──────┴────┘ │   ├──────────┤
//! ├───────────────────────────────────┤   │ ...      │
//! │ Record 1 ...                      │   └──────────┘
//! └───────────────────────────────────┘
//! ```
//! `sum(len_i) == size(commit.log)` whenever the pair is consistent.

mod dir_lock;
mod index;
mod journal;
mod log;
mod reader;
mod record;
mod recovery;

pub use index::{CommitIndex, INDEX_ENTRY_SIZE};
pub use journal::{AppendReceipt, Journal};
pub use log::CommitLog;
pub use reader::{LogIterator, LogReader, ScanEnd};
pub use record::{
    LogRecord, OpType, RecordHeader, HEADER_SIZE, MAX_KEY_LEN, MAX_RECORD_LEN, MAX_VALUE_LEN,
};
pub use recovery::{LogRecovery, RecoveryReport};
