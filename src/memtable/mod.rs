//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory, concurrent readers
//! - Track size for flush triggers
//! - Ordered iteration and range scans for flush/compaction
//!
//! ## Data Structure Choice
//! A lock-free skip list (`crossbeam_skiplist::SkipMap`):
//! - Expected O(log n) insert/search/remove
//! - Keys kept in byte-lexicographic order
//! - Readers never block writers

mod table;

pub use table::{MemTable, MemTableRange};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Bytes the entry's payload accounts for
    pub fn payload_len(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, MemTableEntry::Tombstone)
    }
}
