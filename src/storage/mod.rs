//! Storage Module
//!
//! The seam between the write path and the on-disk sorted files.
//!
//! ## Responsibilities
//! - Serve point lookups that miss the memtable
//! - Take ownership of a memtable snapshot on flush
//!
//! Sorted-file layout, generations and compaction live behind
//! [`SortedStore`]; the engine never sees them. [`MemoryStore`] is a
//! single-generation stand-in for tests and tools.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::memtable::MemTableEntry;

/// Sorted on-disk generations below the memtable
pub trait SortedStore: Send + Sync {
    /// Latest value for `key`, or `None` if absent or deleted
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Persist a memtable snapshot.
    ///
    /// `entries` are in ascending key order. Tombstones must shadow any
    /// older value the store holds for the key.
    fn flush(&self, entries: &[(Vec<u8>, MemTableEntry)]) -> Result<()>;
}
