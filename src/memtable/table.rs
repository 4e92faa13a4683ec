//! MemTable implementation
//!
//! SkipMap-based memtable with atomic size accounting.

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::map::Range;
use crossbeam_skiplist::SkipMap;

use super::MemTableEntry;

/// In-memory table for recent writes
///
/// Every method takes `&self`; structural changes are handled by the skip
/// list itself. Size accounting is approximate when the same key is written
/// from several threads at once.
pub struct MemTable {
    data: SkipMap<Vec<u8>, MemTableEntry>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Insert or overwrite the entry for `key`. Returns the new size.
    pub fn apply(&self, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let added = key.len() + entry.payload_len();
        let removed = self
            .data
            .get(key.as_slice())
            .map(|e| e.key().len() + e.value().payload_len())
            .unwrap_or(0);

        self.data.insert(key, entry);

        let size = self.size.fetch_add(added, Ordering::SeqCst) + added;
        self.shrink(removed);
        size - removed.min(size)
    }

    /// Store a live value. Returns the new size.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.apply(key, MemTableEntry::Value(value))
    }

    /// Store a tombstone. Returns the new size.
    pub fn delete(&self, key: Vec<u8>) -> usize {
        self.apply(key, MemTableEntry::Tombstone)
    }

    /// Look up a key: `Some(Value)`, `Some(Tombstone)`, or `None` if absent
    pub fn lookup(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.get(key).map(|e| e.value().clone())
    }

    /// Drop a key entirely (compaction reclaimed it)
    pub fn remove(&self, key: &[u8]) -> Option<MemTableEntry> {
        let entry = self.data.remove(key)?;
        self.shrink(entry.key().len() + entry.value().payload_len());
        Some(entry.value().clone())
    }

    /// Ordered entries with `low <= key < high`.
    ///
    /// Lazy: entries inserted after the scan started may or may not be seen.
    /// Call again with a new `low` to resume.
    pub fn range_scan<'a>(&'a self, low: &'a [u8], high: &'a [u8]) -> MemTableRange<'a> {
        MemTableRange {
            inner: self
                .data
                .range::<[u8], _>((Bound::Included(low), Bound::Excluded(high))),
        }
    }

    /// Approximate resident size in bytes
    pub fn size_bytes(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size_bytes() >= size_limit
    }

    /// Snapshot of all entries in sorted key order
    pub fn iter(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.data.clear();
        self.size.store(0, Ordering::SeqCst);
    }

    fn shrink(&self, by: usize) {
        if by == 0 {
            return;
        }
        let _ = self
            .size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| Some(s.saturating_sub(by)));
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy ordered iterator returned by [`MemTable::range_scan`]
pub struct MemTableRange<'a> {
    inner: Range<'a, [u8], (Bound<&'a [u8]>, Bound<&'a [u8]>), Vec<u8>, MemTableEntry>,
}

impl Iterator for MemTableRange<'_> {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|e| (e.key().clone(), e.value().clone()))
    }
}
