//! In-memory sorted store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::memtable::MemTableEntry;

use super::SortedStore;

/// One sorted generation kept in a `BTreeMap`.
///
/// ## Concurrency:
/// - `data`: RwLock (many concurrent lookups, exclusive flush)
/// - `flushes`: atomic counter
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    flushes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a live value
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Number of completed flushes
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl SortedStore for MemoryStore {
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn flush(&self, entries: &[(Vec<u8>, MemTableEntry)]) -> Result<()> {
        let mut data = self.data.write();
        for (key, entry) in entries {
            match entry {
                MemTableEntry::Value(value) => {
                    data.insert(key.clone(), value.clone());
                }
                MemTableEntry::Tombstone => {
                    data.remove(key);
                }
            }
        }
        let n = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("MemoryStore flush #{}: {} entries", n, entries.len());
        Ok(())
    }
}
