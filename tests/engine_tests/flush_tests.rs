//! Tests for Engine flush and the sorted store read path
//!
//! These tests verify:
//! - Flush hands the memtable to the store and empties it
//! - Reads fall through to the store after a flush
//! - Tombstones shadow stored values
//! - A definite filter miss never reaches the store

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cfgdb::clock::SystemClock;
use cfgdb::memtable::MemTableEntry;
use cfgdb::storage::{MemoryStore, SortedStore};
use cfgdb::{CfgError, Config, Engine, Result};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// MemoryStore that counts lookups
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    lookups: AtomicUsize,
}

impl CountingStore {
    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SortedStore for CountingStore {
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(key)
    }

    fn flush(&self, entries: &[(Vec<u8>, MemTableEntry)]) -> Result<()> {
        self.inner.flush(entries)
    }
}

/// Store whose flush always fails
struct BrokenStore;

impl SortedStore for BrokenStore {
    fn lookup(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn flush(&self, _entries: &[(Vec<u8>, MemTableEntry)]) -> Result<()> {
        Err(CfgError::Storage("disk full".to_string()))
    }
}

fn test_config(dir: &Path) -> Config {
    Config::builder().data_dir(dir).filter_capacity(4096).build()
}

fn open_with_store(dir: &Path, store: Arc<dyn SortedStore>) -> Engine {
    Engine::open_with(test_config(dir), Arc::new(SystemClock), Some(store)).unwrap()
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_without_store_fails() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path())).unwrap();
    engine.insert(b"a", b"1").unwrap();

    assert!(matches!(engine.flush(), Err(CfgError::Storage(_))));
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_flush_empty_memtable() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = open_with_store(temp_dir.path(), store.clone());

    assert_eq!(engine.flush().unwrap(), 0);
    assert_eq!(store.flush_count(), 0);
}

#[test]
fn test_flush_moves_entries_to_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = open_with_store(temp_dir.path(), store.clone());

    engine.insert(b"a", b"1").unwrap();
    engine.insert(b"b", b"2").unwrap();
    engine.insert(b"c", b"3").unwrap();
    engine.delete(b"c").unwrap();

    assert_eq!(engine.flush().unwrap(), 3);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.memtable_size(), 0);
    assert_eq!(store.flush_count(), 1);
    assert_eq!(store.len(), 2);

    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"c").unwrap(), None);

    // The commit log keeps everything
    assert_eq!(engine.record_count(), 4);
}

#[test]
fn test_memtable_shadows_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = open_with_store(temp_dir.path(), store.clone());

    engine.insert(b"a", b"old").unwrap();
    engine.insert(b"b", b"kept").unwrap();
    engine.flush().unwrap();

    engine.insert(b"a", b"new").unwrap();
    engine.delete(b"b").unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"new".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), None);

    engine.flush().unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"new".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), None);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_failed_flush_keeps_memtable() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_with_store(temp_dir.path(), Arc::new(BrokenStore));
    engine.insert(b"a", b"1").unwrap();

    assert!(matches!(engine.flush(), Err(CfgError::Storage(_))));
    assert_eq!(engine.memtable_entry_count(), 1);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_close_flushes_to_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let engine = open_with_store(temp_dir.path(), store.clone());
    engine.insert(b"a", b"1").unwrap();

    engine.close().unwrap();

    assert_eq!(store.flush_count(), 1);
    assert_eq!(store.lookup(b"a").unwrap(), Some(b"1".to_vec()));
}

// =============================================================================
// Read Path Tests
// =============================================================================

#[test]
fn test_filter_miss_skips_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::default());
    let engine = open_with_store(temp_dir.path(), store.clone());

    assert_eq!(engine.get(b"never-written").unwrap(), None);
    assert_eq!(store.lookups(), 0);

    engine.insert(b"a", b"1").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(store.lookups(), 1);
}

#[test]
fn test_memtable_hit_skips_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::default());
    let engine = open_with_store(temp_dir.path(), store.clone());

    engine.insert(b"a", b"1").unwrap();
    engine.delete(b"a").unwrap();

    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(store.lookups(), 0);
}
