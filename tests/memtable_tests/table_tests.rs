//! MemTable Tests
//!
//! Tests verify:
//! - Apply / lookup / remove
//! - Size tracking across overwrites, tombstones and removals
//! - Tombstones shadow earlier values
//! - Sorted iteration and half-open range scans
//! - Concurrent access without external locking

use std::sync::Arc;
use std::thread;

use cfgdb::memtable::{MemTable, MemTableEntry};

fn value(v: &[u8]) -> Option<MemTableEntry> {
    Some(MemTableEntry::Value(v.to_vec()))
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size_bytes(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_lookup() {
    let memtable = MemTable::new();
    memtable.put(b"key1".to_vec(), b"value1".to_vec());

    assert_eq!(memtable.lookup(b"key1"), value(b"value1"));
    assert_eq!(memtable.lookup(b"missing"), None);
}

#[test]
fn test_apply_overwrites_existing() {
    let memtable = MemTable::new();

    memtable.apply(b"key".to_vec(), MemTableEntry::Value(b"v1".to_vec()));
    memtable.apply(b"key".to_vec(), MemTableEntry::Value(b"v2".to_vec()));

    assert_eq!(memtable.entry_count(), 1);
    assert_eq!(memtable.lookup(b"key"), value(b"v2"));
}

#[test]
fn test_delete_creates_tombstone() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"value".to_vec());
    memtable.delete(b"key".to_vec());

    assert_eq!(memtable.lookup(b"key"), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_delete_nonexistent_key() {
    let memtable = MemTable::new();
    memtable.delete(b"ghost".to_vec());

    assert_eq!(memtable.lookup(b"ghost"), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_put_after_delete() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"v1".to_vec());
    memtable.delete(b"key".to_vec());
    memtable.put(b"key".to_vec(), b"v2".to_vec());

    assert_eq!(memtable.lookup(b"key"), value(b"v2"));
}

#[test]
fn test_remove_drops_key() {
    let memtable = MemTable::new();
    memtable.put(b"a".to_vec(), b"1".to_vec());
    memtable.delete(b"b".to_vec());

    assert_eq!(memtable.remove(b"a"), value(b"1"));
    assert_eq!(memtable.remove(b"b"), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.remove(b"c"), None);

    assert!(memtable.is_empty());
    assert_eq!(memtable.lookup(b"a"), None);
    assert_eq!(memtable.size_bytes(), 0);
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_tracking_put() {
    let memtable = MemTable::new();
    let size = memtable.put(b"key".to_vec(), b"value".to_vec());

    assert_eq!(size, b"key".len() + b"value".len());
    assert_eq!(memtable.size_bytes(), size);
}

#[test]
fn test_size_tracking_overwrite() {
    let memtable = MemTable::new();

    memtable.put(b"key".to_vec(), b"short".to_vec());
    assert_eq!(memtable.size_bytes(), 3 + 5);

    memtable.put(b"key".to_vec(), b"much_longer_value".to_vec());
    assert_eq!(memtable.size_bytes(), 3 + 17);

    memtable.put(b"key".to_vec(), b"x".to_vec());
    assert_eq!(memtable.size_bytes(), 3 + 1);
}

#[test]
fn test_size_tracking_delete() {
    let memtable = MemTable::new();
    memtable.put(b"key".to_vec(), b"value".to_vec());
    memtable.delete(b"key".to_vec());

    // Tombstone = just key
    assert_eq!(memtable.size_bytes(), b"key".len());
}

#[test]
fn test_should_flush() {
    let memtable = MemTable::new();
    memtable.put(b"12345".to_vec(), b"67890".to_vec());

    assert!(!memtable.should_flush(11));
    assert!(memtable.should_flush(10));
    assert!(memtable.should_flush(5));
}

#[test]
fn test_clear() {
    let memtable = MemTable::new();
    memtable.put(b"a".to_vec(), b"1".to_vec());
    memtable.delete(b"b".to_vec());

    memtable.clear();

    assert!(memtable.is_empty());
    assert_eq!(memtable.size_bytes(), 0);
    assert_eq!(memtable.lookup(b"a"), None);
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_iter_sorted_order() {
    let memtable = MemTable::new();
    for key in [&b"cherry"[..], b"apple", b"banana", b"\x00first", b"zz"] {
        memtable.put(key.to_vec(), b"v".to_vec());
    }

    let keys: Vec<Vec<u8>> = memtable.iter().into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        keys,
        vec![
            b"\x00first".to_vec(),
            b"apple".to_vec(),
            b"banana".to_vec(),
            b"cherry".to_vec(),
            b"zz".to_vec(),
        ]
    );
}

#[test]
fn test_iter_includes_tombstones() {
    let memtable = MemTable::new();
    memtable.put(b"a".to_vec(), b"1".to_vec());
    memtable.delete(b"b".to_vec());

    let entries = memtable.iter();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1], (b"b".to_vec(), MemTableEntry::Tombstone));
}

#[test]
fn test_byte_order_not_length_order() {
    let memtable = MemTable::new();
    memtable.put(b"b".to_vec(), b"1".to_vec());
    memtable.put(b"aaaa".to_vec(), b"2".to_vec());

    let entries = memtable.iter();
    assert_eq!(entries[0].0, b"aaaa".to_vec());
}

// =============================================================================
// Range Scan Tests
// =============================================================================

fn numbered(n: usize) -> MemTable {
    let memtable = MemTable::new();
    for i in 0..n {
        memtable.put(format!("key{:03}", i).into_bytes(), format!("{}", i).into_bytes());
    }
    memtable
}

#[test]
fn test_range_scan_half_open() {
    let memtable = numbered(20);

    let keys: Vec<Vec<u8>> = memtable
        .range_scan(b"key005", b"key010")
        .map(|(k, _)| k)
        .collect();

    assert_eq!(keys.len(), 5);
    assert_eq!(keys.first().unwrap(), &b"key005".to_vec());
    assert_eq!(keys.last().unwrap(), &b"key009".to_vec());
}

#[test]
fn test_range_scan_bounds_between_keys() {
    let memtable = numbered(10);

    let keys: Vec<Vec<u8>> = memtable
        .range_scan(b"key0025", b"key0065")
        .map(|(k, _)| k)
        .collect();

    assert_eq!(keys, vec![b"key003".to_vec(), b"key004".to_vec(), b"key005".to_vec(), b"key006".to_vec()]);
}

#[test]
fn test_range_scan_empty_range() {
    let memtable = numbered(10);

    assert_eq!(memtable.range_scan(b"key005", b"key005").count(), 0);
    assert_eq!(memtable.range_scan(b"zzz", b"zzzz").count(), 0);
}

#[test]
fn test_range_scan_restartable() {
    let memtable = numbered(10);

    // Read in pages of 3, resuming after the last key seen
    let mut seen = Vec::new();
    let mut low = b"key000".to_vec();
    loop {
        let page: Vec<Vec<u8>> = memtable
            .range_scan(&low, b"key999")
            .take(3)
            .map(|(k, _)| k)
            .collect();
        if page.is_empty() {
            break;
        }
        let mut next = page.last().unwrap().clone();
        next.push(0);
        low = next;
        seen.extend(page);
    }

    assert_eq!(seen.len(), 10);
    assert_eq!(seen, memtable.iter().into_iter().map(|(k, _)| k).collect::<Vec<_>>());
}

#[test]
fn test_range_scan_yields_tombstones() {
    let memtable = numbered(5);
    memtable.delete(b"key002".to_vec());

    let entries: Vec<_> = memtable.range_scan(b"key002", b"key003").collect();
    assert_eq!(entries, vec![(b"key002".to_vec(), MemTableEntry::Tombstone)]);
}

// =============================================================================
// Edge Case Tests
// =============================================================================

#[test]
fn test_empty_key_and_value() {
    let memtable = MemTable::new();
    memtable.put(Vec::new(), Vec::new());

    assert_eq!(memtable.lookup(b""), value(b""));
    assert_eq!(memtable.size_bytes(), 0);
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_many_entries() {
    let memtable = numbered(1000);
    assert_eq!(memtable.entry_count(), 1000);

    let entries = memtable.iter();
    for i in 0..999 {
        assert!(entries[i].0 < entries[i + 1].0);
    }
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_concurrent_reads() {
    let memtable = Arc::new(MemTable::new());
    memtable.put(b"key".to_vec(), b"value".to_vec());

    let mut handles = vec![];
    for _ in 0..10 {
        let mt = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(mt.lookup(b"key"), value(b"value"));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_writes() {
    let memtable = MemTable::new();

    crossbeam::thread::scope(|s| {
        for i in 0..10 {
            let mt = &memtable;
            s.spawn(move |_| {
                for j in 0..10 {
                    let key = format!("key{}_{}", i, j).into_bytes();
                    let value = format!("value{}_{}", i, j).into_bytes();
                    mt.put(key, value);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(memtable.entry_count(), 100);
    let expected: usize = (0..10)
        .flat_map(|i| (0..10).map(move |j| format!("key{}_{}", i, j).len() + format!("value{}_{}", i, j).len()))
        .sum();
    assert_eq!(memtable.size_bytes(), expected);
}

#[test]
fn test_readers_during_writes() {
    let memtable = MemTable::new();
    memtable.put(b"stable".to_vec(), b"yes".to_vec());

    crossbeam::thread::scope(|s| {
        s.spawn(|_| {
            for i in 0..500 {
                memtable.put(format!("k{:04}", i).into_bytes(), b"v".to_vec());
            }
        });
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..500 {
                    assert_eq!(memtable.lookup(b"stable"), value(b"yes"));
                    let scanned = memtable.range_scan(b"k", b"l").count();
                    assert!(scanned <= 500);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(memtable.range_scan(b"k", b"l").count(), 500);
}
