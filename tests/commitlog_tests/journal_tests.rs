//! Tests for Journal
//!
//! These tests verify:
//! - Directory ownership through the lock file
//! - Append receipts and timestamp ordering
//! - Random and reverse traversal through the index
//! - Backup of the log/index pair

use std::fs;
use std::path::{Path, PathBuf};

use cfgdb::commitlog::{Journal, LogRecord, OpType};
use cfgdb::{CfgError, SyncMode};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    (temp_dir, data_dir)
}

fn open(dir: &Path) -> Journal {
    Journal::open(dir, SyncMode::All, false).unwrap().0
}

fn fill(journal: &mut Journal, count: u64) {
    for i in 1..=count {
        journal
            .append(&LogRecord::insert(i, format!("k{}", i).into_bytes(), b"v".to_vec()))
            .unwrap();
    }
}

// =============================================================================
// Open / Lock Tests
// =============================================================================

#[test]
fn test_open_creates_files() {
    let (_temp, dir) = setup_temp_dir();
    let journal = open(&dir);

    assert!(dir.join(Journal::LOG_FILENAME).exists());
    assert!(dir.join(Journal::INDEX_FILENAME).exists());
    assert!(dir.join(Journal::LOCK_FILENAME).exists());
    assert_eq!(journal.record_count(), 0);
    assert_eq!(journal.dir(), dir.as_path());
}

#[test]
fn test_second_open_refused() {
    let (_temp, dir) = setup_temp_dir();
    let _journal = open(&dir);

    let result = Journal::open(&dir, SyncMode::All, false);
    assert!(matches!(result, Err(CfgError::DirectoryLocked(_))));
}

#[test]
fn test_lock_released_on_drop() {
    let (_temp, dir) = setup_temp_dir();
    {
        let mut journal = open(&dir);
        fill(&mut journal, 2);
    }
    assert!(!dir.join(Journal::LOCK_FILENAME).exists());

    let (journal, records, report) = Journal::open(&dir, SyncMode::Data, false).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(report.last_timestamp, 2);
    assert_eq!(journal.last_timestamp(), 2);
}

#[test]
fn test_force_open_removes_stale_lock() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(Journal::LOCK_FILENAME), b"99999\n").unwrap();

    assert!(matches!(
        Journal::open(&dir, SyncMode::All, false),
        Err(CfgError::DirectoryLocked(_))
    ));
    assert!(Journal::open(&dir, SyncMode::All, true).is_ok());
}

#[test]
fn test_open_on_file_refused() {
    let (_temp, dir) = setup_temp_dir();
    fs::write(&dir, b"not a directory").unwrap();

    assert!(matches!(
        Journal::open(&dir, SyncMode::All, false),
        Err(CfgError::Config(_))
    ));
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_receipts() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);

    let a = LogRecord::insert(1, b"a".to_vec(), b"1".to_vec());
    let b = LogRecord::lock(2, b"b".to_vec());

    let ra = journal.append(&a).unwrap();
    let rb = journal.append(&b).unwrap();

    assert_eq!((ra.offset, ra.record_no, ra.length), (0, 0, a.encoded_len() as u32));
    assert_eq!(rb.offset, a.encoded_len() as u64);
    assert_eq!(rb.record_no, 1);
    assert_eq!(journal.log_size(), (a.encoded_len() + b.encoded_len()) as u64);
    assert!(journal.index().is_consistent_with(journal.log_size()));
}

#[test]
fn test_timestamp_regression_rejected() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    journal.append(&LogRecord::insert(10, b"a".to_vec(), b"1".to_vec())).unwrap();
    let size = journal.log_size();

    let result = journal.append(&LogRecord::insert(5, b"b".to_vec(), b"2".to_vec()));

    assert!(matches!(result, Err(CfgError::InvalidRecord(_))));
    assert_eq!(journal.log_size(), size);
    assert_eq!(journal.record_count(), 1);
}

#[test]
fn test_invalid_record_leaves_pair_untouched() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);

    let mut bad = LogRecord::delete(1, b"a".to_vec());
    bad.value = b"x".to_vec();

    assert!(journal.append(&bad).is_err());
    assert_eq!(journal.log_size(), 0);
    assert_eq!(journal.record_count(), 0);
}

// =============================================================================
// Traversal Tests
// =============================================================================

#[test]
fn test_read_record_by_number() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    fill(&mut journal, 5);

    for i in 0..5usize {
        let record = journal.read_record(i).unwrap();
        assert_eq!(record.timestamp, i as u64 + 1);
    }
    assert!(matches!(journal.read_record(5), Err(CfgError::OutOfRange(_))));
}

#[test]
fn test_read_from_end() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    fill(&mut journal, 4);

    assert_eq!(journal.read_from_end(1).unwrap().timestamp, 4);
    assert_eq!(journal.read_from_end(4).unwrap().timestamp, 1);
    assert!(matches!(journal.read_from_end(0), Err(CfgError::OutOfRange(_))));
    assert!(matches!(journal.read_from_end(5), Err(CfgError::OutOfRange(_))));
}

#[test]
fn test_records_from_end_newest_first() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    fill(&mut journal, 4);
    journal.append(&LogRecord::delete(5, b"k1".to_vec())).unwrap();

    let recent = journal.records_from_end(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].op, OpType::Delete);
    assert_eq!(recent[1].timestamp, 4);

    assert!(journal.records_from_end(0).unwrap().is_empty());
    assert!(journal.records_from_end(6).is_err());
}

#[test]
fn test_scan_from_offset() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    fill(&mut journal, 3);

    let second = journal.index().offset_of(1).unwrap();
    let rest: Vec<u64> = journal
        .scan_from(second)
        .unwrap()
        .map(|item| item.unwrap().1.timestamp)
        .collect();
    assert_eq!(rest, vec![2, 3]);

    assert_eq!(journal.read_at(second).unwrap().timestamp, 2);
}

// =============================================================================
// Backup Tests
// =============================================================================

#[test]
fn test_backup_copies_pair() {
    let (temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    fill(&mut journal, 3);

    let dest = temp.path().join("backup");
    journal.backup(&dest).unwrap();

    assert_eq!(
        fs::read(dest.join(Journal::LOG_FILENAME)).unwrap(),
        fs::read(dir.join(Journal::LOG_FILENAME)).unwrap()
    );
    assert_eq!(
        fs::read(dest.join(Journal::INDEX_FILENAME)).unwrap(),
        fs::read(dir.join(Journal::INDEX_FILENAME)).unwrap()
    );
    assert!(!dest.join(Journal::LOCK_FILENAME).exists());

    drop(journal);
    let (_restored, records, report) = Journal::open(&dest, SyncMode::All, false).unwrap();
    assert_eq!(records.len(), 3);
    assert!(!report.index_inconsistent);
}

#[test]
fn test_rebuild_index_through_journal() {
    let (_temp, dir) = setup_temp_dir();
    let mut journal = open(&dir);
    fill(&mut journal, 3);
    let before = fs::read(dir.join(Journal::INDEX_FILENAME)).unwrap();

    assert_eq!(journal.rebuild_index().unwrap(), 3);
    assert_eq!(fs::read(dir.join(Journal::INDEX_FILENAME)).unwrap(), before);
}
