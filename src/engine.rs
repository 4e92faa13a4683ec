//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route every mutation through lock check, commit log, filter, memtable
//! - Serve reads through lock check, filter, memtable, sorted store
//! - Recover and replay the commit log on startup
//! - Hand memtable snapshots to the sorted store on flush

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::commitlog::{AppendReceipt, Journal, LogRecord, OpType, RecoveryReport};
use crate::config::Config;
use crate::error::{CfgError, Result};
use crate::filter::{CuckooFilter, MembershipFilter};
use crate::locks::{LockCoordinator, LockToken};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::SortedStore;

/// Acknowledgment for a durable write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    /// Byte offset of the record in the commit log
    pub offset: u64,

    /// Position of the record in the commit index
    pub record_no: u64,

    /// Timestamp stamped on the record
    pub timestamp: u64,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Mutations** (insert/delete/lock/unlock/flush): serialized by the
///   `journal` mutex. The lock-table check, the log + index append and the
///   in-memory apply all happen while it is held, so no mutation can slip
///   in between a LOCK and the check that would have rejected it.
///   Acquire order: journal → (memtable | filter | locks).
///
/// - **Reads** (get/may_contain): never take the journal mutex
///   - Lock table is sharded, memtable is lock-free
///   - Filter probes take its read lock
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Commit log + index (the write serialization boundary)
    journal: Mutex<Journal>,

    /// In-memory table for recent writes (lock-free skip list)
    memtable: MemTable,

    /// Negative-lookup filter over every key ever inserted
    filter: Box<dyn MembershipFilter>,

    /// Keys the filter could not take; probed alongside it
    filter_overflow: RwLock<HashSet<Vec<u8>>>,

    /// Per-key lock table
    locks: LockCoordinator,

    /// Timestamp source
    clock: Arc<dyn Clock>,

    /// Sorted generations below the memtable, if any
    store: Option<Arc<dyn SortedStore>>,

    /// What recovery found when the engine was opened
    recovery: RecoveryReport,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// Uses the wall clock and no sorted store.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, Arc::new(SystemClock), None)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Open or create an engine with an explicit clock and sorted store
    ///
    /// On startup:
    /// 1. Lock the data directory and open the log/index pair
    /// 2. Cut a torn log tail, rebuild the index if it disagrees
    /// 3. Replay every surviving record into memtable, filter and lock table
    /// 4. Ready to serve requests
    pub fn open_with(
        config: Config,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn SortedStore>>,
    ) -> Result<Self> {
        config.validate()?;

        let filter = CuckooFilter::from_config(&config)?;
        let (journal, records, recovery) =
            Journal::open(&config.data_dir, config.sync_mode, config.force_open)?;

        if recovery.was_truncated {
            tracing::warn!(
                "Commit log tail truncated: {} bytes cut at offset {} ({})",
                recovery.truncated_bytes,
                recovery.valid_len,
                recovery.truncation_reason.as_deref().unwrap_or("unknown")
            );
        }
        if recovery.index_rebuilt {
            tracing::warn!("Commit index rebuilt from {} records", recovery.records_recovered);
        }

        let engine = Self {
            config,
            journal: Mutex::new(journal),
            memtable: MemTable::new(),
            filter: Box::new(filter),
            filter_overflow: RwLock::new(HashSet::new()),
            locks: LockCoordinator::new(),
            clock,
            store,
            recovery,
        };

        for record in records {
            engine.replay(record);
        }

        tracing::info!(
            "Engine opened at {}: {} records replayed, {} memtable entries, {} locked keys",
            engine.config.data_dir.display(),
            engine.recovery.records_recovered,
            engine.memtable.entry_count(),
            engine.locks.len()
        );

        Ok(engine)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert or overwrite `key`
    ///
    /// Steps (journal mutex held throughout):
    /// 1. Reject if the key is locked
    /// 2. Append to commit log + index (durability)
    /// 3. Add the key to the filter
    /// 4. Apply to memtable (visibility)
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<WriteAck> {
        let mut journal = self.journal.lock();

        if self.locks.is_locked(key) {
            return Err(CfgError::KeyLocked);
        }

        let timestamp = self.next_timestamp(&journal)?;
        let record = LogRecord::insert(timestamp, key.to_vec(), value.to_vec());
        let ack = Self::append(&mut journal, &record)?;

        self.note_key(key);
        self.memtable.put(record.key, record.value);

        Ok(ack)
    }

    /// Delete `key` by writing a tombstone
    pub fn delete(&self, key: &[u8]) -> Result<WriteAck> {
        let mut journal = self.journal.lock();

        if self.locks.is_locked(key) {
            return Err(CfgError::KeyLocked);
        }

        let record = LogRecord::delete(self.next_timestamp(&journal)?, key.to_vec());
        let ack = Self::append(&mut journal, &record)?;

        self.memtable.delete(record.key);

        Ok(ack)
    }

    /// Lock `key` against reads, inserts and deletes
    ///
    /// Returns the token that must be presented to [`Engine::unlock`]. A
    /// key that is already locked fails with `AlreadyLocked` and nothing
    /// is logged.
    pub fn lock(&self, key: &[u8]) -> Result<LockToken> {
        let mut journal = self.journal.lock();

        if self.locks.is_locked(key) {
            return Err(CfgError::AlreadyLocked);
        }

        let record = LogRecord::lock(self.next_timestamp(&journal)?, key.to_vec());
        let ack = Self::append(&mut journal, &record)?;

        let token = LockToken::new(ack.timestamp);
        self.locks.acquire(key, token)?;

        Ok(token)
    }

    /// Release a lock taken by [`Engine::lock`]
    pub fn unlock(&self, key: &[u8], token: LockToken) -> Result<WriteAck> {
        let mut journal = self.journal.lock();

        self.locks.check_owner(key, token)?;

        let timestamp = self.next_timestamp(&journal)?;
        let record = LogRecord::unlock(timestamp, key.to_vec(), token.value());
        let ack = Self::append(&mut journal, &record)?;

        self.locks.release(key, token)?;

        Ok(ack)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Lock table (a locked key is refused)
    /// 2. Filter (a definite miss stops here)
    /// 3. MemTable (most recent writes; a tombstone means absent)
    /// 4. Sorted store
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.locks.is_locked(key) {
            return Err(CfgError::KeyLocked);
        }

        if !self.may_contain(key) {
            return Ok(None);
        }

        match self.memtable.lookup(key) {
            Some(MemTableEntry::Value(value)) => Ok(Some(value)),
            Some(MemTableEntry::Tombstone) => Ok(None),
            None => match &self.store {
                Some(store) => store.lookup(key),
                None => Ok(None),
            },
        }
    }

    /// `false` means `key` was never inserted
    ///
    /// Deleted keys still answer `true`; the filter never forgets.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.filter.may_contain(key) || self.filter_overflow.read().contains(key)
    }

    pub fn is_locked(&self, key: &[u8]) -> bool {
        self.locks.is_locked(key)
    }

    /// The last `n` commit log records, newest first
    pub fn recent_records(&self, n: usize) -> Result<Vec<LogRecord>> {
        self.journal.lock().records_from_end(n)
    }

    // =========================================================================
    // Flush / Backup / Close
    // =========================================================================

    /// Whether the memtable has reached its configured size limit
    pub fn should_flush(&self) -> bool {
        self.memtable.should_flush(self.config.memtable_size_limit)
    }

    /// Hand the memtable to the sorted store and drop the flushed entries
    ///
    /// Returns the number of entries flushed. The commit log is left intact;
    /// trimming it is the compaction side's business.
    pub fn flush(&self) -> Result<usize> {
        let _journal = self.journal.lock();

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| CfgError::Storage("no sorted store attached".to_string()))?;

        let snapshot = self.memtable.iter();
        if snapshot.is_empty() {
            return Ok(0);
        }

        store.flush(&snapshot)?;
        for (key, _) in &snapshot {
            self.memtable.remove(key);
        }

        tracing::info!(
            "Flushed {} memtable entries; {} bytes left in memtable",
            snapshot.len(),
            self.memtable.size_bytes()
        );
        Ok(snapshot.len())
    }

    /// Copy the commit log and index to `dest` as a matched pair
    pub fn backup(&self, dest: &Path) -> Result<()> {
        self.journal.lock().backup(dest)
    }

    /// Close the engine gracefully
    ///
    /// Flushes pending memtable entries when a sorted store is attached.
    /// Every acknowledged write is already on disk either way.
    pub fn close(self) -> Result<()> {
        if self.store.is_some() && !self.memtable.is_empty() {
            self.flush()?;
        }
        tracing::info!("Engine closed at {}", self.config.data_dir.display());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size_bytes()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Number of records in the commit log
    pub fn record_count(&self) -> usize {
        self.journal.lock().record_count()
    }

    /// Size of the commit log in bytes
    pub fn log_size(&self) -> u64 {
        self.journal.lock().log_size()
    }

    pub fn last_timestamp(&self) -> u64 {
        self.journal.lock().last_timestamp()
    }

    /// What recovery found at open
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Number of keys currently locked
    pub fn locked_key_count(&self) -> usize {
        self.locks.len()
    }

    /// Number of keys tracked outside the filter after it filled up
    pub fn filter_overflow_count(&self) -> usize {
        self.filter_overflow.read().len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Strictly above the last logged timestamp (journal mutex held)
    fn next_timestamp(&self, journal: &Journal) -> Result<u64> {
        let floor = journal.last_timestamp().checked_add(1).ok_or_else(|| {
            CfgError::InvalidRecord(format!(
                "timestamps exhausted: last logged timestamp is {}",
                journal.last_timestamp()
            ))
        })?;
        Ok(self.clock.now().max(floor))
    }

    fn append(journal: &mut Journal, record: &LogRecord) -> Result<WriteAck> {
        let AppendReceipt { offset, record_no, .. } = journal.append(record)?;
        Ok(WriteAck {
            offset,
            record_no,
            timestamp: record.timestamp,
        })
    }

    /// Add `key` to the filter, or to the overflow set once the filter is full
    fn note_key(&self, key: &[u8]) {
        match self.filter.insert(key) {
            Ok(()) => {}
            Err(CfgError::FilterFull) => {
                let mut overflow = self.filter_overflow.write();
                if overflow.insert(key.to_vec()) {
                    tracing::warn!(
                        "Membership filter full; {} keys now checked outside it",
                        overflow.len()
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Membership filter insert failed: {}", e);
                self.filter_overflow.write().insert(key.to_vec());
            }
        }
    }

    /// Re-apply one recovered record
    fn replay(&self, record: LogRecord) {
        match record.op {
            OpType::Insert => {
                self.note_key(&record.key);
                self.memtable.put(record.key, record.value);
            }
            OpType::Delete => {
                self.memtable.delete(record.key);
            }
            OpType::Lock => {
                let token = LockToken::new(record.timestamp);
                if let Err(e) = self.locks.acquire(&record.key, token) {
                    tracing::warn!("Replay of LOCK at {} skipped: {}", record.timestamp, e);
                }
            }
            OpType::Unlock => {
                let released = record
                    .unlock_token()
                    .map(LockToken::new)
                    .ok_or_else(|| CfgError::InvalidRecord("UNLOCK without token".to_string()))
                    .and_then(|token| self.locks.release(&record.key, token));
                if let Err(e) = released {
                    tracing::warn!("Replay of UNLOCK at {} skipped: {}", record.timestamp, e);
                }
            }
        }
    }
}
