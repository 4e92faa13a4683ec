//! Lock Coordinator
//!
//! Per-key lock table. A locked key rejects reads, inserts and deletes
//! until the holder of its token releases it.
//!
//! ## State machine (per key)
//! ```text
//! UNLOCKED --acquire(token)--> LOCKED(token) --release(token)--> UNLOCKED
//! ```
//! Nothing queues: a conflicting call fails straight away and the caller
//! decides whether to retry.
//!
//! The table is sharded (`DashMap`), so operations on different keys do not
//! contend; operations on one key are serialized by its shard.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{CfgError, Result};

/// Identity of a lock holder.
///
/// The engine uses the timestamp of the LOCK record that took the lock, so
/// the same token comes back when the log is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockToken(u64);

impl LockToken {
    pub const ENCODED_LEN: usize = 8;

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        self.0.to_be_bytes()
    }

    /// Parse the 8-byte big-endian form; `None` on any other length
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; Self::ENCODED_LEN] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(raw)))
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concurrent key -> holder table
#[derive(Debug, Default)]
pub struct LockCoordinator {
    locks: DashMap<Vec<u8>, LockToken>,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Lock `key` for `token`; `AlreadyLocked` if anyone holds it
    pub fn acquire(&self, key: &[u8], token: LockToken) -> Result<()> {
        match self.locks.entry(key.to_vec()) {
            Entry::Occupied(_) => Err(CfgError::AlreadyLocked),
            Entry::Vacant(slot) => {
                slot.insert(token);
                tracing::debug!("Lock acquired on key ({} bytes) by token {}", key.len(), token);
                Ok(())
            }
        }
    }

    pub fn is_locked(&self, key: &[u8]) -> bool {
        self.locks.contains_key(key)
    }

    /// Current holder of `key`, if locked
    pub fn holder(&self, key: &[u8]) -> Option<LockToken> {
        self.locks.get(key).map(|t| *t)
    }

    /// Succeeds only if `key` is locked by `token`
    pub fn check_owner(&self, key: &[u8], token: LockToken) -> Result<()> {
        match self.holder(key) {
            None => Err(CfgError::NotLocked),
            Some(held) if held == token => Ok(()),
            Some(_) => Err(CfgError::NotOwner),
        }
    }

    /// Unlock `key`; the caller must present the token that locked it
    pub fn release(&self, key: &[u8], token: LockToken) -> Result<()> {
        match self.locks.entry(key.to_vec()) {
            Entry::Vacant(_) => Err(CfgError::NotLocked),
            Entry::Occupied(held) if *held.get() != token => Err(CfgError::NotOwner),
            Entry::Occupied(held) => {
                held.remove();
                tracing::debug!("Lock released on key ({} bytes) by token {}", key.len(), token);
                Ok(())
            }
        }
    }

    /// Number of keys currently locked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
