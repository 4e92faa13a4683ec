//! Error types for cfgdb
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CfgError
pub type Result<T> = std::result::Result<T, CfgError>;

/// Unified error type for cfgdb operations
#[derive(Debug, Error)]
pub enum CfgError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Commit Log Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Data directory {0} is locked by another process")]
    DirectoryLocked(String),

    #[error("Commit log unavailable: {0}")]
    LogUnavailable(String),

    // -------------------------------------------------------------------------
    // Key Lock Errors
    // -------------------------------------------------------------------------
    #[error("Key is locked")]
    KeyLocked,

    #[error("Key is already locked")]
    AlreadyLocked,

    #[error("Key is not locked")]
    NotLocked,

    #[error("Lock token does not own the key")]
    NotOwner,

    // -------------------------------------------------------------------------
    // Filter Errors
    // -------------------------------------------------------------------------
    #[error("Membership filter is full")]
    FilterFull,

    // -------------------------------------------------------------------------
    // Collaborator Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CfgError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        CfgError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }
}
