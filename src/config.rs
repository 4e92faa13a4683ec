//! Configuration for cfgdb
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CfgError, Result};

/// Main configuration for a cfgdb instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the commit log pair
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── commit.log       (record data)
    ///     ├── commit.idx       (u32 length per record)
    ///     └── commit.lock      (owner pid while open)
    pub data_dir: PathBuf,

    /// Remove a stale `commit.lock` left behind by a crashed process
    pub force_open: bool,

    // -------------------------------------------------------------------------
    // Commit Log Configuration
    // -------------------------------------------------------------------------
    /// How appends are forced to stable storage
    pub sync_mode: SyncMode,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Size (in bytes) at which the engine reports that a flush is due
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Filter Configuration
    // -------------------------------------------------------------------------
    /// Expected number of distinct keys
    pub filter_capacity: usize,

    /// Fingerprint slots per bucket
    pub filter_bucket_size: usize,

    /// Maximum displacements before an insert gives up
    pub filter_max_kicks: usize,
}

/// How the commit log forces an append to disk before acknowledging it.
///
/// Both modes are durable; neither acknowledges before the sync returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync data and metadata
    All,

    /// fdatasync (skips metadata not needed to read the data back)
    Data,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cfgdb_data"),
            force_open: false,
            sync_mode: SyncMode::All,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            filter_capacity: 1 << 20,
            filter_bucket_size: 4,
            filter_max_kicks: 500,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.filter_capacity == 0 {
            return Err(CfgError::Config("filter_capacity must be > 0".to_string()));
        }
        if self.filter_bucket_size == 0 {
            return Err(CfgError::Config("filter_bucket_size must be > 0".to_string()));
        }
        if self.filter_max_kicks == 0 {
            return Err(CfgError::Config("filter_max_kicks must be > 0".to_string()));
        }
        if self.memtable_size_limit == 0 {
            return Err(CfgError::Config("memtable_size_limit must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Take over a directory whose lock file was left behind
    pub fn force_open(mut self, force: bool) -> Self {
        self.config.force_open = force;
        self
    }

    /// Set the commit log sync mode
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the expected number of keys for the membership filter
    pub fn filter_capacity(mut self, keys: usize) -> Self {
        self.config.filter_capacity = keys;
        self
    }

    /// Set the number of fingerprint slots per bucket
    pub fn filter_bucket_size(mut self, slots: usize) -> Self {
        self.config.filter_bucket_size = slots;
        self
    }

    /// Set the maximum number of cuckoo kicks per insert
    pub fn filter_max_kicks(mut self, kicks: usize) -> Self {
        self.config.filter_max_kicks = kicks;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
