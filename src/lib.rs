//! # cfgdb
//!
//! The durable write path of a configuration key-value store:
//! - Commit log + length index for durability and direct record access
//! - Crash recovery with torn-tail truncation and index rebuild
//! - Skip-list memtable for recent writes
//! - Cuckoo filter to short-circuit lookups of absent keys
//! - Per-key locks that block reads, updates and deletes
//!
//! ## Architecture Overview
//!
//! ```text
//!                 write                               read
//!                   │                                   │
//!   ┌───────────────▼───────────────┐   ┌───────────────▼───────────────┐
//!   │  Engine (journal mutex held)  │   │     Engine (no write lock)    │
//!   └───────────────┬───────────────┘   └───────────────┬───────────────┘
//!                   │                                   │
//!          ┌────────▼────────┐                 ┌────────▼────────┐
//!          │ LockCoordinator │                 │ LockCoordinator │
//!          └────────┬────────┘                 └────────┬────────┘
//!          ┌────────▼────────┐                 ┌────────▼────────┐
//!          │ CommitLog + Idx │                 │   CuckooFilter  │
//!          └────────┬────────┘                 └────────┬────────┘
//!          ┌────────▼────────┐                 ┌────────▼────────┐
//!          │  CuckooFilter   │                 │    MemTable     │
//!          └────────┬────────┘                 └────────┬────────┘
//!          ┌────────▼────────┐                 ┌────────▼────────┐
//!          │    MemTable     │                 │   SortedStore   │
//!          └─────────────────┘                 └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod clock;
pub mod commitlog;
pub mod filter;
pub mod locks;
pub mod memtable;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CfgError, Result};
pub use config::{Config, SyncMode};
pub use engine::{Engine, WriteAck};
pub use locks::LockToken;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cfgdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
