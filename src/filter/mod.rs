//! Membership Filter Module
//!
//! Approximate set membership in front of the read path.
//!
//! ## Responsibilities
//! - Answer "definitely absent" vs "possibly present" for a key
//! - Never report a key that was inserted as absent
//! - Keep false positives rare at the configured load
//!
//! ## Layout
//! A cuckoo filter: `2^k` buckets of `bucket_size` 16-bit fingerprints.
//! A key maps to two candidate buckets:
//!
//! ```text
//! i1 = crc32(key) & mask
//! fp = fold16(rabin(key))         (never 0; 0 marks an empty slot)
//! i2 = i1 ^ (crc32(fp) & mask)    (and i1 = i2 ^ (crc32(fp) & mask))
//! ```
//!
//! Because `i2` is derived from `i1` and the fingerprint alone, a stored
//! fingerprint can always be moved to its other bucket without the key.
//! That is what kicks rely on, and what a future `remove` would rely on.

mod cuckoo;
mod fingerprint;

pub use cuckoo::CuckooFilter;
pub use fingerprint::{RabinFingerprint, DEFAULT_POLYNOMIAL};

use crate::error::Result;

/// Maps a key to a fingerprint digest.
///
/// The filter only keeps a few bits of the digest, so the function needs to
/// be well mixed rather than cryptographic.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, bytes: &[u8]) -> u64;
}

/// Approximate membership: no false negatives, bounded false positives
pub trait MembershipFilter: Send + Sync {
    /// Record `key`. Fails with `FilterFull` when no slot can be freed.
    fn insert(&self, key: &[u8]) -> Result<()>;

    /// `false` means the key was never inserted
    fn may_contain(&self, key: &[u8]) -> bool;

    /// Number of fingerprints stored
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
