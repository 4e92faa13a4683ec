//! Cuckoo filter
//!
//! Fixed-size table of 16-bit fingerprints with partial-key cuckoo hashing.
//! Inserts that find both candidate buckets full displace a random resident
//! to its alternate bucket, up to `max_kicks` times. The fingerprint left
//! homeless when the kicks run out goes to a one-slot stash, so a completed
//! insert is never undone by a later one. Once the stash is taken, inserts
//! that would need to kick fail with `FilterFull` and change nothing.

use parking_lot::RwLock;
use rand::Rng;

use crate::config::Config;
use crate::error::{CfgError, Result};

use super::{Fingerprinter, MembershipFilter, RabinFingerprint};

/// Marks an empty slot; real fingerprints are never zero
const EMPTY: u16 = 0;

/// A fingerprint parked after a kick chain ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Victim {
    bucket: usize,
    fingerprint: u16,
}

struct Table {
    /// `bucket_count * bucket_size` slots, bucket-major
    slots: Vec<u16>,
    stash: Option<Victim>,
    len: usize,
}

pub struct CuckooFilter<F: Fingerprinter = RabinFingerprint> {
    table: RwLock<Table>,
    fingerprinter: F,
    bucket_count: usize,
    bucket_size: usize,
    max_kicks: usize,
}

impl CuckooFilter<RabinFingerprint> {
    /// Filter for about `capacity` keys, fingerprinted with Rabin
    pub fn new(capacity: usize, bucket_size: usize, max_kicks: usize) -> Result<Self> {
        Self::with_fingerprinter(capacity, bucket_size, max_kicks, RabinFingerprint::new())
    }

    /// Filter sized from the engine configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.filter_capacity,
            config.filter_bucket_size,
            config.filter_max_kicks,
        )
    }
}

impl<F: Fingerprinter> CuckooFilter<F> {
    /// Bucket count is `capacity / bucket_size` rounded up to a power of two
    pub fn with_fingerprinter(
        capacity: usize,
        bucket_size: usize,
        max_kicks: usize,
        fingerprinter: F,
    ) -> Result<Self> {
        if capacity == 0 || bucket_size == 0 || max_kicks == 0 {
            return Err(CfgError::Config(format!(
                "filter needs non-zero capacity ({}), bucket size ({}) and max kicks ({})",
                capacity, bucket_size, max_kicks
            )));
        }

        let bucket_count = capacity.div_ceil(bucket_size).next_power_of_two();
        tracing::debug!(
            "Cuckoo filter: {} buckets x {} slots, max {} kicks",
            bucket_count,
            bucket_size,
            max_kicks
        );

        Ok(Self {
            table: RwLock::new(Table {
                slots: vec![EMPTY; bucket_count * bucket_size],
                stash: None,
                len: 0,
            }),
            fingerprinter,
            bucket_count,
            bucket_size,
            max_kicks,
        })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Record `key`.
    ///
    /// Inserting a key whose fingerprint already sits in one of its buckets
    /// is a no-op.
    pub fn insert(&self, key: &[u8]) -> Result<()> {
        let fp = self.fingerprint(key);
        let i1 = self.primary_bucket(key);
        let i2 = self.alt_bucket(i1, fp);

        let mut table = self.table.write();

        if self.holds(&table, i1, i2, fp) {
            return Ok(());
        }
        if self.try_place(&mut table, i1, fp) || self.try_place(&mut table, i2, fp) {
            table.len += 1;
            return Ok(());
        }
        if table.stash.is_some() {
            return Err(CfgError::FilterFull);
        }

        let mut rng = rand::thread_rng();
        let mut bucket = if rng.gen_bool(0.5) { i1 } else { i2 };
        let mut carried = fp;

        for _ in 0..self.max_kicks {
            let slot = bucket * self.bucket_size + rng.gen_range(0..self.bucket_size);
            std::mem::swap(&mut carried, &mut table.slots[slot]);

            bucket = self.alt_bucket(bucket, carried);
            if self.try_place(&mut table, bucket, carried) {
                table.len += 1;
                return Ok(());
            }
        }

        tracing::debug!(
            "Cuckoo insert ran out of kicks after {}; stashing fingerprint for bucket {}",
            self.max_kicks,
            bucket
        );
        table.stash = Some(Victim {
            bucket,
            fingerprint: carried,
        });
        table.len += 1;
        Ok(())
    }

    /// `false` means `key` was never inserted
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let fp = self.fingerprint(key);
        let i1 = self.primary_bucket(key);
        let i2 = self.alt_bucket(i1, fp);

        let table = self.table.read();
        self.holds(&table, i1, i2, fp)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Fingerprints stored, stash included
    pub fn len(&self) -> usize {
        self.table.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slots (the stash is not counted)
    pub fn slot_count(&self) -> usize {
        self.bucket_count * self.bucket_size
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn max_kicks(&self) -> usize {
        self.max_kicks
    }

    /// Fraction of slots in use
    pub fn load_factor(&self) -> f64 {
        let table = self.table.read();
        let in_slots = table.len - usize::from(table.stash.is_some());
        in_slots as f64 / self.slot_count() as f64
    }

    /// Whether a kick chain has already spilled into the stash
    pub fn is_stashed(&self) -> bool {
        self.table.read().stash.is_some()
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    fn fingerprint(&self, key: &[u8]) -> u16 {
        let d = self.fingerprinter.fingerprint(key);
        let folded = (d ^ (d >> 16) ^ (d >> 32) ^ (d >> 48)) as u16;
        if folded == EMPTY {
            1
        } else {
            folded
        }
    }

    fn primary_bucket(&self, key: &[u8]) -> usize {
        crc32fast::hash(key) as usize & (self.bucket_count - 1)
    }

    /// Involution: `alt_bucket(alt_bucket(i, fp), fp) == i`
    fn alt_bucket(&self, bucket: usize, fp: u16) -> usize {
        let mix = crc32fast::hash(&fp.to_be_bytes()) as usize;
        (bucket ^ mix) & (self.bucket_count - 1)
    }

    // =========================================================================
    // Table helpers
    // =========================================================================

    fn bucket<'t>(&self, table: &'t Table, bucket: usize) -> &'t [u16] {
        let start = bucket * self.bucket_size;
        &table.slots[start..start + self.bucket_size]
    }

    fn holds(&self, table: &Table, i1: usize, i2: usize, fp: u16) -> bool {
        self.bucket(table, i1).contains(&fp)
            || self.bucket(table, i2).contains(&fp)
            || table
                .stash
                .is_some_and(|v| v.fingerprint == fp && (v.bucket == i1 || v.bucket == i2))
    }

    fn try_place(&self, table: &mut Table, bucket: usize, fp: u16) -> bool {
        let start = bucket * self.bucket_size;
        match table.slots[start..start + self.bucket_size]
            .iter_mut()
            .find(|s| **s == EMPTY)
        {
            Some(slot) => {
                *slot = fp;
                true
            }
            None => false,
        }
    }
}

impl<F: Fingerprinter> MembershipFilter for CuckooFilter<F> {
    fn insert(&self, key: &[u8]) -> Result<()> {
        CuckooFilter::insert(self, key)
    }

    fn may_contain(&self, key: &[u8]) -> bool {
        CuckooFilter::may_contain(self, key)
    }

    fn len(&self) -> usize {
        CuckooFilter::len(self)
    }
}

impl<F: Fingerprinter> std::fmt::Debug for CuckooFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CuckooFilter")
            .field("bucket_count", &self.bucket_count)
            .field("bucket_size", &self.bucket_size)
            .field("max_kicks", &self.max_kicks)
            .field("len", &self.len())
            .finish()
    }
}
