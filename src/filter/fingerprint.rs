//! Rabin fingerprints
//!
//! The message is read as a polynomial over GF(2), most significant bit of
//! the first byte first, and reduced modulo a fixed irreducible polynomial.
//! Reduction runs a byte at a time through a 256-entry table.

use crate::error::{CfgError, Result};

use super::Fingerprinter;

/// Irreducible polynomial of degree 53
pub const DEFAULT_POLYNOMIAL: u64 = 0x3DA3_358B_4DC1_73;

/// Table-driven Rabin fingerprint over a fixed polynomial
#[derive(Clone)]
pub struct RabinFingerprint {
    polynomial: u64,
    /// Bits the digest is shifted right by to find the byte that overflows
    shift: u32,
    table: [u64; 256],
}

impl RabinFingerprint {
    /// Fingerprint over [`DEFAULT_POLYNOMIAL`]
    pub fn new() -> Self {
        Self::build(DEFAULT_POLYNOMIAL)
    }

    /// Fingerprint over a caller-chosen polynomial.
    ///
    /// The degree must be in `9..=56` so a digest shifted by one byte still
    /// fits in 64 bits. Irreducibility is not checked; a reducible polynomial
    /// only weakens the distribution.
    pub fn with_polynomial(polynomial: u64) -> Result<Self> {
        let degree = degree(polynomial);
        if !(9..=56).contains(&degree) {
            return Err(CfgError::Config(format!(
                "fingerprint polynomial {:#x} has degree {}, expected 9..=56",
                polynomial, degree
            )));
        }
        Ok(Self::build(polynomial))
    }

    fn build(polynomial: u64) -> Self {
        let k = degree(polynomial) as u32;
        let mut table = [0u64; 256];
        for (b, slot) in table.iter_mut().enumerate() {
            let high = (b as u64) << k;
            // Keeping `high` in the entry lets the xor also clear the
            // overflowed bits of the shifted digest.
            *slot = poly_mod(high, polynomial) | high;
        }
        Self {
            polynomial,
            shift: k - 8,
            table,
        }
    }

    pub fn polynomial(&self) -> u64 {
        self.polynomial
    }

    pub fn degree(&self) -> u32 {
        self.shift + 8
    }

    /// Fold one byte into `digest`
    #[inline]
    pub fn update(&self, digest: u64, byte: u8) -> u64 {
        let index = (digest >> self.shift) as usize;
        ((digest << 8) | byte as u64) ^ self.table[index]
    }

    /// Digest of a whole byte string, starting from zero
    pub fn digest(&self, bytes: &[u8]) -> u64 {
        bytes.iter().fold(0, |d, &b| self.update(d, b))
    }
}

impl Default for RabinFingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter for RabinFingerprint {
    fn fingerprint(&self, bytes: &[u8]) -> u64 {
        self.digest(bytes)
    }
}

impl std::fmt::Debug for RabinFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabinFingerprint")
            .field("polynomial", &format_args!("{:#x}", self.polynomial))
            .finish()
    }
}

/// Degree of a GF(2) polynomial packed into a u64 (-1 for zero)
fn degree(p: u64) -> i32 {
    63 - p.leading_zeros() as i32
}

/// `x mod p` over GF(2)
fn poly_mod(mut x: u64, p: u64) -> u64 {
    let dp = degree(p);
    while degree(x) >= dp {
        x ^= p << (degree(x) - dp);
    }
    x
}
