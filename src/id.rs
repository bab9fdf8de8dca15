//! Identifier space of the ring.
//!
//! Identifiers are `bits`-wide unsigned integers. All interval tests walk the
//! ring clockwise, so `(a, b]` with `a > b` wraps through zero.

use sha2::{Digest, Sha256};

pub type Identifier = u64;

pub const DEFAULT_BITS: u32 = 16;

/// An m-bit circular identifier space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdSpace {
    bits: u32,
}

impl IdSpace {
    /// Panics unless `1 <= bits <= 64`; config validation rejects bad values first.
    pub fn new(bits: u32) -> Self {
        assert!((1..=64).contains(&bits), "identifier width must be 1..=64 bits");
        Self { bits }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    fn mask(&self) -> u64 {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Hash an `ip:port` style address onto the ring.
    pub fn hash(&self, address: &str) -> Identifier {
        let digest = Sha256::digest(address.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix) & self.mask()
    }

    /// (id + 2^index) mod 2^m
    pub fn finger_start(&self, id: Identifier, index: u32) -> Identifier {
        debug_assert!(index < self.bits);
        id.wrapping_add(1u64 << index) & self.mask()
    }
}

impl Default for IdSpace {
    fn default() -> Self {
        Self::new(DEFAULT_BITS)
    }
}

/// x in (a, b]. A single-point interval (a == b) only holds b itself.
pub fn is_between(x: Identifier, a: Identifier, b: Identifier) -> bool {
    if a < b {
        a < x && x <= b
    } else if a > b {
        x > a || x <= b
    } else {
        x == b
    }
}

/// x in (a, b). With a == b the interval is the whole ring minus a.
pub fn is_strictly_between(x: Identifier, a: Identifier, b: Identifier) -> bool {
    if a < b {
        a < x && x < b
    } else if a > b {
        x > a || x < b
    } else {
        x != a
    }
}
