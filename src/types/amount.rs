//! Fixed-point currency amounts.
//!
//! `XAmount` stores a 64-bit unsigned fixed-point value where
//! `1 XDAG == 2^32` base units. Addition saturates; subtraction is
//! checked, since a negative balance is a consensus-level invariant
//! violation rather than something callers should silently clamp.

use serde::{Deserialize, Serialize};

/// Number of base units per whole XDAG (`2^32`).
pub const UNITS_PER_XDAG: u64 = 1u64 << 32;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct XAmount(pub u64);

impl XAmount {
    pub const ZERO: XAmount = XAmount(0);

    pub fn from_xdag(whole: u64) -> Self {
        XAmount(whole.saturating_mul(UNITS_PER_XDAG))
    }

    /// Saturating addition: amounts never wrap past `u64::MAX`.
    pub fn saturating_add(self, rhs: XAmount) -> XAmount {
        XAmount(self.0.saturating_add(rhs.0))
    }

    /// Checked subtraction: returns `None` on underflow instead of
    /// wrapping, since a negative balance must never be representable.
    pub fn checked_sub(self, rhs: XAmount) -> Option<XAmount> {
        self.0.checked_sub(rhs.0).map(XAmount)
    }

    /// Serializes this amount as 8 little-endian bytes.
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Parses an amount from 8 little-endian bytes.
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        XAmount(u64::from_le_bytes(bytes))
    }
}

impl std::ops::Add for XAmount {
    type Output = XAmount;
    fn add(self, rhs: XAmount) -> XAmount {
        self.saturating_add(rhs)
    }
}
