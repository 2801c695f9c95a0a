//! 256-bit difficulty arithmetic (spec.md §4.3, §9).
//!
//! The reference node leans on a bignum library for this; per the
//! spec's design notes that becomes a fixed-width `U256`
//! ([`primitive_types::U256`]) with checked arithmetic instead.

use primitive_types::U256;

use crate::types::Hash256;

/// Interprets the low 128 bits of `hash` as an unsigned integer.
fn low_bits_128(hash: &Hash256) -> U256 {
    let bytes = hash.as_bytes();
    U256::from_big_endian(&bytes[16..32])
}

/// Per-block difficulty: `max(1, 2^256 / lowBits128(hash))`.
///
/// `U256` cannot represent `2^256` itself, so this uses `U256::MAX`
/// (`2^256 - 1`) as the dividend; the off-by-one is consensus-irrelevant
/// since every node computes it the same way.
pub fn block_difficulty(hash: &Hash256) -> U256 {
    let low128 = low_bits_128(hash);
    if low128.is_zero() {
        return U256::MAX;
    }
    let diff = U256::MAX / low128;
    if diff.is_zero() {
        U256::one()
    } else {
        diff
    }
}

/// Cumulative difficulty for a block whose own difficulty is
/// `own_difficulty` and whose chosen predecessor's cumulative
/// difficulty is `predecessor_cumulative` (or `None` for a block with
/// no main-chain-reachable predecessor, e.g. genesis).
pub fn cumulative_difficulty(
    own_difficulty: U256,
    predecessor_cumulative: Option<U256>,
) -> U256 {
    match predecessor_cumulative {
        Some(prev) => own_difficulty.saturating_add(prev),
        None => own_difficulty,
    }
}
