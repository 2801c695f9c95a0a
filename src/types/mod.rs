//! Core domain types: hashes, fixed-point amounts, block fields, and
//! derived block metadata.
//!
//! These are the strongly-typed newtypes used everywhere else in the
//! crate instead of naked byte buffers, following the same convention
//! the rest of the codebase uses for every identifier.

pub mod amount;
pub mod block;
pub mod info;

pub use amount::XAmount;
pub use block::{
    Block, BlockBuilder, BlockType, FieldKind, FieldSlot, Header, Link, LinkKind, BLOCK_SIZE,
    FIELD_COUNT, HASH_LEN,
};
pub use info::{BlockFlags, BlockInfo, SnapshotInfo};

use serde::{Deserialize, Serialize};

/// A full 256-bit block hash.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Computes the canonical "low hash" view: the last 24 bytes of this
    /// hash with the first 8 bytes zeroed out.
    ///
    /// The first 8 bytes of a full hash are a nonce/tag that must never
    /// participate in store lookups; `LowHash` is the only key the block
    /// store accepts.
    pub fn low_hash(&self) -> LowHash {
        let mut out = self.0;
        out[..8].fill(0);
        LowHash(out)
    }
}

/// The canonical store key: a [`Hash256`] with its first 8 bytes zeroed.
///
/// `LowHash` is a distinct type from `Hash256` so that callers cannot
/// accidentally use a full hash (with a live nonce) as a store key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LowHash(pub [u8; HASH_LEN]);

impl LowHash {
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn zero() -> Self {
        LowHash([0u8; HASH_LEN])
    }
}

impl std::fmt::Display for LowHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
