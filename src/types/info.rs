//! Derived block metadata (`BlockInfo`) and its flag bitset.
//!
//! `BlockInfo` is what the DAG engine actually reasons about once a block
//! has been admitted: height, accumulated difficulty, the chosen
//! reference link, and the bitset of consensus-relevant flags from
//! spec.md's data model. The raw 512-byte [`super::Block`] is kept
//! alongside it in the store, but every consensus decision after
//! admission is made against `BlockInfo`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::{LowHash, XAmount};

bitflags::bitflags! {
    /// Consensus-relevant flags tracked per block, mirroring the reference
    /// node's flag bitset.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
    pub struct BlockFlags: u32 {
        /// Balances have been credited/debited for this block.
        const APPLIED    = 1 << 0;
        /// This block is an elected main-chain block.
        const MAIN       = 1 << 1;
        /// This block is referenced by a main block (but is not main itself).
        const MAIN_REF   = 1 << 2;
        /// This block lies on the main chain (implied by `MAIN`, also set
        /// transiently for reorg bookkeeping).
        const MAIN_CHAIN = 1 << 3;
        /// This block was produced by the local node.
        const OUR        = 1 << 4;
        /// This block is the current pretop candidate.
        const PRETOP     = 1 << 5;
        /// This block carries a remark field.
        const REMARK     = 1 << 6;
        /// This block was imported from a snapshot rather than the network.
        const EXTRA      = 1 << 7;
        /// This block's info has been durably persisted.
        const SAVED      = 1 << 8;
        /// This block was reverted off the main chain during a reorg.
        const UNWIND     = 1 << 9;
    }
}

/// Snapshot-import bookkeeping for a block admitted from a state snapshot
/// rather than replayed from genesis.
///
/// Snapshot *import* itself is out of scope (no source to port this from),
/// but the field is modeled per spec.md's data model so downstream
/// consumers have a stable shape to match on.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub snapshot_height: u64,
    pub snapshot_hash: LowHash,
}

/// Derived, consensus-facing metadata for a block.
///
/// Unlike the raw [`super::Block`], every field here can change after the
/// block is first admitted (height and flags in particular are rewritten
/// during main-chain election and reorg).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Main-chain height; `0` for any block that has never been `MAIN`.
    pub height: u64,
    /// Cumulative difficulty along this block's maximum-difficulty path.
    #[serde(with = "u256_serde")]
    pub difficulty: U256,
    /// The reference link chosen for accounting purposes.
    pub reference: Option<LowHash>,
    /// Predecessor along the maximum-difficulty path.
    pub max_diff_link: Option<LowHash>,
    /// Fee collected by this block (sum of inputs minus sum of outputs).
    pub fee: XAmount,
    pub hash: LowHash,
    pub hashlow: LowHash,
    /// Coinbase amount minted by this block, if it is main.
    pub amount: XAmount,
    pub timestamp: u64,
    pub flags: BlockFlags,
    pub remark: Option<[u8; 32]>,
    pub snapshot_info: Option<SnapshotInfo>,
}

impl BlockInfo {
    pub fn is_main(&self) -> bool {
        self.flags.contains(BlockFlags::MAIN)
    }

    pub fn is_applied(&self) -> bool {
        self.flags.contains(BlockFlags::APPLIED)
    }
}

mod u256_serde {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        let mut bytes = [0u8; 32];
        value.to_little_endian(&mut bytes);
        s.serialize_bytes(&bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let bytes: Vec<u8> = Vec::<u8>::deserialize(d)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom("u256 must be exactly 32 bytes"));
        }
        Ok(U256::from_little_endian(&bytes))
    }
}
