//! Error kinds for block admission and main-chain election, matching
//! spec.md §7's error taxonomy.

use thiserror::Error;

use crate::codec::block_codec::BlockCodecError;
use crate::store::StorageError;
use crate::types::LowHash;

/// Why a block failed validation during admission (spec.md §4.3).
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    #[error("malformed block encoding: {0}")]
    Malformed(#[from] BlockCodecError),
    #[error("timestamp {timestamp} is more than {max_drift_ms}ms in the future")]
    TimestampTooFarInFuture { timestamp: u64, max_drift_ms: u64 },
    #[error("input signature at slot does not recover the linked output's public key")]
    BadInputSignature,
    #[error("output signature does not cover the signed block body")]
    BadOutputSignature,
    #[error("sum of linked inputs ({inputs}) is less than sum of declared outputs ({outputs})")]
    InsufficientFunds { inputs: u64, outputs: u64 },
    #[error("arithmetic overflow while summing linked amounts")]
    AmountOverflow,
    #[error("referenced output {0} has already been spent")]
    DoubleSpend(LowHash),
}

/// Outcome of attempting to admit a block (spec.md §4.3, §7).
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// The block references a low-hash not yet present in the store;
    /// admissible later once the dependency arrives.
    #[error("block depends on {0} unresolved link(s), parked in the orphan pool")]
    MissingLinks(usize),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An internal invariant was violated while reverting a main-chain
    /// segment. Fatal: never recovered.
    #[error("reorg invariant violated: {0}")]
    ReorgFailure(&'static str),
}
