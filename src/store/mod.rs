//! Storage backends for the DAG block store.
//!
//! [`BlockStore`] is the abstraction the consensus engine is written
//! against; everything else in this module is a concrete implementation
//! of it: an in-memory store ([`mem::InMemoryBlockStore`]) for tests, and
//! a RocksDB-backed store ([`rocks::RocksDbBlockStore`]) for a real node.
//!
//! Three logical column families back every implementation, per
//! spec.md §4.2: `blocks` (low-hash -> 512-byte block), `info`
//! (low-hash -> encoded [`BlockInfo`]), and `heights` (height ->
//! low-hash of the main block at that height). A fourth key, `meta`,
//! tracks node-wide tip bookkeeping and is updated atomically with any
//! tip change.

pub mod mem;
pub mod rocks;

use thiserror::Error;

use crate::types::{Block, BlockFlags, BlockInfo, LowHash};

pub use mem::InMemoryBlockStore;
pub use rocks::{RocksDbBlockStore, RocksDbConfig};

/// Storage-level error type.
///
/// Any error here is, per spec.md §7, fatal: the node logs at `ERROR`
/// with a diagnostic dump of the failing tip and exits with code 2.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("underlying database error: {0}")]
    Backend(String),
    #[error("missing column family {0:?}")]
    MissingColumnFamily(&'static str),
    #[error("corrupted metadata: {0}")]
    CorruptedMeta(&'static str),
    #[error("block {0} not found")]
    NotFound(LowHash),
}

/// Node-wide persisted metadata, kept alongside the block store per
/// spec.md §6 ("Persisted state").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreMeta {
    pub schema_version: u16,
    pub network_id: u32,
    pub genesis_low_hash: LowHash,
    pub tip_low_hash: LowHash,
    pub tip_height: u64,
}

impl StoreMeta {
    pub const SCHEMA_VERSION: u16 = 1;

    pub fn genesis(network_id: u32, genesis_low_hash: LowHash) -> Self {
        StoreMeta {
            schema_version: Self::SCHEMA_VERSION,
            network_id,
            genesis_low_hash,
            tip_low_hash: genesis_low_hash,
            tip_height: 0,
        }
    }
}

/// Content-addressed mapping from low-hash to block + derived metadata.
///
/// Every method takes `&self`: implementations use interior mutability
/// (a lock or a concurrent map) so the store can be shared behind an
/// `Arc` with the consensus thread as the sole writer and every other
/// thread holding a read-only view, per spec.md §5.
pub trait BlockStore: Send + Sync {
    /// Fetches the raw block for `low_hash`, if present.
    fn get_block(&self, low_hash: &LowHash) -> Option<Block>;

    /// Fetches the derived metadata for `low_hash`, if present.
    fn get_info(&self, low_hash: &LowHash) -> Option<BlockInfo>;

    /// Persists `block` and `info` atomically: either both become
    /// visible to the next reader, or neither does.
    fn put(&self, block: &Block, info: &BlockInfo) -> Result<(), StorageError>;

    /// Atomically mutates the flags of an already-stored block.
    ///
    /// Returns [`StorageError::NotFound`] if `low_hash` is unknown.
    fn update_flags(&self, low_hash: &LowHash, flags: BlockFlags) -> Result<(), StorageError>;

    /// Records (or clears, with `None`) the main block at `height`,
    /// keeping the `heights` column family in sync with `MAIN` flags.
    fn set_height_index(&self, height: u64, low_hash: Option<LowHash>) -> Result<(), StorageError>;

    /// Looks up the main block at `height`, if one has been elected.
    fn main_at_height(&self, height: u64) -> Option<LowHash>;

    /// Returns every `BlockInfo` whose height falls in `[from, to]`,
    /// ordered by height ascending. Used during reorg replay.
    fn iterate_by_height(&self, from: u64, to: u64) -> Vec<BlockInfo>;

    /// Returns the current node-wide metadata.
    fn meta(&self) -> Option<StoreMeta>;

    /// Persists node-wide metadata. Callers update this in the same
    /// atomic batch as any tip change.
    fn set_meta(&self, meta: StoreMeta) -> Result<(), StorageError>;
}
