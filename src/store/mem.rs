//! In-memory block store.
//!
//! Backs unit tests and the end-to-end consensus scenarios in
//! `tests/consensus.rs`. All state lives behind a single
//! [`parking_lot::RwLock`]; `put` and `update_flags` take the write lock
//! for the duration of the mutation, which is what makes them atomic
//! with respect to readers.

use std::collections::BTreeMap;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Block, BlockFlags, BlockInfo, LowHash};

use super::{BlockStore, StorageError, StoreMeta};

#[derive(Default)]
struct Inner {
    blocks: HashMap<LowHash, Block>,
    infos: HashMap<LowHash, BlockInfo>,
    heights: BTreeMap<u64, LowHash>,
    meta: Option<StoreMeta>,
}

/// In-memory implementation of [`BlockStore`].
#[derive(Default)]
pub struct InMemoryBlockStore {
    inner: RwLock<Inner>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for InMemoryBlockStore {
    fn get_block(&self, low_hash: &LowHash) -> Option<Block> {
        self.inner.read().blocks.get(low_hash).cloned()
    }

    fn get_info(&self, low_hash: &LowHash) -> Option<BlockInfo> {
        self.inner.read().infos.get(low_hash).cloned()
    }

    fn put(&self, block: &Block, info: &BlockInfo) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        inner.blocks.insert(info.hashlow, block.clone());
        inner.infos.insert(info.hashlow, info.clone());
        Ok(())
    }

    fn update_flags(&self, low_hash: &LowHash, flags: BlockFlags) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        match inner.infos.get_mut(low_hash) {
            Some(info) => {
                info.flags = flags;
                Ok(())
            }
            None => Err(StorageError::NotFound(*low_hash)),
        }
    }

    fn set_height_index(&self, height: u64, low_hash: Option<LowHash>) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        match low_hash {
            Some(h) => {
                inner.heights.insert(height, h);
            }
            None => {
                inner.heights.remove(&height);
            }
        }
        Ok(())
    }

    fn main_at_height(&self, height: u64) -> Option<LowHash> {
        self.inner.read().heights.get(&height).copied()
    }

    fn iterate_by_height(&self, from: u64, to: u64) -> Vec<BlockInfo> {
        let inner = self.inner.read();
        inner
            .heights
            .range(from..=to)
            .filter_map(|(_, low_hash)| inner.infos.get(low_hash).cloned())
            .collect()
    }

    fn meta(&self) -> Option<StoreMeta> {
        self.inner.read().meta
    }

    fn set_meta(&self, meta: StoreMeta) -> Result<(), StorageError> {
        self.inner.write().meta = Some(meta);
        Ok(())
    }
}
