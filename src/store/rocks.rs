//! RocksDB-backed block store.
//!
//! Four column families back a node's persisted state (spec.md §4.2,
//! §6): `blocks` (low-hash -> 512-byte block), `info` (low-hash ->
//! encoded [`BlockInfo`]), `heights` (height -> low-hash of the main
//! block there), and `meta` (the single node-wide [`StoreMeta`] record).
//! `put` writes `blocks` and `info` together in one [`rocksdb::WriteBatch`]
//! so a reader never observes one without the other.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};

use crate::codec::block_codec::{decode_block, encode_block};
use crate::types::{Block, BlockFlags, BlockInfo, LowHash, HASH_LEN};

use super::{BlockStore, StorageError, StoreMeta};

const CF_BLOCKS: &str = "blocks";
const CF_INFO: &str = "info";
const CF_HEIGHTS: &str = "heights";
const CF_META: &str = "meta";
const META_KEY: &[u8] = b"meta";

/// Configuration for [`RocksDbBlockStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if
    /// they do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/xdagj-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`BlockStore`].
///
/// Cheaply [`Clone`]: every clone shares the same underlying `DB`
/// handle via `Arc`, which is how a read-only handle reaches peer I/O
/// threads while the consensus thread keeps exclusive write access
/// (spec.md §5 — "all other threads hold a read-only view").
#[derive(Clone)]
pub struct RocksDbBlockStore {
    db: Arc<DB>,
}

impl RocksDbBlockStore {
    /// Opens (or creates) a RocksDB-backed block store at `cfg.path`.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_BLOCKS, Options::default()),
            ColumnFamilyDescriptor::new(CF_INFO, Options::default()),
            ColumnFamilyDescriptor::new(CF_HEIGHTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn encode_info(info: &BlockInfo) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(info).map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn decode_info(bytes: &[u8]) -> Option<BlockInfo> {
        bincode::deserialize(bytes).ok()
    }

    fn encode_meta(meta: &StoreMeta) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 4 + HASH_LEN + HASH_LEN + 8);
        out.extend_from_slice(&meta.schema_version.to_le_bytes());
        out.extend_from_slice(&meta.network_id.to_le_bytes());
        out.extend_from_slice(meta.genesis_low_hash.as_bytes());
        out.extend_from_slice(meta.tip_low_hash.as_bytes());
        out.extend_from_slice(&meta.tip_height.to_le_bytes());
        out
    }

    fn decode_meta(bytes: &[u8]) -> Result<StoreMeta, StorageError> {
        if bytes.len() != 2 + 4 + HASH_LEN * 2 + 8 {
            return Err(StorageError::CorruptedMeta("wrong length"));
        }
        let schema_version = u16::from_le_bytes(bytes[0..2].try_into().unwrap());
        let network_id = u32::from_le_bytes(bytes[2..6].try_into().unwrap());
        let mut genesis = [0u8; HASH_LEN];
        genesis.copy_from_slice(&bytes[6..6 + HASH_LEN]);
        let tip_off = 6 + HASH_LEN;
        let mut tip = [0u8; HASH_LEN];
        tip.copy_from_slice(&bytes[tip_off..tip_off + HASH_LEN]);
        let height_off = tip_off + HASH_LEN;
        let tip_height = u64::from_le_bytes(bytes[height_off..height_off + 8].try_into().unwrap());
        Ok(StoreMeta {
            schema_version,
            network_id,
            genesis_low_hash: LowHash(genesis),
            tip_low_hash: LowHash(tip),
            tip_height,
        })
    }
}

impl BlockStore for RocksDbBlockStore {
    fn get_block(&self, low_hash: &LowHash) -> Option<Block> {
        let cf = self.cf(CF_BLOCKS).ok()?;
        let bytes = self.db.get_cf(&cf, low_hash.as_bytes()).ok()??;
        decode_block(&bytes).ok()
    }

    fn get_info(&self, low_hash: &LowHash) -> Option<BlockInfo> {
        let cf = self.cf(CF_INFO).ok()?;
        let bytes = self.db.get_cf(&cf, low_hash.as_bytes()).ok()??;
        Self::decode_info(&bytes)
    }

    fn put(&self, block: &Block, info: &BlockInfo) -> Result<(), StorageError> {
        let cf_blocks = self.cf(CF_BLOCKS)?;
        let cf_info = self.cf(CF_INFO)?;
        let info_bytes = Self::encode_info(info)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_blocks, info.hashlow.as_bytes(), encode_block(block));
        batch.put_cf(&cf_info, info.hashlow.as_bytes(), info_bytes);
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn update_flags(&self, low_hash: &LowHash, flags: BlockFlags) -> Result<(), StorageError> {
        let mut info = self
            .get_info(low_hash)
            .ok_or(StorageError::NotFound(*low_hash))?;
        info.flags = flags;
        let cf_info = self.cf(CF_INFO)?;
        let bytes = Self::encode_info(&info)?;
        self.db
            .put_cf(&cf_info, low_hash.as_bytes(), bytes)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn set_height_index(&self, height: u64, low_hash: Option<LowHash>) -> Result<(), StorageError> {
        let cf = self.cf(CF_HEIGHTS)?;
        let key = height.to_be_bytes();
        match low_hash {
            Some(h) => self
                .db
                .put_cf(&cf, key, h.as_bytes())
                .map_err(|e| StorageError::Backend(e.to_string())),
            None => self
                .db
                .delete_cf(&cf, key)
                .map_err(|e| StorageError::Backend(e.to_string())),
        }
    }

    fn main_at_height(&self, height: u64) -> Option<LowHash> {
        let cf = self.cf(CF_HEIGHTS).ok()?;
        let bytes = self.db.get_cf(&cf, height.to_be_bytes()).ok()??;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Some(LowHash(arr))
    }

    fn iterate_by_height(&self, from: u64, to: u64) -> Vec<BlockInfo> {
        let Ok(cf_heights) = self.cf(CF_HEIGHTS) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_heights,
            rocksdb::IteratorMode::From(&from.to_be_bytes(), rocksdb::Direction::Forward),
        );
        for item in iter {
            let Ok((key, value)) = item else { break };
            if key.len() != 8 {
                continue;
            }
            let height = u64::from_be_bytes(key.as_ref().try_into().unwrap());
            if height > to {
                break;
            }
            if value.len() != HASH_LEN {
                continue;
            }
            let mut arr = [0u8; HASH_LEN];
            arr.copy_from_slice(&value);
            if let Some(info) = self.get_info(&LowHash(arr)) {
                out.push(info);
            }
        }
        out
    }

    fn meta(&self) -> Option<StoreMeta> {
        let cf = self.cf(CF_META).ok()?;
        let bytes = self.db.get_cf(&cf, META_KEY).ok()??;
        Self::decode_meta(&bytes).ok()
    }

    fn set_meta(&self, meta: StoreMeta) -> Result<(), StorageError> {
        let cf = self.cf(CF_META)?;
        self.db
            .put_cf(&cf, META_KEY, Self::encode_meta(&meta))
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}
