//! DAG consensus core and P2P message plane for an Xdag-style node.
//!
//! Leaves-first, per spec.md §2:
//!
//! - [`crypto`] — hashing and signing primitives.
//! - [`types`] — `Hash256`, `LowHash`, `XAmount`, `Block`, `BlockInfo`.
//! - [`codec`] — the position-based 512-byte block codec and the wire
//!   message codec/framing.
//! - [`store`] — `BlockStore` plus in-memory and RocksDB-backed
//!   implementations.
//! - [`consensus`] — orphan pool, admission pipeline, difficulty,
//!   main-chain election/reorg, reward schedule.
//! - [`queue`] — per-peer bounded, priority-aware outbound message queue.
//! - [`net`] — wire opcodes exposed through [`codec`], plus peer
//!   handshake/liveness session state.
//! - [`sync`] — gap detection, request pipelining, and timeout handling.
//! - [`metrics`] — Prometheus registry and `/metrics` HTTP exporter.
//! - [`config`] — `NodeConfig` aggregate and CLI parsing.

pub mod codec;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod metrics;
pub mod net;
pub mod queue;
pub mod store;
pub mod sync;
pub mod types;

pub use codec::{decode_block, encode_block, hash_block, BlockCodecError};
pub use codec::{
    DisconnectReason, Frame, HandshakeBody, MainBlockHeaderBody, Message, Opcode, WireError,
};

pub use config::{Cli, ConfigError, MetricsConfig, Network, NetworkConfig, NodeConfig};

pub use consensus::{
    AdmissionOutcome, ConsensusConfig, ConsensusError, DagEngine, OrphanPool, ReorgOutcome,
    ValidationError,
};

pub use crypto::{
    dsha256, hmac_sha512, keccak256, public_key_from_secret, recover_any_public_key,
    recover_public_key, ripemd160_sha256, sha256, sign_recoverable, verify_against_pubkey,
    verify_recoverable, Digest32, KeyError, Signature65,
};

pub use metrics::{run_prometheus_http_server, ConsensusMetrics, MetricsRegistry, QueueMetrics, StoreMetrics};

pub use net::{PeerRegistry, PeerSession, SessionConfig, SessionState};

pub use queue::{MessageQueue, MessageQueueConfig, QueueState, Transport, TransportError};

pub use store::{BlockStore, InMemoryBlockStore, RocksDbBlockStore, RocksDbConfig, StorageError, StoreMeta};

pub use sync::{SyncConfig, SyncController, SyncState, TimeoutAction};

pub use types::{
    Block, BlockBuilder, BlockFlags, BlockInfo, BlockType, FieldKind, FieldSlot, Hash256, Header,
    Link, LinkKind, LowHash, SnapshotInfo, XAmount, BLOCK_SIZE, FIELD_COUNT, HASH_LEN,
};
