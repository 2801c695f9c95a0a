//! `xdagj-core` node binary.
//!
//! Wires the library crate into a running node: parses the CLI surface
//! (spec.md §6), opens the block store, bootstraps the genesis block on
//! a fresh datadir, starts the Prometheus exporter, and runs the P2P
//! listener plus the consensus thread that owns the [`DagEngine`].
//!
//! Thread layout mirrors spec.md §5: one blocking OS thread per peer
//! connection does raw socket I/O, a scheduler thread drives every
//! session's [`MessageQueue::tick`] and ping cadence, and a single
//! consensus thread serialises all block admission and main-chain
//! election against the store.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, error, info, warn};

use xdagj_core::{
    hash_block, Block, BlockBuilder, BlockFlags, BlockInfo, BlockStore, Cli, ConsensusError,
    DagEngine, DisconnectReason, Frame, HandshakeBody, LowHash, MainBlockHeaderBody, Message,
    MetricsRegistry, NodeConfig, PeerRegistry, PeerSession, RocksDbBlockStore, SessionConfig,
    SessionState, StoreMeta, Transport, TransportError, XAmount,
};

/// Exit codes per spec.md §6.
mod exit {
    pub const INVALID_CONFIG: i32 = 1;
    pub const STORE_CORRUPTION: i32 = 2;
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = match NodeConfig::from_cli(cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(exit::INVALID_CONFIG);
        }
    };

    let store = match RocksDbBlockStore::open(&cfg.storage) {
        Ok(store) => store,
        Err(err) => {
            error!(?err, path = %cfg.storage.path, "failed to open block store");
            std::process::exit(exit::STORE_CORRUPTION);
        }
    };

    if let Err(err) = bootstrap_genesis(&store, cfg.network.network.id()) {
        error!(?err, "failed to bootstrap genesis block");
        std::process::exit(exit::STORE_CORRUPTION);
    }

    let metrics = match MetricsRegistry::new() {
        Ok(m) => Some(Arc::new(m)),
        Err(err) => {
            warn!(%err, "metrics registry unavailable, continuing without it");
            None
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    if let (true, Some(metrics)) = (cfg.metrics.enabled, metrics.clone()) {
        let addr = cfg.metrics.listen_addr;
        runtime.spawn(async move {
            if let Err(err) = xdagj_core::run_prometheus_http_server(metrics, addr).await {
                error!(%err, "metrics HTTP server stopped");
            }
        });
        info!(%addr, "metrics exporter listening");
    }

    let (block_tx, block_rx) = mpsc::channel::<Block>();
    let engine_cfg = cfg.consensus.clone();
    let epoch_length = engine_cfg.epoch_length;

    // Peer threads only ever read through this handle (spec.md §5); it
    // shares the same underlying RocksDB handle as the consensus
    // thread's store, which remains the sole writer.
    let reader_store = store.clone();
    let peer_registry = Arc::new(PeerRegistry::new());

    let consensus_handle = std::thread::spawn(move || {
        run_consensus_thread(store, engine_cfg, block_rx, metrics);
    });

    let local_node_id = {
        let mut id = [0u8; 20];
        id[..4].copy_from_slice(&std::process::id().to_le_bytes());
        id
    };
    let session_cfg = SessionConfig {
        network_id: cfg.network.network.id(),
        protocol_version: 1,
        max_missed_pongs: 2,
    };
    let local_handshake = HandshakeBody {
        network_id: session_cfg.network_id,
        protocol_version: session_cfg.protocol_version,
        tip_low_hash: LowHash::zero(),
        listen_port: cfg.network.listen_port,
        node_id: local_node_id,
    };

    for bootnode in &cfg.network.bootnodes {
        let bootnode = bootnode.clone();
        let tx = block_tx.clone();
        let session_cfg = session_cfg;
        let local_handshake = local_handshake;
        let reader_store = reader_store.clone();
        let peer_registry = peer_registry.clone();
        std::thread::spawn(move || match TcpStream::connect(&bootnode) {
            Ok(stream) => serve_peer(
                stream,
                session_cfg,
                local_handshake,
                tx,
                reader_store,
                peer_registry,
            ),
            Err(err) => warn!(%bootnode, %err, "failed to connect to bootnode"),
        });
    }

    let listen_addr = format!("0.0.0.0:{}", cfg.network.listen_port);
    match TcpListener::bind(&listen_addr) {
        Ok(listener) => {
            info!(%listen_addr, "p2p listener bound");
            for incoming in listener.incoming() {
                match incoming {
                    Ok(stream) => {
                        let tx = block_tx.clone();
                        let session_cfg = session_cfg;
                        let local_handshake = local_handshake;
                        let reader_store = reader_store.clone();
                        let peer_registry = peer_registry.clone();
                        std::thread::spawn(move || {
                            serve_peer(
                                stream,
                                session_cfg,
                                local_handshake,
                                tx,
                                reader_store,
                                peer_registry,
                            )
                        });
                    }
                    Err(err) => warn!(%err, "failed to accept peer connection"),
                }
            }
        }
        Err(err) => warn!(%listen_addr, %err, "p2p listener unavailable, running store-only"),
    }

    let _ = epoch_length;
    let _ = consensus_handle.join();
}

/// Creates and persists the genesis block if the store has no `meta`
/// record yet (a fresh datadir). No-op on an already-bootstrapped store.
fn bootstrap_genesis(
    store: &RocksDbBlockStore,
    network_id: u32,
) -> Result<(), xdagj_core::StorageError> {
    if store.meta().is_some() {
        return Ok(());
    }

    let genesis_block = BlockBuilder::new(0).build();
    let hash = hash_block(&genesis_block);
    let low_hash = hash.low_hash();
    let info = BlockInfo {
        height: 0,
        difficulty: primitive_types::U256::one(),
        reference: None,
        max_diff_link: None,
        fee: XAmount::ZERO,
        hash: low_hash,
        hashlow: low_hash,
        amount: XAmount::ZERO,
        timestamp: 0,
        flags: BlockFlags::MAIN | BlockFlags::MAIN_CHAIN | BlockFlags::APPLIED,
        remark: None,
        snapshot_info: None,
    };
    store.put(&genesis_block, &info)?;
    store.set_height_index(0, Some(low_hash))?;
    store.set_meta(StoreMeta::genesis(network_id, low_hash))?;
    info!(%low_hash, "bootstrapped genesis block");
    Ok(())
}

/// Owns the [`DagEngine`] for this process's lifetime: admits every
/// block forwarded by a peer thread and runs one election epoch per
/// `cfg.epoch_length` over whatever was admitted since the last tick.
fn run_consensus_thread(
    store: RocksDbBlockStore,
    cfg: xdagj_core::ConsensusConfig,
    block_rx: mpsc::Receiver<Block>,
    metrics: Option<Arc<MetricsRegistry>>,
) {
    let epoch_length = cfg.epoch_length;
    let mut engine = DagEngine::new(store, cfg);
    let mut epoch_candidates: Vec<LowHash> = Vec::new();
    let mut last_epoch = Instant::now();

    loop {
        let timeout = epoch_length.saturating_sub(last_epoch.elapsed());
        match block_rx.recv_timeout(timeout) {
            Ok(block) => {
                let start = Instant::now();
                match engine.submit_block(block) {
                    Ok(xdagj_core::AdmissionOutcome::Applied {
                        low_hash,
                        mut unblocked,
                    }) => {
                        epoch_candidates.push(low_hash);
                        epoch_candidates.append(&mut unblocked);
                    }
                    Ok(xdagj_core::AdmissionOutcome::Parked { missing }) => {
                        debug!(?missing, "block parked pending links");
                    }
                    Err(ConsensusError::Invalid(err)) => {
                        debug!(%err, "rejected invalid block");
                    }
                    Err(err) => {
                        error!(%err, "fatal consensus error, shutting down");
                        std::process::exit(exit::STORE_CORRUPTION);
                    }
                }
                if let Some(metrics) = &metrics {
                    metrics
                        .consensus
                        .block_validation_seconds
                        .observe(start.elapsed().as_secs_f64());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if last_epoch.elapsed() >= epoch_length {
            match engine.run_epoch(&epoch_candidates) {
                Ok(Some(outcome)) => {
                    info!(
                        new_tip = %outcome.new_tip,
                        height = outcome.new_tip_height,
                        reverted = outcome.reverted.len(),
                        applied = outcome.applied.len(),
                        "main-chain election adopted a new tip"
                    );
                    if let Some(metrics) = &metrics {
                        metrics.consensus.reorgs_total.inc();
                        metrics
                            .consensus
                            .reorg_depth
                            .observe(outcome.reverted.len() as f64);
                    }
                }
                Ok(None) => {}
                Err(err) => error!(%err, "main-chain election failed"),
            }
            epoch_candidates.clear();
            last_epoch = Instant::now();
        }

        if let Some(metrics) = &metrics {
            metrics
                .consensus
                .orphan_pool_size
                .set(engine.orphan_count() as i64);
        }
    }
}

/// Blocking read/write loop for one peer connection: performs the
/// handshake, answers PING with PONG, forwards `MAIN_BLOCK`/`NEW_BLOCK`
/// payloads to the consensus thread, answers `GET_MAIN_BLOCK` /
/// `GET_MAIN_BLOCK_HEADER` out of `reader_store`, and drives the
/// outbound queue.
fn serve_peer(
    stream: TcpStream,
    cfg: SessionConfig,
    local_handshake: HandshakeBody,
    block_tx: mpsc::Sender<Block>,
    reader_store: RocksDbBlockStore,
    peer_registry: Arc<PeerRegistry>,
) {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let read_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            warn!(%peer_addr, %err, "failed to clone peer stream");
            return;
        }
    };

    let transport = StdTcpTransport(stream);
    let session = Arc::new(Mutex::new(PeerSession::new(transport, cfg, local_handshake)));
    session.lock().unwrap().begin_handshake();

    let ticker_session = session.clone();
    std::thread::spawn(move || {
        const PING_INTERVAL: Duration = Duration::from_secs(15);
        let mut last_ping = Instant::now();
        loop {
            std::thread::sleep(Duration::from_millis(10));
            let mut s = ticker_session.lock().unwrap();
            if matches!(s.state(), SessionState::Closed(_)) {
                break;
            }
            let _ = s.queue().tick();
            if last_ping.elapsed() >= PING_INTERVAL {
                s.send_ping(rand::random());
                last_ping = Instant::now();
            }
        }
    });

    let result = read_loop(read_stream, &session, &block_tx, &reader_store, &peer_registry);
    if let Some(node_id) = session.lock().unwrap().remote_node_id() {
        peer_registry.remove(&node_id);
    }
    if let Err(err) = result {
        warn!(%peer_addr, %err, "peer connection closed");
    }
}

fn read_loop(
    mut stream: TcpStream,
    session: &Arc<Mutex<PeerSession<StdTcpTransport>>>,
    block_tx: &mpsc::Sender<Block>,
    reader_store: &RocksDbBlockStore,
    peer_registry: &PeerRegistry,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if matches!(session.lock().unwrap().state(), SessionState::Closed(_)) {
            return Ok(());
        }

        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        loop {
            match Frame::try_decode(&buf) {
                Ok(Some((message, consumed))) => {
                    buf.drain(..consumed);
                    handle_message(message, session, block_tx, reader_store, peer_registry);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "dropping peer: malformed frame");
                    session
                        .lock()
                        .unwrap()
                        .close(DisconnectReason::UnexpectedMessage);
                    return Ok(());
                }
            }
        }
    }
}

fn handle_message(
    message: Message,
    session: &Arc<Mutex<PeerSession<StdTcpTransport>>>,
    block_tx: &mpsc::Sender<Block>,
    reader_store: &RocksDbBlockStore,
    peer_registry: &PeerRegistry,
) {
    let mut s = session.lock().unwrap();
    match message {
        Message::Handshake(remote) => {
            let already_connected = !peer_registry.try_register(remote.node_id);
            s.receive_handshake(remote, already_connected);
        }
        Message::PingPong { nonce } => {
            // PING and PONG share opcode 0x02 (spec.md §6); the nonce
            // against our own outstanding ping is what tells them apart.
            if s.is_pending_pong(nonce) {
                s.receive_pong(nonce);
            } else {
                s.receive_ping(nonce);
            }
        }
        Message::MainBlock { block } | Message::NewBlock { block } => {
            let _ = block_tx.send(block);
        }
        Message::GetMainBlock { low_hash } => {
            match reader_store.get_block(&low_hash) {
                Some(block) => {
                    s.queue().send(Message::MainBlock { block });
                }
                None => debug!(%low_hash, "GET_MAIN_BLOCK for unknown block, ignoring"),
            }
        }
        Message::GetMainBlockHeader { height } => {
            match reader_store
                .main_at_height(height)
                .and_then(|low_hash| reader_store.get_info(&low_hash).map(|info| (low_hash, info)))
            {
                Some((low_hash, info)) => {
                    s.queue().send(Message::MainBlockHeader(MainBlockHeaderBody {
                        height,
                        low_hash,
                        timestamp_ms: info.timestamp,
                    }));
                }
                None => debug!(height, "GET_MAIN_BLOCK_HEADER for unelected height, ignoring"),
            }
        }
        Message::MainBlockHeader(_) | Message::Disconnect { .. } => {}
    }
}

/// Adapts a blocking [`TcpStream`] to [`Transport`].
struct StdTcpTransport(TcpStream);

impl Transport for StdTcpTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.0
            .write_all(bytes)
            .map_err(|e| TransportError(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.0.flush().map_err(|e| TransportError(e.to_string()))
    }

    fn shutdown(&mut self) {
        let _ = self.0.shutdown(std::net::Shutdown::Both);
    }
}

