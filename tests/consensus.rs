//! End-to-end scenarios from spec.md §8: single-chain growth, a depth-3
//! reorg, orphan resolution, queue overflow, priority preemption, and
//! double-spend rejection. Each test drives the public crate surface
//! the way a real node would, rather than poking at module internals.

use std::sync::{Arc, Mutex};

use xdagj_core::consensus::reward::coinbase_reward;
use xdagj_core::{
    hash_block, public_key_from_secret, sign_recoverable, AdmissionOutcome, Block, BlockBuilder,
    BlockFlags, BlockInfo, BlockStore, ConsensusConfig, ConsensusError, DagEngine,
    DisconnectReason, Frame, InMemoryBlockStore, Link, LowHash, Message, MessageQueue,
    MessageQueueConfig, Opcode, StoreMeta, Transport, TransportError, ValidationError, XAmount,
    HASH_LEN,
};

fn low(byte: u8) -> LowHash {
    LowHash([byte; HASH_LEN])
}

fn genesis_block() -> Block {
    BlockBuilder::new(0).build()
}

/// Seeds a fresh store with a genesis block at height 0, already main.
fn engine_with_genesis() -> (DagEngine<InMemoryBlockStore>, LowHash) {
    let store = InMemoryBlockStore::new();
    let genesis = hash_block(&genesis_block()).low_hash();
    let info = BlockInfo {
        height: 0,
        difficulty: primitive_types::U256::one(),
        reference: None,
        max_diff_link: None,
        fee: XAmount::ZERO,
        hash: genesis,
        hashlow: genesis,
        amount: XAmount::ZERO,
        timestamp: 0,
        flags: BlockFlags::MAIN | BlockFlags::MAIN_CHAIN | BlockFlags::APPLIED,
        remark: None,
        snapshot_info: None,
    };
    store.put(&genesis_block(), &info).unwrap();
    store.set_height_index(0, Some(genesis)).unwrap();
    store.set_meta(StoreMeta::genesis(1, genesis)).unwrap();
    (DagEngine::new(store, ConsensusConfig::default()), genesis)
}

/// Builds and admits one block linking to `parent` (zero-amount output
/// link, just to anchor `max_diff_link`), then runs an epoch so it is
/// immediately elected main. Returns its low-hash.
fn grow_main_chain(
    engine: &mut DagEngine<InMemoryBlockStore>,
    parent: LowHash,
    seq: u64,
) -> LowHash {
    let block = BlockBuilder::new(seq)
        .output_link(Link::new(XAmount::ZERO, parent))
        .build();
    let low_hash = hash_block(&block).low_hash();
    match engine.submit_block(block).unwrap() {
        AdmissionOutcome::Applied { low_hash: got, .. } => assert_eq!(got, low_hash),
        other => panic!("expected Applied, got {other:?}"),
    }
    engine
        .run_epoch(&[low_hash])
        .unwrap()
        .expect("heavier cumulative difficulty must be adopted");
    low_hash
}

#[test]
fn single_chain_linear_growth_reaches_height_ten_with_no_unwind() {
    let (mut engine, genesis) = engine_with_genesis();

    let mut parent = genesis;
    for seq in 1..=10u64 {
        parent = grow_main_chain(&mut engine, parent, seq);
    }

    let meta = engine.store().meta().unwrap();
    assert_eq!(meta.tip_height, 10);
    assert_eq!(meta.tip_low_hash, parent);

    let mut total_coinbase = XAmount::ZERO;
    for height in 1..=10u64 {
        let low_hash = engine.store().main_at_height(height).unwrap();
        let info = engine.store().get_info(&low_hash).unwrap();
        assert!(!info.flags.contains(BlockFlags::UNWIND));
        assert!(info.flags.contains(BlockFlags::MAIN));
        total_coinbase = total_coinbase.saturating_add(info.amount);
    }
    assert_eq!(total_coinbase, XAmount::from_xdag(1024 * 10));
}

#[test]
fn reorg_of_depth_three_unwinds_chain_a_and_adopts_chain_b() {
    let cfg = ConsensusConfig::default();
    let store = InMemoryBlockStore::new();

    let genesis = low(0);
    let shared2 = low(2);
    let a = [low(3), low(4), low(5)];
    let b = [low(13), low(14), low(15)];

    let put_main = |hash: LowHash, height: u64, difficulty: u64, max_diff_link: Option<LowHash>| {
        let reward = coinbase_reward(height, &cfg);
        let info = BlockInfo {
            height,
            difficulty: primitive_types::U256::from(difficulty),
            reference: max_diff_link,
            max_diff_link,
            fee: XAmount::ZERO,
            hash,
            hashlow: hash,
            amount: reward,
            timestamp: height,
            flags: BlockFlags::MAIN | BlockFlags::MAIN_CHAIN | BlockFlags::APPLIED,
            remark: None,
            snapshot_info: None,
        };
        store.put(&BlockBuilder::new(height).build(), &info).unwrap();
        store.set_height_index(height, Some(hash)).unwrap();
    };

    put_main(genesis, 0, 1, None);
    put_main(shared2, 2, 3, Some(genesis));
    put_main(a[0], 3, 4, Some(shared2));
    put_main(a[1], 4, 5, Some(a[0]));
    put_main(a[2], 5, 6, Some(a[1]));

    store
        .set_meta(StoreMeta {
            schema_version: StoreMeta::SCHEMA_VERSION,
            network_id: 1,
            genesis_low_hash: genesis,
            tip_low_hash: a[2],
            tip_height: 5,
        })
        .unwrap();

    // Chain B: applied but not yet main, heavier cumulative difficulty.
    let put_candidate = |hash: LowHash, difficulty: u64, max_diff_link: Option<LowHash>| {
        let info = BlockInfo {
            height: 0,
            difficulty: primitive_types::U256::from(difficulty),
            reference: max_diff_link,
            max_diff_link,
            fee: XAmount::ZERO,
            hash,
            hashlow: hash,
            amount: XAmount::ZERO,
            timestamp: 0,
            flags: BlockFlags::APPLIED,
            remark: None,
            snapshot_info: None,
        };
        store.put(&BlockBuilder::new(0).build(), &info).unwrap();
    };
    put_candidate(b[0], 20, Some(shared2));
    put_candidate(b[1], 21, Some(b[0]));
    put_candidate(b[2], 22, Some(b[1]));

    let mut engine = DagEngine::new(store, cfg.clone());
    let outcome = engine
        .run_epoch(&[b[0], b[1], b[2]])
        .unwrap()
        .expect("heavier chain B must trigger a reorg");

    assert_eq!(outcome.fork_height, 2);
    assert_eq!(outcome.reverted, vec![a[2], a[1], a[0]]);
    assert_eq!(outcome.applied, vec![b[0], b[1], b[2]]);
    assert_eq!(outcome.new_tip, b[2]);
    assert_eq!(outcome.new_tip_height, 5);

    for old in a.iter() {
        let info = engine.store().get_info(old).unwrap();
        assert!(info.flags.contains(BlockFlags::UNWIND));
        assert!(!info.flags.contains(BlockFlags::MAIN));
        assert_eq!(info.amount, XAmount::ZERO);
    }

    for (new, height) in b.iter().zip(3..=5u64) {
        let info = engine.store().get_info(new).unwrap();
        assert!(info.flags.contains(BlockFlags::MAIN));
        assert!(!info.flags.contains(BlockFlags::UNWIND));
        assert_eq!(info.height, height);
        assert_eq!(info.amount, coinbase_reward(height, &cfg));
    }

    let meta = engine.store().meta().unwrap();
    assert_eq!(meta.tip_height, 5);
    assert_eq!(meta.tip_low_hash, b[2]);
}

#[test]
fn orphan_arrival_reaches_the_same_state_as_dependency_first_order() {
    let (mut dependency_first, _) = engine_with_genesis();
    let (mut orphan_first, _) = engine_with_genesis();

    let dependency = BlockBuilder::new(1).remark([5u8; 32]).build();
    let dependency_hash = hash_block(&dependency).low_hash();

    let spend = BlockBuilder::new(2)
        .output_link(Link::new(XAmount::ZERO, dependency_hash))
        .build();
    let spend_hash = hash_block(&spend).low_hash();

    dependency_first.submit_block(dependency.clone()).unwrap();
    dependency_first.submit_block(spend.clone()).unwrap();

    let parked = orphan_first.submit_block(spend).unwrap();
    assert!(matches!(parked, AdmissionOutcome::Parked { .. }));
    assert_eq!(orphan_first.orphan_count(), 1);

    let resolved = orphan_first.submit_block(dependency).unwrap();
    match resolved {
        AdmissionOutcome::Applied { unblocked, .. } => assert_eq!(unblocked, vec![spend_hash]),
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(orphan_first.orphan_count(), 0);

    let a_dep = dependency_first.store().get_info(&dependency_hash).unwrap();
    let b_dep = orphan_first.store().get_info(&dependency_hash).unwrap();
    assert_eq!(a_dep, b_dep);

    let a_spend = dependency_first.store().get_info(&spend_hash).unwrap();
    let b_spend = orphan_first.store().get_info(&spend_hash).unwrap();
    assert_eq!(a_spend, b_spend);
}

/// Records every frame handed to the transport in a shared buffer so the
/// test can inspect it after the queue (which owns the transport) has
/// been ticked.
#[derive(Clone, Default)]
struct RecordingTransport {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for RecordingTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}

fn get_block_msg(byte: u8) -> Message {
    Message::GetMainBlock { low_hash: low(byte) }
}

fn decode_opcodes(writes: &[Vec<u8>]) -> Vec<Opcode> {
    writes
        .iter()
        .map(|bytes| Opcode::from_byte(bytes[4]).unwrap())
        .collect()
}

#[test]
fn queue_overflow_at_four_messages_disconnects_the_fifth() {
    let frame_len = Frame::encode(&get_block_msg(0)).len();
    let cfg = MessageQueueConfig {
        max_queue_bytes: 4 * frame_len,
        priority_opcodes: [Opcode::PingPong].into_iter().collect(),
        max_messages_per_tick: 5,
    };
    let transport = RecordingTransport::default();
    let writes = transport.writes.clone();
    let mut queue = MessageQueue::new(transport, cfg);
    queue.activate();

    for i in 0..4u8 {
        assert!(queue.send(get_block_msg(i)), "message {i} should fit");
    }
    assert!(!queue.send(get_block_msg(99)));

    queue.tick().unwrap();

    let writes = writes.lock().unwrap();
    let last = writes.last().unwrap();
    let msg = Message::decode(Opcode::from_byte(last[4]).unwrap(), &last[5..]).unwrap();
    assert_eq!(
        msg,
        Message::Disconnect {
            reason: DisconnectReason::MessageQueueFull
        }
    );
}

#[test]
fn priority_message_preempts_already_queued_normal_messages() {
    let cfg = MessageQueueConfig {
        max_queue_bytes: 1024 * 1024,
        priority_opcodes: [Opcode::PingPong].into_iter().collect(),
        max_messages_per_tick: 10,
    };
    let transport = RecordingTransport::default();
    let writes = transport.writes.clone();
    let mut queue = MessageQueue::new(transport, cfg);
    queue.activate();

    queue.send(get_block_msg(1));
    queue.send(get_block_msg(2));
    queue.send(get_block_msg(3));
    queue.send(Message::PingPong { nonce: 7 });

    queue.tick().unwrap();

    let writes = writes.lock().unwrap();
    assert_eq!(
        decode_opcodes(&writes),
        vec![
            Opcode::PingPong,
            Opcode::GetMainBlock,
            Opcode::GetMainBlock,
            Opcode::GetMainBlock,
        ]
    );
}

#[test]
fn second_spender_of_the_same_input_is_rejected_as_a_double_spend() {
    let (mut engine, _genesis) = engine_with_genesis();

    // Seed a funded account directly: a block with its own public key
    // and an existing balance, standing in for money received earlier.
    let owner_sk = {
        let mut sk = [9u8; 32];
        sk[0] |= 1;
        sk
    };
    let owner_pk = public_key_from_secret(&owner_sk).unwrap();
    let owner_hash = low(7);
    engine
        .store()
        .put(
            &BlockBuilder::new(1).public_key(owner_pk).build(),
            &BlockInfo {
                height: 0,
                difficulty: primitive_types::U256::one(),
                reference: None,
                max_diff_link: None,
                fee: XAmount::ZERO,
                hash: owner_hash,
                hashlow: owner_hash,
                amount: XAmount::from_xdag(10),
                timestamp: 0,
                flags: BlockFlags::APPLIED,
                remark: None,
                snapshot_info: None,
            },
        )
        .unwrap();

    let link = Link::new(XAmount::from_xdag(10), owner_hash);

    let sign_spend = |seq: u64| {
        let placeholder = BlockBuilder::new(seq)
            .input_link(link)
            .in_signature([0u8; 64])
            .build();
        let sig = sign_recoverable(&owner_sk, &placeholder.bytes_excluding_signatures()).unwrap();
        let mut sig64 = [0u8; 64];
        sig64.copy_from_slice(&sig.as_bytes()[..64]);
        BlockBuilder::new(seq)
            .input_link(link)
            .in_signature(sig64)
            .build()
    };

    assert!(matches!(
        engine.submit_block(sign_spend(2)).unwrap(),
        AdmissionOutcome::Applied { .. }
    ));

    let err = engine.submit_block(sign_spend(3)).unwrap_err();
    assert!(matches!(
        err,
        ConsensusError::Invalid(ValidationError::DoubleSpend(hash)) if hash == owner_hash
    ));
}
