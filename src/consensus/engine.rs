//! The DAG engine: orchestrates admission (spec.md §4.3), orphan
//! resolution, and main-chain election/reorg (spec.md §4.4) against a
//! [`BlockStore`].
//!
//! A single [`DagEngine`] is meant to be owned by one consensus thread
//! (spec.md §5); nothing here takes a lock because nothing here is
//! shared. The store itself tolerates concurrent readers while this is
//! the only writer.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use primitive_types::U256;

use crate::codec::block_codec;
use crate::store::{BlockStore, StoreMeta};
use crate::types::{Block, BlockFlags, BlockInfo, Link, LowHash, XAmount};

use super::config::ConsensusConfig;
use super::difficulty::{block_difficulty, cumulative_difficulty};
use super::error::{ConsensusError, ValidationError};
use super::fork_choice::{self, ReorgPlan};
use super::orphan::OrphanPool;
use super::reward::coinbase_reward;
use super::validator;

/// Outcome of [`DagEngine::submit_block`].
#[derive(Debug, Eq, PartialEq)]
pub enum AdmissionOutcome {
    /// The block was validated and applied (spec.md §4.3 step 6),
    /// possibly releasing previously parked orphans.
    Applied {
        low_hash: LowHash,
        unblocked: Vec<LowHash>,
    },
    /// At least one link target is missing; `b` was parked in the
    /// orphan pool.
    Parked { missing: Vec<LowHash> },
}

/// A completed main-chain reorganisation, reported for logging/metrics.
#[derive(Debug, Eq, PartialEq)]
pub struct ReorgOutcome {
    pub fork_height: u64,
    pub reverted: Vec<LowHash>,
    pub applied: Vec<LowHash>,
    pub new_tip: LowHash,
    pub new_tip_height: u64,
}

/// Orchestrates the full admission pipeline and epoch-driven
/// main-chain election over a single [`BlockStore`] backend.
pub struct DagEngine<S> {
    store: S,
    cfg: ConsensusConfig,
    orphans: OrphanPool,
}

impl<S: BlockStore> DagEngine<S> {
    pub fn new(store: S, cfg: ConsensusConfig) -> Self {
        DagEngine {
            store,
            cfg,
            orphans: OrphanPool::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Runs the admission pipeline (spec.md §4.3) for a freshly decoded
    /// block, applying it on success or parking it as an orphan.
    pub fn submit_block(&mut self, block: Block) -> Result<AdmissionOutcome, ConsensusError> {
        let now_ms = now_ms();
        self.admit(block, now_ms, Instant::now())
    }

    fn admit(
        &mut self,
        block: Block,
        now_ms: u64,
        now: Instant,
    ) -> Result<AdmissionOutcome, ConsensusError> {
        validator::check_timestamp(block.timestamp_ms(), now_ms, self.cfg.max_future_drift)?;

        let input_links = block.input_links();
        let output_links = block.output_links();

        match validator::resolve_links(&self.store, &input_links, &output_links) {
            validator::LinkResolution::Missing(missing) => {
                let hash = block_codec::hash_block(&block).low_hash();
                self.orphans.park(hash, block, &missing, now);
                return Ok(AdmissionOutcome::Parked { missing });
            }
            validator::LinkResolution::Ready => {}
        }

        validator::verify_signatures(&self.store, &block)?;
        let amounts = validator::check_arithmetic(&input_links, &output_links)?;
        validator::check_double_spend(&self.store, &input_links)?;

        let low_hash = self.apply_block(&block, &input_links, &output_links, amounts.fee)?;

        let mut unblocked = Vec::new();
        let mut pending = self.orphans.pop_waiting_on(low_hash);
        while let Some(orphan) = pending.pop() {
            match self.admit(orphan, now_ms, now)? {
                AdmissionOutcome::Applied {
                    low_hash: child_hash,
                    unblocked: mut child_unblocked,
                } => {
                    unblocked.push(child_hash);
                    unblocked.append(&mut child_unblocked);
                }
                AdmissionOutcome::Parked { .. } => {}
            }
        }

        Ok(AdmissionOutcome::Applied {
            low_hash,
            unblocked,
        })
    }

    /// Step 5-6: computes difficulty, debits/credits linked balances,
    /// and persists the new block.
    fn apply_block(
        &self,
        block: &Block,
        input_links: &[Link],
        output_links: &[Link],
        fee: XAmount,
    ) -> Result<LowHash, ConsensusError> {
        let hash = block_codec::hash_block(block);
        let low_hash = hash.low_hash();

        for link in input_links {
            self.debit(link)?;
        }
        for link in output_links {
            self.credit(link)?;
        }

        let own_difficulty = block_difficulty(&hash);
        let (cumulative, max_diff_link) =
            self.choose_max_diff_path(own_difficulty, input_links, output_links);
        let reference = output_links
            .first()
            .or(input_links.first())
            .map(|link| link.target());

        let info = BlockInfo {
            height: 0,
            difficulty: cumulative,
            reference,
            max_diff_link,
            fee,
            hash: low_hash,
            hashlow: low_hash,
            amount: XAmount::ZERO,
            timestamp: block.timestamp_ms(),
            flags: BlockFlags::APPLIED,
            remark: block.remark(),
            snapshot_info: None,
        };
        self.store.put(block, &info)?;
        Ok(low_hash)
    }

    fn debit(&self, link: &Link) -> Result<(), ConsensusError> {
        use crate::store::StorageError;

        let target = link.target();
        let target_block = self
            .store
            .get_block(&target)
            .ok_or(StorageError::NotFound(target))?;
        let mut info = self
            .store
            .get_info(&target)
            .ok_or(StorageError::NotFound(target))?;
        info.amount = info
            .amount
            .checked_sub(link.amount)
            .ok_or(ValidationError::DoubleSpend(target))?;
        self.store.put(&target_block, &info)?;
        Ok(())
    }

    fn credit(&self, link: &Link) -> Result<(), ConsensusError> {
        use crate::store::StorageError;

        let target = link.target();
        let target_block = self
            .store
            .get_block(&target)
            .ok_or(StorageError::NotFound(target))?;
        let mut info = self
            .store
            .get_info(&target)
            .ok_or(StorageError::NotFound(target))?;
        info.amount = info.amount.saturating_add(link.amount);
        self.store.put(&target_block, &info)?;
        Ok(())
    }

    /// Cumulative difficulty (spec.md §4.3 step 5): this block's own
    /// difficulty plus the highest cumulative difficulty among its
    /// links that are themselves main-chain-reachable. A block with no
    /// such link anchors only itself.
    fn choose_max_diff_path(
        &self,
        own_difficulty: U256,
        input_links: &[Link],
        output_links: &[Link],
    ) -> (U256, Option<LowHash>) {
        let best = input_links
            .iter()
            .chain(output_links.iter())
            .filter_map(|link| {
                let target = link.target();
                self.store.get_info(&target).and_then(|info| {
                    info.flags
                        .contains(BlockFlags::MAIN_CHAIN)
                        .then_some((target, info.difficulty))
                })
            })
            .max_by_key(|(_, difficulty)| *difficulty);

        match best {
            Some((target, predecessor_cumulative)) => (
                cumulative_difficulty(own_difficulty, Some(predecessor_cumulative)),
                Some(target),
            ),
            None => (cumulative_difficulty(own_difficulty, None), None),
        }
    }

    /// Runs one main-chain election epoch (spec.md §4.4) over
    /// `candidates`: applied-but-not-yet-main blocks whose timestamp
    /// fell in the closing epoch.
    pub fn run_epoch(&mut self, candidates: &[LowHash]) -> Result<Option<ReorgOutcome>, ConsensusError> {
        self.orphans.expire(Instant::now(), self.cfg.orphan_expiry);

        let infos: Vec<BlockInfo> = candidates
            .iter()
            .filter_map(|hash| self.store.get_info(hash))
            .collect();
        let Some(pretop) = fork_choice::select_pretop(&infos) else {
            return Ok(None);
        };

        let meta = self
            .store
            .meta()
            .ok_or(ConsensusError::ReorgFailure("store has no meta record"))?;
        let tip_cumulative = self
            .store
            .get_info(&meta.tip_low_hash)
            .map(|info| info.difficulty)
            .unwrap_or_else(U256::zero);

        if !fork_choice::should_adopt(pretop.difficulty, tip_cumulative) {
            return Ok(None);
        }

        let plan = fork_choice::plan_reorg(&self.store, pretop, meta.tip_height)?;
        self.apply_plan(&plan, meta)
    }

    fn apply_plan(
        &mut self,
        plan: &ReorgPlan,
        mut meta: StoreMeta,
    ) -> Result<Option<ReorgOutcome>, ConsensusError> {
        for low_hash in &plan.revert {
            let block = self
                .store
                .get_block(low_hash)
                .ok_or(ConsensusError::ReorgFailure("revert target missing block body"))?;
            let mut info = self
                .store
                .get_info(low_hash)
                .ok_or(ConsensusError::ReorgFailure("revert target missing info"))?;
            let old_height = info.height;
            let reward = coinbase_reward(old_height, &self.cfg);
            info.amount = info.amount.checked_sub(reward).unwrap_or(XAmount::ZERO);
            info.flags.remove(BlockFlags::MAIN | BlockFlags::MAIN_CHAIN | BlockFlags::PRETOP);
            info.flags.insert(BlockFlags::UNWIND);
            info.height = 0;
            self.store.put(&block, &info)?;
            self.store.set_height_index(old_height, None)?;
        }

        let mut height = plan.fork_height;
        for low_hash in &plan.apply {
            height += 1;
            let block = self
                .store
                .get_block(low_hash)
                .ok_or(ConsensusError::ReorgFailure("apply target missing block body"))?;
            let mut info = self
                .store
                .get_info(low_hash)
                .ok_or(ConsensusError::ReorgFailure("apply target missing info"))?;
            let reward = coinbase_reward(height, &self.cfg);
            info.height = height;
            info.amount = info.amount.saturating_add(reward);
            info.flags
                .insert(BlockFlags::MAIN | BlockFlags::MAIN_CHAIN | BlockFlags::APPLIED);
            info.flags.remove(BlockFlags::UNWIND);
            self.store.put(&block, &info)?;
            self.store.set_height_index(height, Some(*low_hash))?;
        }

        let new_tip = *plan
            .apply
            .last()
            .ok_or(ConsensusError::ReorgFailure("reorg plan has no apply segment"))?;
        meta.tip_low_hash = new_tip;
        meta.tip_height = height;
        self.store.set_meta(meta)?;

        Ok(Some(ReorgOutcome {
            fork_height: plan.fork_height,
            reverted: plan.revert.clone(),
            applied: plan.apply.clone(),
            new_tip,
            new_tip_height: height,
        }))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBlockStore;
    use crate::types::{BlockBuilder, HASH_LEN};

    fn low(byte: u8) -> LowHash {
        LowHash([byte; HASH_LEN])
    }

    fn engine_with_genesis() -> (DagEngine<InMemoryBlockStore>, LowHash) {
        let store = InMemoryBlockStore::new();
        let genesis_block = BlockBuilder::new(0).build();
        let hash = block_codec::hash_block(&genesis_block);
        let genesis = hash.low_hash();
        let info = BlockInfo {
            height: 0,
            difficulty: U256::one(),
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
        store.put(&genesis_block, &info).unwrap();
        store.set_height_index(0, Some(genesis)).unwrap();
        store
            .set_meta(StoreMeta {
                schema_version: StoreMeta::SCHEMA_VERSION,
                network_id: 1,
                genesis_low_hash: genesis,
                tip_low_hash: genesis,
                tip_height: 0,
            })
            .unwrap();
        (DagEngine::new(store, ConsensusConfig::default()), genesis)
    }

    #[test]
    fn a_block_with_no_links_is_applied_immediately() {
        let (mut engine, _genesis) = engine_with_genesis();
        let block = BlockBuilder::new(1).build();
        let outcome = engine.submit_block(block).unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Applied { .. }));
    }

    #[test]
    fn a_block_with_an_unknown_link_is_parked() {
        let (mut engine, _genesis) = engine_with_genesis();
        let dangling = low(42);
        let block = BlockBuilder::new(1)
            .input_link(Link::new(XAmount(1), dangling))
            .build();

        let outcome = engine.submit_block(block).unwrap();
        match outcome {
            AdmissionOutcome::Parked { missing } => assert_eq!(missing, vec![dangling]),
            other => panic!("expected Parked, got {other:?}"),
        }
        assert_eq!(engine.orphan_count(), 1);
    }

    #[test]
    fn an_orphan_is_applied_once_its_dependency_arrives() {
        let (mut engine, _genesis) = engine_with_genesis();

        let dependency = BlockBuilder::new(1).remark([7u8; 32]).build();
        let dependency_hash = block_codec::hash_block(&dependency).low_hash();

        let spend = BlockBuilder::new(2)
            .output_link(Link::new(XAmount(0), dependency_hash))
            .build();
        let spend_hash = block_codec::hash_block(&spend).low_hash();
        let parked = engine.submit_block(spend).unwrap();
        assert!(matches!(parked, AdmissionOutcome::Parked { .. }));
        assert_eq!(engine.orphan_count(), 1);

        let resolved = engine.submit_block(dependency).unwrap();
        match resolved {
            AdmissionOutcome::Applied { unblocked, .. } => {
                assert_eq!(unblocked, vec![spend_hash]);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        assert_eq!(engine.orphan_count(), 0);
    }

    #[test]
    fn double_spend_is_rejected_on_the_second_spender() {
        use crate::crypto::{public_key_from_secret, sign_recoverable};

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
                    difficulty: U256::one(),
                    reference: None,
                    max_diff_link: None,
                    fee: XAmount::ZERO,
                    hash: owner_hash,
                    hashlow: owner_hash,
                    amount: XAmount(100),
                    timestamp: 0,
                    flags: BlockFlags::APPLIED,
                    remark: None,
                    snapshot_info: None,
                },
            )
            .unwrap();

        let link = Link::new(XAmount(100), owner_hash);

        let placeholder = BlockBuilder::new(2)
            .input_link(link)
            .in_signature([0u8; 64])
            .build();
        let sig = sign_recoverable(&owner_sk, &placeholder.bytes_excluding_signatures()).unwrap();
        let mut sig64 = [0u8; 64];
        sig64.copy_from_slice(&sig.as_bytes()[..64]);
        let first_spend = BlockBuilder::new(2)
            .input_link(link)
            .in_signature(sig64)
            .build();
        assert!(matches!(
            engine.submit_block(first_spend).unwrap(),
            AdmissionOutcome::Applied { .. }
        ));

        let placeholder = BlockBuilder::new(3)
            .input_link(link)
            .in_signature([0u8; 64])
            .build();
        let sig = sign_recoverable(&owner_sk, &placeholder.bytes_excluding_signatures()).unwrap();
        let mut sig64 = [0u8; 64];
        sig64.copy_from_slice(&sig.as_bytes()[..64]);
        let second_spend = BlockBuilder::new(3)
            .input_link(link)
            .in_signature(sig64)
            .build();
        let err = engine.submit_block(second_spend).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Invalid(ValidationError::DoubleSpend(_))
        ));
    }
}
