//! Main-chain election and reorg planning (spec.md §4.4).
//!
//! This module decides *what* should change; applying the plan (the
//! atomic revert-then-apply store batch, reward settlement) is
//! [`super::engine`]'s job. Keeping the two separate means the election
//! rule can be unit-tested against a plain [`BlockStore`] fixture
//! without any reward or balance bookkeeping in the way.

use primitive_types::U256;

use crate::store::BlockStore;
use crate::types::{BlockInfo, LowHash};

use super::error::ConsensusError;

/// Chooses the epoch's pretop candidate: among `candidates`, the one
/// with the highest cumulative difficulty, ties broken by
/// lexicographically smaller low-hash.
pub fn select_pretop(candidates: &[BlockInfo]) -> Option<&BlockInfo> {
    candidates.iter().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current_best) => {
            if is_better_candidate(candidate, current_best) {
                Some(candidate)
            } else {
                Some(current_best)
            }
        }
    })
}

fn is_better_candidate(candidate: &BlockInfo, incumbent: &BlockInfo) -> bool {
    match candidate.difficulty.cmp(&incumbent.difficulty) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.hashlow < incumbent.hashlow,
    }
}

/// Whether `candidate_cumulative` should displace `tip_cumulative` as
/// the main-chain tip.
pub fn should_adopt(candidate_cumulative: U256, tip_cumulative: U256) -> bool {
    candidate_cumulative > tip_cumulative
}

/// A planned main-chain reorganisation: which currently-main blocks to
/// revert and which blocks to adopt in their place.
#[derive(Debug, Eq, PartialEq)]
pub struct ReorgPlan {
    /// Height of the block both chains agree on; unchanged by the reorg.
    pub fork_height: u64,
    /// Old main-chain blocks to revert, from the old tip down to
    /// `fork_height + 1` (descending height — most recent first).
    pub revert: Vec<LowHash>,
    /// New main-chain blocks to adopt, from `fork_height + 1` up to and
    /// including `candidate` (ascending height — fork's child first).
    pub apply: Vec<LowHash>,
}

/// Walks `candidate`'s `maxDiffLink` chain back to the point it
/// intersects the current main chain, then lays out the full
/// revert/apply plan against `current_tip_height`.
///
/// Errors with [`ConsensusError::ReorgFailure`] if the `maxDiffLink`
/// chain runs out before intersecting the main chain, or if a link
/// points to a low-hash absent from the store — both are invariant
/// violations, since every `maxDiffLink` is set during admission from
/// blocks already present in the store.
pub fn plan_reorg<S: BlockStore + ?Sized>(
    store: &S,
    candidate: &BlockInfo,
    current_tip_height: u64,
) -> Result<ReorgPlan, ConsensusError> {
    let mut apply = vec![candidate.hashlow];
    let mut cursor = candidate.max_diff_link;

    let fork = loop {
        let link = cursor.ok_or(ConsensusError::ReorgFailure(
            "max-diff chain exhausted without intersecting the main chain",
        ))?;
        let link_info = store
            .get_info(&link)
            .ok_or(ConsensusError::ReorgFailure(
                "max-diff link points to a block absent from the store",
            ))?;
        if link_info.is_main() && store.main_at_height(link_info.height) == Some(link) {
            break link_info;
        }
        apply.push(link);
        cursor = link_info.max_diff_link;
    };
    apply.reverse();

    let revert = ((fork.height + 1)..=current_tip_height)
        .rev()
        .filter_map(|height| store.main_at_height(height))
        .collect();

    Ok(ReorgPlan {
        fork_height: fork.height,
        revert,
        apply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBlockStore;
    use crate::types::{BlockBuilder, BlockFlags, HASH_LEN, XAmount};

    fn low(byte: u8) -> LowHash {
        LowHash([byte; HASH_LEN])
    }

    fn main_info(hash: LowHash, height: u64, difficulty: u64, max_diff_link: Option<LowHash>) -> BlockInfo {
        BlockInfo {
            height,
            difficulty: U256::from(difficulty),
            reference: None,
            max_diff_link,
            fee: XAmount::ZERO,
            hash,
            hashlow: hash,
            amount: XAmount::ZERO,
            timestamp: height,
            flags: BlockFlags::MAIN | BlockFlags::MAIN_CHAIN | BlockFlags::APPLIED,
            remark: None,
            snapshot_info: None,
        }
    }

    fn seed_main_chain(store: &InMemoryBlockStore, chain: &[(LowHash, u64)]) {
        let mut prev = None;
        for &(hash, difficulty) in chain {
            let height = store.len() as u64 + 1;
            let info = main_info(hash, height, difficulty, prev);
            store.put(&BlockBuilder::new(height).build(), &info).unwrap();
            store.set_height_index(height, Some(hash)).unwrap();
            prev = Some(hash);
        }
    }

    #[test]
    fn select_pretop_prefers_higher_cumulative_difficulty() {
        let low_diff = BlockInfo {
            difficulty: U256::from(10u64),
            ..main_info(low(1), 1, 10, None)
        };
        let high_diff = BlockInfo {
            difficulty: U256::from(20u64),
            ..main_info(low(2), 1, 20, None)
        };
        let best = select_pretop(&[low_diff.clone(), high_diff.clone()]).unwrap();
        assert_eq!(best.hashlow, high_diff.hashlow);
    }

    #[test]
    fn select_pretop_breaks_ties_by_smaller_low_hash() {
        let a = main_info(low(5), 1, 10, None);
        let b = main_info(low(2), 1, 10, None);
        let best = select_pretop(&[a, b.clone()]).unwrap();
        assert_eq!(best.hashlow, b.hashlow);
    }

    #[test]
    fn should_adopt_requires_strictly_greater_cumulative_difficulty() {
        assert!(should_adopt(U256::from(11u64), U256::from(10u64)));
        assert!(!should_adopt(U256::from(10u64), U256::from(10u64)));
        assert!(!should_adopt(U256::from(9u64), U256::from(10u64)));
    }

    #[test]
    fn plan_reorg_finds_fork_point_and_orders_segments() {
        let store = InMemoryBlockStore::new();
        let a1 = low(1);
        let a2 = low(2);
        seed_main_chain(&store, &[(a1, 10), (a2, 20)]);

        // Candidate chain: b3 -> b2 (forks after a1, i.e. shares height 1).
        let b2 = low(12);
        let b2_info = main_info(b2, 2, 50, Some(a1));
        store.put(&BlockBuilder::new(2).build(), &b2_info).unwrap();

        let candidate = main_info(low(13), 3, 80, Some(b2));
        let plan = plan_reorg(&store, &candidate, 2).unwrap();

        assert_eq!(plan.fork_height, 1);
        assert_eq!(plan.revert, vec![a2]);
        assert_eq!(plan.apply, vec![b2, candidate.hashlow]);
    }

    #[test]
    fn plan_reorg_fails_if_max_diff_chain_never_intersects_main() {
        let store = InMemoryBlockStore::new();
        let dangling = low(9);
        let candidate = main_info(low(1), 1, 10, Some(dangling));
        // `dangling` is not in the store at all.
        let err = plan_reorg(&store, &candidate, 0).unwrap_err();
        assert!(matches!(err, ConsensusError::ReorgFailure(_)));
    }
}
