//! Coinbase reward schedule (spec.md §4.4).
//!
//! Fixed 1024 XDAG for the first 1,017,323 main blocks, halving every
//! 2,097,152 main blocks thereafter, rounded down in fixed-point. This
//! is a pure function of `height` and [`ConsensusConfig`]; settlement
//! (crediting the coinbase account on election, debiting it on revert)
//! lives in [`super::engine`].

use crate::types::XAmount;

use super::config::ConsensusConfig;

/// Computes the coinbase reward for the main block at `height`
/// (1-indexed: genesis, at height 0, mints nothing via this schedule).
pub fn coinbase_reward(height: u64, cfg: &ConsensusConfig) -> XAmount {
    if height == 0 {
        return XAmount::ZERO;
    }

    let base = XAmount::from_xdag(cfg.initial_reward_xdag);
    if height <= cfg.first_era_blocks {
        return base;
    }

    let blocks_after_first_era = height - cfg.first_era_blocks;
    let halvings = (blocks_after_first_era - 1) / cfg.reward_halving_interval + 1;
    // A shift of 64 or more would already be zero; clamp to keep the
    // shift amount in range for `u64`.
    let shift = halvings.min(63) as u32;
    XAmount(base.0 >> shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ConsensusConfig {
        ConsensusConfig::default()
    }

    #[test]
    fn reward_is_flat_within_first_era() {
        let cfg = cfg();
        assert_eq!(coinbase_reward(1, &cfg), XAmount::from_xdag(1024));
        assert_eq!(
            coinbase_reward(cfg.first_era_blocks, &cfg),
            XAmount::from_xdag(1024)
        );
    }

    #[test]
    fn reward_halves_at_first_interval_boundary() {
        let cfg = cfg();
        let first_halved_height = cfg.first_era_blocks + cfg.reward_halving_interval;
        assert_eq!(
            coinbase_reward(first_halved_height, &cfg),
            XAmount::from_xdag(512)
        );
    }

    #[test]
    fn reward_halves_again_at_second_interval_boundary() {
        let cfg = cfg();
        let second_halved_height = cfg.first_era_blocks + 2 * cfg.reward_halving_interval;
        assert_eq!(
            coinbase_reward(second_halved_height, &cfg),
            XAmount::from_xdag(256)
        );
    }

    #[test]
    fn reward_eventually_reaches_zero_without_panicking() {
        let cfg = cfg();
        let far_future = cfg.first_era_blocks + cfg.reward_halving_interval * 100;
        assert_eq!(coinbase_reward(far_future, &cfg), XAmount::ZERO);
    }

    #[test]
    fn genesis_mints_nothing() {
        assert_eq!(coinbase_reward(0, &cfg()), XAmount::ZERO);
    }
}
