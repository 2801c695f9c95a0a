//! Consensus-tuning parameters.

use std::time::Duration;

/// Tunable parameters for the DAG engine.
///
/// Everything here is a protocol or implementation knob that the
/// reference node also treats as configurable; nothing here changes
/// consensus *semantics* across nodes that agree on these values.
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Length of a main-chain election epoch (spec.md §4.4): one second
    /// in the reference node.
    pub epoch_length: Duration,
    /// How far into the future (relative to local clock) a block's
    /// timestamp may be before it is rejected as a syntactic error.
    pub max_future_drift: Duration,
    /// Fixed coinbase reward for the first `reward_halving_interval *
    /// N` main blocks, in whole-XDAG units before the `2^32` scaling.
    pub initial_reward_xdag: u64,
    /// Number of main blocks that earn `initial_reward_xdag` before the
    /// first halving (spec.md §4.4: 1,017,323).
    pub first_era_blocks: u64,
    /// Number of main blocks between halvings after the first era
    /// (spec.md §4.4: 2,097,152).
    pub reward_halving_interval: u64,
    /// How long an orphan pool entry may wait for its missing link
    /// before being dropped (spec.md §7: 10 minutes).
    pub orphan_expiry: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            epoch_length: Duration::from_secs(1),
            max_future_drift: Duration::from_secs(2),
            initial_reward_xdag: 1024,
            first_era_blocks: 1_017_323,
            reward_halving_interval: 2_097_152,
            orphan_expiry: Duration::from_secs(600),
        }
    }
}
