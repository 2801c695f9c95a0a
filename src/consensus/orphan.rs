//! Orphan pool: blocks parked because one or more of their links are
//! not yet resolvable (spec.md §4.3 step 2, §9).
//!
//! Ownership follows the design note in spec.md §9: the pool holds
//! owning copies of parked blocks until every dependency resolves, at
//! which point the engine re-enters the admission pipeline for them and
//! (on success) the store takes ownership instead. This data structure
//! is purely in-memory and owned exclusively by the consensus thread —
//! no locking, no blocking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::{Block, LowHash};

struct OrphanEntry {
    block: Block,
    received_at: Instant,
}

/// Blocks a received block parked because a dependency is missing.
#[derive(Default)]
pub struct OrphanPool {
    /// missing low-hash -> orphan low-hashes blocked on it.
    blocked_by: HashMap<LowHash, Vec<LowHash>>,
    /// orphan low-hash -> its parked entry.
    entries: HashMap<LowHash, OrphanEntry>,
}

impl OrphanPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parks `block` (identified by `low_hash`) until every low-hash in
    /// `missing` has been resolved.
    pub fn park(&mut self, low_hash: LowHash, block: Block, missing: &[LowHash], now: Instant) {
        self.entries.insert(
            low_hash,
            OrphanEntry {
                block,
                received_at: now,
            },
        );
        for dep in missing {
            self.blocked_by.entry(*dep).or_default().push(low_hash);
        }
    }

    /// Called when `available` becomes resolvable in the store. Returns
    /// every orphan that was waiting on it, removed from the pool.
    ///
    /// A returned block may still depend on other, still-missing links;
    /// the caller is expected to re-run full link resolution and
    /// `park` it again if so.
    pub fn pop_waiting_on(&mut self, available: LowHash) -> Vec<Block> {
        let waiters = self.blocked_by.remove(&available).unwrap_or_default();
        waiters
            .into_iter()
            .filter_map(|low_hash| self.entries.remove(&low_hash).map(|entry| entry.block))
            .collect()
    }

    /// Drops every orphan older than `expiry` as of `now`, bounding
    /// memory per spec.md §7.
    pub fn expire(&mut self, now: Instant, expiry: Duration) {
        self.entries
            .retain(|_, entry| now.duration_since(entry.received_at) < expiry);
        self.blocked_by
            .retain(|_, waiters| {
                waiters.retain(|h| self.entries.contains_key(h));
                !waiters.is_empty()
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockBuilder, HASH_LEN};

    fn low(byte: u8) -> LowHash {
        LowHash([byte; HASH_LEN])
    }

    #[test]
    fn park_and_resolve_single_dependency() {
        let mut pool = OrphanPool::new();
        let block = BlockBuilder::new(1).build();
        let orphan_hash = low(1);
        let missing = low(2);

        pool.park(orphan_hash, block.clone(), &[missing], Instant::now());
        assert_eq!(pool.len(), 1);

        let ready = pool.pop_waiting_on(missing);
        assert_eq!(ready, vec![block]);
        assert!(pool.is_empty());
    }

    #[test]
    fn resolving_unrelated_hash_does_not_release_orphan() {
        let mut pool = OrphanPool::new();
        let block = BlockBuilder::new(1).build();
        pool.park(low(1), block, &[low(2)], Instant::now());

        let ready = pool.pop_waiting_on(low(99));
        assert!(ready.is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn expiry_drops_stale_entries() {
        let mut pool = OrphanPool::new();
        let block = BlockBuilder::new(1).build();
        let old_time = Instant::now() - Duration::from_secs(3600);
        pool.park(low(1), block, &[low(2)], old_time);

        pool.expire(Instant::now(), Duration::from_secs(600));
        assert!(pool.is_empty());
        assert!(pool.pop_waiting_on(low(2)).is_empty());
    }

    #[test]
    fn multiple_orphans_can_wait_on_the_same_dependency() {
        let mut pool = OrphanPool::new();
        let a = BlockBuilder::new(1).build();
        let b = BlockBuilder::new(2).build();
        let dep = low(9);

        pool.park(low(1), a.clone(), &[dep], Instant::now());
        pool.park(low(2), b.clone(), &[dep], Instant::now());

        let mut ready = pool.pop_waiting_on(dep);
        ready.sort_by_key(|blk| blk.timestamp_ms());
        assert_eq!(ready, vec![a, b]);
    }
}
