//! Sync controller: gap detection, request pipelining, and per-request
//! timeout/re-issue bookkeeping (spec.md §4.6).
//!
//! This module is deliberately peer-agnostic: it tracks *which heights
//! are outstanding, to which peer, since when*, and leaves issuing the
//! actual `GET_MAIN_BLOCK_HEADER`/`GET_MAIN_BLOCK` frames and admitting
//! the resulting blocks (via [`crate::consensus::validator`]) to the
//! caller. `P` is whatever peer identifier the caller's session registry
//! uses (a socket address, a node id, ...).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::LowHash;

/// `{Idle -> Syncing -> Synced}`. A controller starts `Idle` until the
/// first `GET_STATS` exchange classifies the gap to the remote tip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced,
}

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Sliding window size: how many heights ahead of the local tip may
    /// be outstanding at once, and the gap threshold past which a stats
    /// exchange classifies the peer as ahead (spec.md §4.6).
    pub window: u64,
    /// How long an outstanding request may go unanswered before it is
    /// re-issued to a different peer (spec.md §4.6, §5: 5 s).
    pub request_timeout: Duration,
    /// Re-issues allowed before giving up and disconnecting the peer.
    pub max_reissues: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            window: 128,
            request_timeout: Duration::from_secs(5),
            max_reissues: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RequestKind {
    Header,
    Block(LowHash),
}

struct PendingRequest<P> {
    kind: RequestKind,
    peer: P,
    requested_at: Instant,
    reissues: u32,
}

/// An action the caller must take after [`SyncController::check_timeouts`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TimeoutAction<P> {
    /// Re-issue the request for `height` to `retry_peer` instead.
    ReissueHeader { height: u64, retry_peer: P },
    ReissueBlock {
        height: u64,
        low_hash: LowHash,
        retry_peer: P,
    },
    /// `peer` failed to answer after the configured number of re-issues;
    /// the caller should disconnect it with `TIMEOUT`.
    Disconnect { height: u64, peer: P },
}

/// Per-peer-class sync state: a sliding window of requested heights plus
/// the bookkeeping needed to detect and react to stalled requests.
pub struct SyncController<P: Clone + Eq> {
    cfg: SyncConfig,
    state: SyncState,
    remote_tip_height: u64,
    next_height_to_request: u64,
    pending: HashMap<u64, PendingRequest<P>>,
}

impl<P: Clone + Eq> SyncController<P> {
    pub fn new(cfg: SyncConfig) -> Self {
        SyncController {
            cfg,
            state: SyncState::Idle,
            remote_tip_height: 0,
            next_height_to_request: 1,
            pending: HashMap::new(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Classifies the gap found by a `GET_STATS` exchange, per spec.md
    /// §4.6: `remote.totalnmain > local.nmain + window` enters
    /// `SYNCING`, otherwise the controller is already caught up.
    pub fn on_stats(&mut self, local_nmain: u64, remote_totalnmain: u64) -> SyncState {
        self.remote_tip_height = remote_totalnmain;
        self.next_height_to_request = local_nmain + 1;
        self.state = if remote_totalnmain > local_nmain + self.cfg.window {
            SyncState::Syncing
        } else {
            SyncState::Synced
        };
        self.state
    }

    /// Returns the next batch of heights to request `GET_MAIN_BLOCK_HEADER`
    /// for, filling the sliding window up to `local.nmain + window` and
    /// marking each as pending against `peer`. Empty once the window is
    /// already full or the controller isn't `Syncing`.
    pub fn next_header_requests(&mut self, peer: P, now: Instant) -> Vec<u64> {
        if self.state != SyncState::Syncing {
            return Vec::new();
        }
        let window_end = self.next_height_to_request + self.cfg.window - 1;
        let mut heights = Vec::new();
        let mut h = self.next_height_to_request;
        while h <= window_end.min(self.remote_tip_height) {
            if !self.pending.contains_key(&h) {
                self.pending.insert(
                    h,
                    PendingRequest {
                        kind: RequestKind::Header,
                        peer: peer.clone(),
                        requested_at: now,
                        reissues: 0,
                    },
                );
                heights.push(h);
            }
            h += 1;
        }
        heights
    }

    /// Clears the pending header request for `height`. Returns `true` if
    /// one was outstanding. The caller is responsible for following up
    /// with [`SyncController::request_block`] when the header names a
    /// low-hash not already in the store.
    pub fn header_received(&mut self, height: u64) -> bool {
        matches!(
            self.pending.get(&height),
            Some(PendingRequest {
                kind: RequestKind::Header,
                ..
            })
        ) && self.pending.remove(&height).is_some()
    }

    /// Marks `height` as awaiting a full `GET_MAIN_BLOCK` fetch for
    /// `low_hash`, issued to `peer`.
    pub fn request_block(&mut self, peer: P, height: u64, low_hash: LowHash, now: Instant) {
        self.pending.insert(
            height,
            PendingRequest {
                kind: RequestKind::Block(low_hash),
                peer,
                requested_at: now,
                reissues: 0,
            },
        );
    }

    /// Records that the block at `height` was admitted (whether fetched
    /// by sync or received as `NEW_BLOCK`), advances the window, and
    /// transitions to `Synced` once the remote tip is reached with
    /// nothing outstanding.
    pub fn block_admitted(&mut self, height: u64) {
        self.pending.remove(&height);
        if height >= self.next_height_to_request {
            self.next_height_to_request = height + 1;
        }
        if self.next_height_to_request > self.remote_tip_height && self.pending.is_empty() {
            self.state = SyncState::Synced;
        }
    }

    /// Scans outstanding requests for ones older than the configured
    /// timeout, returning the re-issue or disconnect action for each.
    /// Re-issued requests get a fresh `requested_at` and an incremented
    /// reissue count; requests that have exhausted `max_reissues`
    /// instead surface a `Disconnect` and are dropped from tracking.
    pub fn check_timeouts(&mut self, now: Instant, retry_peer: P) -> Vec<TimeoutAction<P>> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, req)| now.duration_since(req.requested_at) >= self.cfg.request_timeout)
            .map(|(height, _)| *height)
            .collect();

        let mut actions = Vec::new();
        for height in expired {
            let req = self.pending.get_mut(&height).expect("just filtered");
            if req.reissues >= self.cfg.max_reissues {
                let peer = req.peer.clone();
                self.pending.remove(&height);
                actions.push(TimeoutAction::Disconnect { height, peer });
                continue;
            }
            req.reissues += 1;
            req.requested_at = now;
            req.peer = retry_peer.clone();
            match req.kind {
                RequestKind::Header => actions.push(TimeoutAction::ReissueHeader {
                    height,
                    retry_peer: retry_peer.clone(),
                }),
                RequestKind::Block(low_hash) => actions.push(TimeoutAction::ReissueBlock {
                    height,
                    low_hash,
                    retry_peer: retry_peer.clone(),
                }),
            }
        }
        actions
    }

    pub fn outstanding_count(&self) -> usize {
        self.pending.len()
    }
}
