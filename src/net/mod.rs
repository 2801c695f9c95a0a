//! Peer session glue: handshake state machine and ping/pong liveness
//! (spec.md §4.7).
//!
//! A [`PeerSession`] owns one peer's outbound [`MessageQueue`] and
//! tracks the handshake/liveness state machine layered on top of it.
//! Duplicate-peer-id detection needs a view across all sessions, so it
//! stays external: callers pass the result of their own registry
//! lookup into [`PeerSession::receive_handshake`], backed by
//! [`PeerRegistry`].

use dashmap::DashSet;

use crate::codec::{DisconnectReason, HandshakeBody, Message};
use crate::queue::{MessageQueue, MessageQueueConfig, Transport};

/// Node ids of every peer currently past handshake, shared across every
/// connection-handling thread so a second session for the same node id
/// can be rejected with `DUPLICATED_PEER_ID` (spec.md §4.7).
///
/// A `DashSet` rather than a `Mutex<HashSet<_>>` since registrations and
/// removals race freely across per-peer threads with no need for a
/// wider critical section.
#[derive(Default)]
pub struct PeerRegistry {
    node_ids: DashSet<[u8; 20]>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        PeerRegistry {
            node_ids: DashSet::new(),
        }
    }

    /// Registers `node_id` if it isn't already present. Returns `true`
    /// if this call performed the registration, `false` if another
    /// session already holds it (the caller should treat that as a
    /// duplicate and close with [`DisconnectReason::DuplicatedPeerId`]).
    pub fn try_register(&self, node_id: [u8; 20]) -> bool {
        self.node_ids.insert(node_id)
    }

    /// Releases `node_id`, e.g. once its session closes.
    pub fn remove(&self, node_id: &[u8; 20]) {
        self.node_ids.remove(node_id);
    }
}

/// `{AwaitingHandshake -> Active -> Closed}` (spec.md §4.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    AwaitingHandshake,
    Active,
    Closed(DisconnectReason),
}

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub network_id: u32,
    pub protocol_version: u16,
    /// Missed pongs before a liveness timeout (spec.md §4.7: 2).
    pub max_missed_pongs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            network_id: 1,
            protocol_version: 1,
            max_missed_pongs: 2,
        }
    }
}

/// One peer connection's handshake and liveness state, layered over a
/// [`MessageQueue`].
pub struct PeerSession<T: Transport> {
    queue: MessageQueue<T>,
    cfg: SessionConfig,
    local_handshake: HandshakeBody,
    remote_handshake: Option<HandshakeBody>,
    state: SessionState,
    outstanding_ping: Option<u64>,
    missed_pongs: u32,
}

impl<T: Transport> PeerSession<T> {
    pub fn new(transport: T, cfg: SessionConfig, local_handshake: HandshakeBody) -> Self {
        PeerSession {
            queue: MessageQueue::new(transport, MessageQueueConfig::default()),
            cfg,
            local_handshake,
            remote_handshake: None,
            state: SessionState::AwaitingHandshake,
            outstanding_ping: None,
            missed_pongs: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peer's node id once its HELLO/WORLD has been accepted.
    pub fn remote_node_id(&self) -> Option<[u8; 20]> {
        self.remote_handshake.map(|h| h.node_id)
    }

    pub fn queue(&mut self) -> &mut MessageQueue<T> {
        &mut self.queue
    }

    /// Activates the underlying queue and sends our HELLO.
    pub fn begin_handshake(&mut self) {
        self.queue.activate();
        self.queue
            .send(Message::Handshake(self.local_handshake));
    }

    /// Processes an incoming HELLO/WORLD. `peer_already_connected` is
    /// the caller's answer to "is this node id already on another
    /// session", since that requires a view this session doesn't have.
    pub fn receive_handshake(
        &mut self,
        remote: HandshakeBody,
        peer_already_connected: bool,
    ) -> SessionState {
        if self.state != SessionState::AwaitingHandshake {
            self.close(DisconnectReason::UnexpectedMessage);
            return self.state;
        }
        if remote.network_id != self.cfg.network_id {
            self.close(DisconnectReason::BadNetwork);
        } else if remote.protocol_version != self.cfg.protocol_version {
            self.close(DisconnectReason::BadProtocol);
        } else if peer_already_connected {
            self.close(DisconnectReason::DuplicatedPeerId);
        } else {
            self.remote_handshake = Some(remote);
            self.state = SessionState::Active;
        }
        self.state
    }

    /// Sends a fresh PING and marks it outstanding. Called by the
    /// shared scheduler every 15 s (spec.md §4.7); a still-outstanding
    /// previous ping counts as a missed pong before this one goes out.
    pub fn send_ping(&mut self, nonce: u64) -> SessionState {
        if self.state != SessionState::Active {
            return self.state;
        }
        if self.outstanding_ping.is_some() {
            self.missed_pongs += 1;
            if self.missed_pongs >= self.cfg.max_missed_pongs {
                self.close(DisconnectReason::Timeout);
                return self.state;
            }
        }
        self.outstanding_ping = Some(nonce);
        self.queue.send(Message::PingPong { nonce });
        self.state
    }

    /// Replies to an incoming PING with the same nonce.
    pub fn receive_ping(&mut self, nonce: u64) {
        if self.state == SessionState::Active {
            self.queue.send(Message::PingPong { nonce });
        }
    }

    /// Clears liveness tracking on a matching PONG. A PONG for a stale
    /// nonce (an earlier, already-missed ping) is ignored.
    pub fn receive_pong(&mut self, nonce: u64) {
        if self.outstanding_ping == Some(nonce) {
            self.outstanding_ping = None;
            self.missed_pongs = 0;
        }
    }

    /// Whether `nonce` matches our currently outstanding PING.
    ///
    /// PING and PONG share opcode `0x02` (spec.md §6); which one an
    /// incoming frame *is* depends on whether its nonce is the one we
    /// sent out, not on the frame itself. Callers must branch on this
    /// before deciding whether to echo ([`Self::receive_ping`]) or clear
    /// ([`Self::receive_pong`]) — calling both unconditionally echoes a
    /// genuine PONG right back at the sender and the two peers ping
    /// each other forever.
    pub fn is_pending_pong(&self, nonce: u64) -> bool {
        self.outstanding_ping == Some(nonce)
    }

    pub fn close(&mut self, reason: DisconnectReason) {
        if !matches!(self.state, SessionState::Closed(_)) {
            self.queue.close(reason);
            self.state = SessionState::Closed(reason);
        }
    }
}
