//! Per-peer outbound message queue: bounded, priority-aware,
//! cooperative-flush (spec.md §4.5).
//!
//! Ownership mirrors spec.md §5: I/O threads own the [`Transport`], a
//! shared scheduler drives [`MessageQueue::tick`] every 10 ms, and
//! `close` is the only cancellation primitive for per-peer work.

use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use crate::codec::{DisconnectReason, Frame, Message, Opcode};

/// Sink a [`MessageQueue`] writes framed bytes to. Implemented by the
/// real per-peer socket in [`crate::net`]; tests use an in-memory
/// stand-in so queue behaviour can be asserted without a live socket.
pub trait Transport: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn flush(&mut self) -> Result<(), TransportError>;
    fn shutdown(&mut self);
}

#[derive(Debug, Error, Eq, PartialEq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// `{Idle -> Active -> Closed}` (spec.md §4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueState {
    Idle,
    Active,
    Closed,
}

#[derive(Clone, Debug)]
pub struct MessageQueueConfig {
    /// Total queued-bytes ceiling across both sub-queues. Exceeding it
    /// on `send` triggers `DISCONNECT(MESSAGE_QUEUE_FULL)`.
    pub max_queue_bytes: usize,
    /// Opcodes that go to the priority sub-queue instead of normal.
    pub priority_opcodes: HashSet<Opcode>,
    /// Messages drained per `tick` (spec.md §4.5: 5).
    pub max_messages_per_tick: usize,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        let mut priority_opcodes = HashSet::new();
        priority_opcodes.insert(Opcode::Disconnect);
        priority_opcodes.insert(Opcode::PingPong);
        priority_opcodes.insert(Opcode::HandshakeHelloWorld);
        MessageQueueConfig {
            max_queue_bytes: 8 * 1024 * 1024,
            priority_opcodes,
            max_messages_per_tick: 5,
        }
    }
}

/// A single peer's bounded, priority-aware outbound queue.
pub struct MessageQueue<T: Transport> {
    transport: T,
    cfg: MessageQueueConfig,
    state: QueueState,
    priority: VecDeque<Message>,
    normal: VecDeque<Message>,
    queued_bytes: usize,
}

impl<T: Transport> MessageQueue<T> {
    pub fn new(transport: T, cfg: MessageQueueConfig) -> Self {
        MessageQueue {
            transport,
            cfg,
            state: QueueState::Idle,
            priority: VecDeque::new(),
            normal: VecDeque::new(),
            queued_bytes: 0,
        }
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Transitions `Idle -> Active`; a no-op once already `Active` or
    /// `Closed`.
    pub fn activate(&mut self) {
        if self.state == QueueState::Idle {
            self.state = QueueState::Active;
        }
    }

    /// Enqueues `msg`, or closes the queue with `MESSAGE_QUEUE_FULL` if
    /// it would push total queued bytes past the configured maximum.
    ///
    /// Only `Active` accepts sends; `Idle` and `Closed` both reject.
    pub fn send(&mut self, msg: Message) -> bool {
        if self.state != QueueState::Active {
            return false;
        }

        let framed_len = Frame::encode(&msg).len();
        if self.queued_bytes + framed_len > self.cfg.max_queue_bytes {
            self.close(DisconnectReason::MessageQueueFull);
            return false;
        }

        if self.cfg.priority_opcodes.contains(&msg.opcode()) {
            self.priority.push_back(msg);
        } else {
            self.normal.push_back(msg);
        }
        self.queued_bytes += framed_len;
        true
    }

    /// Drains up to `max_messages_per_tick` messages, priority
    /// sub-queue first, writing each to the transport and issuing a
    /// single flush afterward. A transport write error closes the
    /// queue without a `DISCONNECT` frame (the transport itself is
    /// already broken).
    pub fn tick(&mut self) -> Result<(), TransportError> {
        if self.state != QueueState::Active {
            return Ok(());
        }

        let mut wrote_any = false;
        for _ in 0..self.cfg.max_messages_per_tick {
            let Some(msg) = self.priority.pop_front().or_else(|| self.normal.pop_front()) else {
                break;
            };
            let bytes = Frame::encode(&msg);
            self.queued_bytes = self.queued_bytes.saturating_sub(bytes.len());
            if let Err(e) = self.transport.write(&bytes) {
                self.state = QueueState::Closed;
                return Err(e);
            }
            wrote_any = true;
        }

        if wrote_any {
            self.transport.flush()?;
        }
        Ok(())
    }

    /// Idempotent: the first call enqueues and flushes a `DISCONNECT`
    /// frame and shuts the transport down; later calls do nothing.
    pub fn close(&mut self, reason: DisconnectReason) {
        if self.state == QueueState::Closed {
            return;
        }
        let frame = Frame::encode(&Message::Disconnect { reason });
        let _ = self.transport.write(&frame);
        let _ = self.transport.flush();
        self.transport.shutdown();
        self.state = QueueState::Closed;
        self.priority.clear();
        self.normal.clear();
        self.queued_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
