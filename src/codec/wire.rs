//! Wire protocol: frame length-prefixing, the opcode catalogue, and the
//! tagged [`Message`] union (spec.md §6).
//!
//! A frame on the wire is `[4-byte length BE | 1-byte opcode |
//! opcode-specific body]`, where `length` counts the opcode byte plus
//! the body. [`Frame::encode`]/[`Frame::try_decode`] handle that outer
//! shape; [`Message::encode_body`]/[`Message::decode`] handle the
//! opcode-specific payloads.
//!
//! HELLO/WORLD share opcode `0x01` and PING/PONG share opcode `0x02`:
//! the two directions carry identical bodies, and which one a given
//! frame *means* is a function of the peer session's state rather than
//! the byte on the wire. [`crate::net`] is what resolves that ambiguity.

use thiserror::Error;

use crate::codec::block_codec::{decode_block, encode_block, BlockCodecError};
use crate::types::{Block, LowHash, HASH_LEN};

/// Stable opcode ids, per spec.md §6.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
    Disconnect = 0x00,
    HandshakeHelloWorld = 0x01,
    PingPong = 0x02,
    MainBlock = 0x10,
    GetMainBlock = 0x11,
    MainBlockHeader = 0x12,
    GetMainBlockHeader = 0x13,
    NewBlock = 0x20,
}

impl Opcode {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Opcode> {
        match b {
            0x00 => Some(Opcode::Disconnect),
            0x01 => Some(Opcode::HandshakeHelloWorld),
            0x02 => Some(Opcode::PingPong),
            0x10 => Some(Opcode::MainBlock),
            0x11 => Some(Opcode::GetMainBlock),
            0x12 => Some(Opcode::MainBlockHeader),
            0x13 => Some(Opcode::GetMainBlockHeader),
            0x20 => Some(Opcode::NewBlock),
            _ => None,
        }
    }
}

/// Stable disconnect reason ids, per spec.md §6.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DisconnectReason {
    Timeout = 0,
    BadProtocol = 1,
    BadNetwork = 2,
    DuplicatedPeerId = 3,
    MessageQueueFull = 4,
    AlreadyConnected = 5,
    InvalidHandshake = 6,
    UnexpectedMessage = 7,
}

impl DisconnectReason {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<DisconnectReason> {
        match b {
            0 => Some(DisconnectReason::Timeout),
            1 => Some(DisconnectReason::BadProtocol),
            2 => Some(DisconnectReason::BadNetwork),
            3 => Some(DisconnectReason::DuplicatedPeerId),
            4 => Some(DisconnectReason::MessageQueueFull),
            5 => Some(DisconnectReason::AlreadyConnected),
            6 => Some(DisconnectReason::InvalidHandshake),
            7 => Some(DisconnectReason::UnexpectedMessage),
            _ => None,
        }
    }
}

/// Fields shared by both the HELLO frame and its WORLD reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandshakeBody {
    pub network_id: u32,
    pub protocol_version: u16,
    pub tip_low_hash: LowHash,
    pub listen_port: u16,
    pub node_id: [u8; 20],
}

/// Compact main-chain block header, used by the sync controller to
/// decide whether it already has the full block for a given height.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MainBlockHeaderBody {
    pub height: u64,
    pub low_hash: LowHash,
    pub timestamp_ms: u64,
}

/// A fully decoded wire message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Disconnect { reason: DisconnectReason },
    /// Opcode `0x01`; HELLO if sent before the session is established,
    /// WORLD if sent as its reply.
    Handshake(HandshakeBody),
    /// Opcode `0x02`; PING if unsolicited, PONG if it echoes an
    /// outstanding nonce.
    PingPong { nonce: u64 },
    MainBlock { block: Block },
    GetMainBlock { low_hash: LowHash },
    MainBlockHeader(MainBlockHeaderBody),
    GetMainBlockHeader { height: u64 },
    NewBlock { block: Block },
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum WireError {
    #[error("frame shorter than the 4-byte length prefix")]
    TruncatedLength,
    #[error("frame body truncated: expected {expected} bytes, got {got}")]
    TruncatedBody { expected: usize, got: usize },
    #[error("frame declares empty length (no opcode byte)")]
    EmptyFrame,
    #[error("unknown opcode byte {0:#04x}")]
    UnknownOpcode(u8),
    #[error("unknown disconnect reason byte {0}")]
    UnknownDisconnectReason(u8),
    #[error("malformed body for opcode {0:?}: {1}")]
    MalformedBody(Opcode, &'static str),
    #[error("embedded block is malformed: {0}")]
    Block(#[from] BlockCodecError),
    #[error("frame exceeds the maximum allowed length ({0} bytes)")]
    FrameTooLarge(usize),
}

/// Frames larger than this are rejected outright: the only variable-size
/// body on the wire is a 512-byte block, so anything far past that is
/// either corrupt or hostile.
pub const MAX_FRAME_BODY_LEN: usize = 4096;

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Disconnect { .. } => Opcode::Disconnect,
            Message::Handshake(_) => Opcode::HandshakeHelloWorld,
            Message::PingPong { .. } => Opcode::PingPong,
            Message::MainBlock { .. } => Opcode::MainBlock,
            Message::GetMainBlock { .. } => Opcode::GetMainBlock,
            Message::MainBlockHeader(_) => Opcode::MainBlockHeader,
            Message::GetMainBlockHeader { .. } => Opcode::GetMainBlockHeader,
            Message::NewBlock { .. } => Opcode::NewBlock,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            Message::Disconnect { reason } => vec![reason.to_byte()],
            Message::Handshake(h) => {
                let mut out = Vec::with_capacity(4 + 2 + HASH_LEN + 2 + 20);
                out.extend_from_slice(&h.network_id.to_le_bytes());
                out.extend_from_slice(&h.protocol_version.to_le_bytes());
                out.extend_from_slice(h.tip_low_hash.as_bytes());
                out.extend_from_slice(&h.listen_port.to_le_bytes());
                out.extend_from_slice(&h.node_id);
                out
            }
            Message::PingPong { nonce } => nonce.to_le_bytes().to_vec(),
            Message::MainBlock { block } | Message::NewBlock { block } => {
                encode_block(block).to_vec()
            }
            Message::GetMainBlock { low_hash } => low_hash.as_bytes().to_vec(),
            Message::MainBlockHeader(h) => {
                let mut out = Vec::with_capacity(8 + HASH_LEN + 8);
                out.extend_from_slice(&h.height.to_le_bytes());
                out.extend_from_slice(h.low_hash.as_bytes());
                out.extend_from_slice(&h.timestamp_ms.to_le_bytes());
                out
            }
            Message::GetMainBlockHeader { height } => height.to_le_bytes().to_vec(),
        }
    }

    /// Decodes a message body for the given `opcode`.
    pub fn decode(opcode: Opcode, body: &[u8]) -> Result<Message, WireError> {
        match opcode {
            Opcode::Disconnect => {
                let b = *body
                    .first()
                    .ok_or(WireError::MalformedBody(opcode, "missing reason byte"))?;
                let reason = DisconnectReason::from_byte(b)
                    .ok_or(WireError::UnknownDisconnectReason(b))?;
                Ok(Message::Disconnect { reason })
            }
            Opcode::HandshakeHelloWorld => {
                if body.len() != 4 + 2 + HASH_LEN + 2 + 20 {
                    return Err(WireError::MalformedBody(opcode, "wrong handshake length"));
                }
                let network_id = u32::from_le_bytes(body[0..4].try_into().unwrap());
                let protocol_version = u16::from_le_bytes(body[4..6].try_into().unwrap());
                let mut hash_bytes = [0u8; HASH_LEN];
                hash_bytes.copy_from_slice(&body[6..6 + HASH_LEN]);
                let port_off = 6 + HASH_LEN;
                let listen_port =
                    u16::from_le_bytes(body[port_off..port_off + 2].try_into().unwrap());
                let mut node_id = [0u8; 20];
                node_id.copy_from_slice(&body[port_off + 2..port_off + 22]);
                Ok(Message::Handshake(HandshakeBody {
                    network_id,
                    protocol_version,
                    tip_low_hash: LowHash(hash_bytes),
                    listen_port,
                    node_id,
                }))
            }
            Opcode::PingPong => {
                if body.len() != 8 {
                    return Err(WireError::MalformedBody(opcode, "nonce must be 8 bytes"));
                }
                let nonce = u64::from_le_bytes(body.try_into().unwrap());
                Ok(Message::PingPong { nonce })
            }
            Opcode::MainBlock | Opcode::NewBlock => {
                let block = decode_block(body)?;
                if opcode == Opcode::MainBlock {
                    Ok(Message::MainBlock { block })
                } else {
                    Ok(Message::NewBlock { block })
                }
            }
            Opcode::GetMainBlock => {
                if body.len() != HASH_LEN {
                    return Err(WireError::MalformedBody(opcode, "low-hash must be 32 bytes"));
                }
                let mut bytes = [0u8; HASH_LEN];
                bytes.copy_from_slice(body);
                Ok(Message::GetMainBlock {
                    low_hash: LowHash(bytes),
                })
            }
            Opcode::MainBlockHeader => {
                if body.len() != 8 + HASH_LEN + 8 {
                    return Err(WireError::MalformedBody(opcode, "wrong header length"));
                }
                let height = u64::from_le_bytes(body[0..8].try_into().unwrap());
                let mut hash_bytes = [0u8; HASH_LEN];
                hash_bytes.copy_from_slice(&body[8..8 + HASH_LEN]);
                let ts_off = 8 + HASH_LEN;
                let timestamp_ms =
                    u64::from_le_bytes(body[ts_off..ts_off + 8].try_into().unwrap());
                Ok(Message::MainBlockHeader(MainBlockHeaderBody {
                    height,
                    low_hash: LowHash(hash_bytes),
                    timestamp_ms,
                }))
            }
            Opcode::GetMainBlockHeader => {
                if body.len() != 8 {
                    return Err(WireError::MalformedBody(opcode, "height must be 8 bytes"));
                }
                let height = u64::from_le_bytes(body.try_into().unwrap());
                Ok(Message::GetMainBlockHeader { height })
            }
        }
    }
}

/// A single framed message ready for the wire, or as read off it.
pub struct Frame;

impl Frame {
    /// Encodes `msg` as `[len BE(4) | opcode(1) | body]`.
    pub fn encode(msg: &Message) -> Vec<u8> {
        let body = msg.encode_body();
        let len = (1 + body.len()) as u32;
        let mut out = Vec::with_capacity(4 + body.len() + 1);
        out.extend_from_slice(&len.to_be_bytes());
        out.push(msg.opcode().to_byte());
        out.extend_from_slice(&body);
        out
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some((message, consumed)))` on success, `Ok(None)` if
    /// `buf` does not yet contain a complete frame, or `Err` if the
    /// bytes present so far are already malformed.
    pub fn try_decode(buf: &[u8]) -> Result<Option<(Message, usize)>, WireError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        if len == 0 {
            return Err(WireError::EmptyFrame);
        }
        if len - 1 > MAX_FRAME_BODY_LEN {
            return Err(WireError::FrameTooLarge(len - 1));
        }
        if buf.len() < 4 + len {
            return Ok(None);
        }

        let opcode_byte = buf[4];
        let opcode = Opcode::from_byte(opcode_byte).ok_or(WireError::UnknownOpcode(opcode_byte))?;
        let body = &buf[5..4 + len];
        let message = Message::decode(opcode, body)?;
        Ok(Some((message, 4 + len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockBuilder;

    #[test]
    fn disconnect_round_trips() {
        let msg = Message::Disconnect {
            reason: DisconnectReason::MessageQueueFull,
        };
        let bytes = Frame::encode(&msg);
        let (decoded, consumed) = Frame::try_decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn handshake_round_trips() {
        let msg = Message::Handshake(HandshakeBody {
            network_id: 7,
            protocol_version: 3,
            tip_low_hash: LowHash([9u8; HASH_LEN]),
            listen_port: 8001,
            node_id: [1u8; 20],
        });
        let bytes = Frame::encode(&msg);
        let (decoded, _) = Frame::try_decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn main_block_round_trips() {
        let block = BlockBuilder::new(5).nonce([2u8; 32]).build();
        let msg = Message::MainBlock { block };
        let bytes = Frame::encode(&msg);
        let (decoded, _) = Frame::try_decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn partial_frame_returns_none() {
        let msg = Message::GetMainBlockHeader { height: 42 };
        let bytes = Frame::encode(&msg);
        let partial = &bytes[..bytes.len() - 2];
        assert_eq!(Frame::try_decode(partial).unwrap(), None);
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let a = Message::PingPong { nonce: 1 };
        let b = Message::GetMainBlock {
            low_hash: LowHash([3u8; HASH_LEN]),
        };
        let mut buf = Frame::encode(&a);
        buf.extend_from_slice(&Frame::encode(&b));

        let (first, consumed1) = Frame::try_decode(&buf).unwrap().unwrap();
        assert_eq!(first, a);
        let (second, consumed2) = Frame::try_decode(&buf[consumed1..]).unwrap().unwrap();
        assert_eq!(second, b);
        assert_eq!(consumed1 + consumed2, buf.len());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        let huge_len = (MAX_FRAME_BODY_LEN + 2) as u32;
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.push(Opcode::NewBlock.to_byte());
        buf.extend(std::iter::repeat(0u8).take(MAX_FRAME_BODY_LEN + 1));
        assert!(matches!(
            Frame::try_decode(&buf),
            Err(WireError::FrameTooLarge(_))
        ));
    }
}
