//! Wire-level codecs: the position-based 512-byte block codec, and the
//! length-prefixed message framing used by [`crate::net`] and
//! [`crate::queue`].

pub mod block_codec;
pub mod wire;

pub use block_codec::{decode_block, encode_block, hash_block, BlockCodecError};
pub use wire::{
    DisconnectReason, Frame, HandshakeBody, MainBlockHeaderBody, Message, Opcode, WireError,
    MAX_FRAME_BODY_LEN,
};
