//! The 512-byte transaction block: a fixed grid of sixteen 32-byte field
//! slots whose role is determined by a 4-bit nibble in the block's
//! `type` word.
//!
//! Decoding and encoding live in [`crate::codec::block_codec`]; this
//! module owns the in-memory representation and the accessors that
//! interpret the raw slots.

use serde::{Deserialize, Serialize};

use super::amount::XAmount;
use super::LowHash;

/// Number of bytes in every hash type used by this crate.
pub const HASH_LEN: usize = 32;

/// Number of 32-byte field slots in a block.
pub const FIELD_COUNT: usize = 16;

/// Size in bytes of a single field slot.
pub const FIELD_SIZE: usize = 32;

/// Total encoded size of a block, in bytes.
pub const BLOCK_SIZE: usize = FIELD_COUNT * FIELD_SIZE;

/// The role a field slot plays, as tagged by one 4-bit nibble of the
/// block's `type` word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Slot 0 only: carries the `type` word itself, the timestamp, and
    /// reserved header bytes.
    Header,
    InputLink,
    OutputLink,
    InSignature,
    OutSignature,
    /// Public key slot whose stored x-coordinate pairs with an even
    /// y-coordinate (compressed prefix `0x02`).
    PublicKeyEven,
    /// Public key slot whose stored x-coordinate pairs with an odd
    /// y-coordinate (compressed prefix `0x03`).
    PublicKeyOdd,
    Nonce,
    Remark,
    /// Unused slot; reserved nibble values fall here.
    Reserved(u8),
}

impl FieldKind {
    pub fn to_nibble(self) -> u8 {
        match self {
            FieldKind::Header => 0,
            FieldKind::InputLink => 1,
            FieldKind::OutputLink => 2,
            FieldKind::InSignature => 3,
            FieldKind::OutSignature => 4,
            FieldKind::PublicKeyEven => 5,
            FieldKind::PublicKeyOdd => 6,
            FieldKind::Nonce => 7,
            FieldKind::Remark => 8,
            FieldKind::Reserved(n) => n,
        }
    }

    pub fn from_nibble(n: u8) -> FieldKind {
        match n {
            0 => FieldKind::Header,
            1 => FieldKind::InputLink,
            2 => FieldKind::OutputLink,
            3 => FieldKind::InSignature,
            4 => FieldKind::OutSignature,
            5 => FieldKind::PublicKeyEven,
            6 => FieldKind::PublicKeyOdd,
            7 => FieldKind::Nonce,
            8 => FieldKind::Remark,
            other => FieldKind::Reserved(other),
        }
    }
}

/// A single 32-byte field slot, kept as opaque bytes.
///
/// Storing slots as raw bytes (rather than a parsed union) is what makes
/// `decode(encode(b)) == b` trivially exact: encoding is just
/// concatenation, with no re-derivation step that could round differently.
pub type FieldSlot = [u8; FIELD_SIZE];

/// A link extracted from an input-link or output-link slot.
///
/// The real encoding overlays the amount onto the 8 bytes that a
/// [`LowHash`] always keeps zeroed, so a link slot is exactly
/// `amount(8 LE bytes) || hashlow-suffix(24 bytes)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub amount: XAmount,
    hashlow_suffix: [u8; 24],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkKind {
    Input,
    Output,
}

impl Link {
    pub fn new(amount: XAmount, target: LowHash) -> Self {
        let mut suffix = [0u8; 24];
        suffix.copy_from_slice(&target.as_bytes()[8..]);
        Link {
            amount,
            hashlow_suffix: suffix,
        }
    }

    pub fn target(&self) -> LowHash {
        let mut bytes = [0u8; HASH_LEN];
        bytes[8..].copy_from_slice(&self.hashlow_suffix);
        LowHash(bytes)
    }

    fn to_slot(self) -> FieldSlot {
        let mut slot = [0u8; FIELD_SIZE];
        slot[..8].copy_from_slice(&self.amount.to_le_bytes());
        slot[8..].copy_from_slice(&self.hashlow_suffix);
        slot
    }

    fn from_slot(slot: &FieldSlot) -> Self {
        let mut amount_bytes = [0u8; 8];
        amount_bytes.copy_from_slice(&slot[..8]);
        let mut suffix = [0u8; 24];
        suffix.copy_from_slice(&slot[8..]);
        Link {
            amount: XAmount::from_le_bytes(amount_bytes),
            hashlow_suffix: suffix,
        }
    }
}

/// Parsed view of slot 0.
///
/// Layout: `type(8 LE) || timestamp_ms(8 LE) || reserved(16)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub block_type: u64,
    pub timestamp_ms: u64,
    pub reserved: [u8; 16],
}

impl Header {
    fn to_slot(self) -> FieldSlot {
        let mut slot = [0u8; FIELD_SIZE];
        slot[..8].copy_from_slice(&self.block_type.to_le_bytes());
        slot[8..16].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        slot[16..].copy_from_slice(&self.reserved);
        slot
    }

    fn from_slot(slot: &FieldSlot) -> Self {
        let mut type_bytes = [0u8; 8];
        type_bytes.copy_from_slice(&slot[..8]);
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&slot[8..16]);
        let mut reserved = [0u8; 16];
        reserved.copy_from_slice(&slot[16..]);
        Header {
            block_type: u64::from_le_bytes(type_bytes),
            timestamp_ms: u64::from_le_bytes(ts_bytes),
            reserved,
        }
    }
}

/// A mutable block type word: nibble `i` tags field slot `i`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockType(pub u64);

impl BlockType {
    pub fn nibble(&self, index: usize) -> FieldKind {
        let shift = index * 4;
        let n = ((self.0 >> shift) & 0xF) as u8;
        FieldKind::from_nibble(n)
    }

    pub fn set_nibble(&mut self, index: usize, kind: FieldKind) {
        let shift = index * 4;
        let mask = !(0xFu64 << shift);
        self.0 = (self.0 & mask) | ((kind.to_nibble() as u64 & 0xF) << shift);
    }
}

/// A fully decoded 512-byte transaction block.
///
/// Internally this is just the sixteen raw field slots: every accessor
/// below is a pure function of `slots`, and [`crate::codec::block_codec::encode`]
/// is nothing more than concatenating them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(with = "slot_array")]
    pub(crate) slots: [FieldSlot; FIELD_COUNT],
}

mod slot_array {
    use super::{FIELD_COUNT, FIELD_SIZE};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        slots: &[[u8; FIELD_SIZE]; FIELD_COUNT],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let flat: Vec<u8> = slots.iter().flatten().copied().collect();
        s.serialize_bytes(&flat)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<[[u8; FIELD_SIZE]; FIELD_COUNT], D::Error> {
        let flat: Vec<u8> = Vec::<u8>::deserialize(d)?;
        if flat.len() != FIELD_COUNT * FIELD_SIZE {
            return Err(serde::de::Error::custom("block must be exactly 512 bytes"));
        }
        let mut slots = [[0u8; FIELD_SIZE]; FIELD_COUNT];
        for (i, chunk) in flat.chunks_exact(FIELD_SIZE).enumerate() {
            slots[i].copy_from_slice(chunk);
        }
        Ok(slots)
    }
}

impl Block {
    /// Slices an exactly-512-byte buffer into the slot array. Callers
    /// (the block codec) are responsible for checking the length and
    /// nibble composition; this is a bare reinterpretation.
    pub(crate) fn from_raw_slots(bytes: &[u8]) -> Block {
        debug_assert_eq!(bytes.len(), BLOCK_SIZE);
        let mut slots = [[0u8; FIELD_SIZE]; FIELD_COUNT];
        for (i, chunk) in bytes.chunks_exact(FIELD_SIZE).enumerate() {
            slots[i].copy_from_slice(chunk);
        }
        Block { slots }
    }

    /// Concatenates the slot array back into its 512-byte wire form.
    pub(crate) fn to_raw_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        for (i, slot) in self.slots.iter().enumerate() {
            out[i * FIELD_SIZE..(i + 1) * FIELD_SIZE].copy_from_slice(slot);
        }
        out
    }

    pub fn type_word(&self) -> BlockType {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.slots[0][..8]);
        BlockType(u64::from_le_bytes(bytes))
    }

    pub fn header(&self) -> Header {
        Header::from_slot(&self.slots[0])
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.header().timestamp_ms
    }

    /// Returns every link slot tagged `kind`, in slot order, excluding
    /// slot 0 which is always the header.
    fn links_of(&self, kind: FieldKind) -> Vec<Link> {
        let type_word = self.type_word();
        (1..FIELD_COUNT)
            .filter(|&i| type_word.nibble(i) == kind)
            .map(|i| Link::from_slot(&self.slots[i]))
            .collect()
    }

    pub fn input_links(&self) -> Vec<Link> {
        self.links_of(FieldKind::InputLink)
    }

    pub fn output_links(&self) -> Vec<Link> {
        self.links_of(FieldKind::OutputLink)
    }

    /// Signature slots of the given kind, reassembled from consecutive
    /// slot pairs into 64-byte `r || s` signatures.
    ///
    /// No recovery id is stored: verification recovers against both
    /// candidate ids and keeps whichever matches the expected key.
    fn signatures_of(&self, kind: FieldKind) -> Vec<[u8; 64]> {
        let type_word = self.type_word();
        let mut out = Vec::new();
        let mut i = 1;
        while i < FIELD_COUNT {
            if type_word.nibble(i) == kind && i + 1 < FIELD_COUNT && type_word.nibble(i + 1) == kind
            {
                let mut sig = [0u8; 64];
                sig[..32].copy_from_slice(&self.slots[i]);
                sig[32..].copy_from_slice(&self.slots[i + 1]);
                out.push(sig);
                i += 2;
            } else {
                i += 1;
            }
        }
        out
    }

    pub fn in_signatures(&self) -> Vec<[u8; 64]> {
        self.signatures_of(FieldKind::InSignature)
    }

    pub fn out_signatures(&self) -> Vec<[u8; 64]> {
        self.signatures_of(FieldKind::OutSignature)
    }

    /// Reassembles the compressed public key, if a public-key slot (even
    /// or odd parity) is present.
    pub fn public_key(&self) -> Option<[u8; 33]> {
        let type_word = self.type_word();
        for i in 1..FIELD_COUNT {
            let prefix = match type_word.nibble(i) {
                FieldKind::PublicKeyEven => Some(0x02u8),
                FieldKind::PublicKeyOdd => Some(0x03u8),
                _ => None,
            };
            if let Some(prefix) = prefix {
                let mut out = [0u8; 33];
                out[0] = prefix;
                out[1..].copy_from_slice(&self.slots[i]);
                return Some(out);
            }
        }
        None
    }

    pub fn nonce(&self) -> Option<[u8; 32]> {
        let type_word = self.type_word();
        (1..FIELD_COUNT)
            .find(|&i| type_word.nibble(i) == FieldKind::Nonce)
            .map(|i| self.slots[i])
    }

    pub fn remark(&self) -> Option<[u8; 32]> {
        let type_word = self.type_word();
        (1..FIELD_COUNT)
            .find(|&i| type_word.nibble(i) == FieldKind::Remark)
            .map(|i| self.slots[i])
    }

    /// Raw bytes with every out-signature slot zeroed, i.e. the message
    /// that an out-signature signs.
    pub fn bytes_excluding_out_signatures(&self) -> [u8; BLOCK_SIZE] {
        let type_word = self.type_word();
        let mut out = [0u8; BLOCK_SIZE];
        for i in 0..FIELD_COUNT {
            let slot = if type_word.nibble(i) == FieldKind::OutSignature {
                [0u8; FIELD_SIZE]
            } else {
                self.slots[i]
            };
            out[i * FIELD_SIZE..(i + 1) * FIELD_SIZE].copy_from_slice(&slot);
        }
        out
    }

    /// Raw bytes with every in-signature and out-signature slot zeroed,
    /// i.e. the message that an in-signature signs. An in-signature must
    /// be computable before the out-signature exists, so it cannot cover
    /// the out-signature slots; it also excludes its own slots since a
    /// signature cannot cover its own bytes.
    pub fn bytes_excluding_signatures(&self) -> [u8; BLOCK_SIZE] {
        let type_word = self.type_word();
        let mut out = [0u8; BLOCK_SIZE];
        for i in 0..FIELD_COUNT {
            let nibble = type_word.nibble(i);
            let slot = if nibble == FieldKind::OutSignature || nibble == FieldKind::InSignature {
                [0u8; FIELD_SIZE]
            } else {
                self.slots[i]
            };
            out[i * FIELD_SIZE..(i + 1) * FIELD_SIZE].copy_from_slice(&slot);
        }
        out
    }
}

/// Builder used by the codec and by consensus/test code to assemble a
/// block from semantic fields instead of raw slots.
pub struct BlockBuilder {
    type_word: BlockType,
    slots: [FieldSlot; FIELD_COUNT],
    cursor: usize,
}

impl BlockBuilder {
    pub fn new(timestamp_ms: u64) -> Self {
        let mut b = BlockBuilder {
            type_word: BlockType::default(),
            slots: [[0u8; FIELD_SIZE]; FIELD_COUNT],
            cursor: 1,
        };
        let header = Header {
            block_type: 0,
            timestamp_ms,
            reserved: [0u8; 16],
        };
        b.slots[0] = header.to_slot();
        b
    }

    fn push(mut self, kind: FieldKind, slot: FieldSlot) -> Self {
        assert!(self.cursor < FIELD_COUNT, "block has only 16 field slots");
        self.type_word.set_nibble(self.cursor, kind);
        self.slots[self.cursor] = slot;
        self.cursor += 1;
        self
    }

    pub fn input_link(self, link: Link) -> Self {
        self.push(FieldKind::InputLink, link.to_slot())
    }

    pub fn output_link(self, link: Link) -> Self {
        self.push(FieldKind::OutputLink, link.to_slot())
    }

    pub fn in_signature(self, sig: [u8; 64]) -> Self {
        let mut a = [0u8; FIELD_SIZE];
        let mut b = [0u8; FIELD_SIZE];
        a.copy_from_slice(&sig[..32]);
        b.copy_from_slice(&sig[32..]);
        self.push(FieldKind::InSignature, a)
            .push(FieldKind::InSignature, b)
    }

    pub fn out_signature(self, sig: [u8; 64]) -> Self {
        let mut a = [0u8; FIELD_SIZE];
        let mut b = [0u8; FIELD_SIZE];
        a.copy_from_slice(&sig[..32]);
        b.copy_from_slice(&sig[32..]);
        self.push(FieldKind::OutSignature, a)
            .push(FieldKind::OutSignature, b)
    }

    pub fn public_key(self, compressed: [u8; 33]) -> Self {
        let kind = match compressed[0] {
            0x02 => FieldKind::PublicKeyEven,
            0x03 => FieldKind::PublicKeyOdd,
            _ => panic!("compressed public key must start with 0x02 or 0x03"),
        };
        let mut slot = [0u8; FIELD_SIZE];
        slot.copy_from_slice(&compressed[1..]);
        self.push(kind, slot)
    }

    pub fn nonce(self, nonce: [u8; 32]) -> Self {
        self.push(FieldKind::Nonce, nonce)
    }

    pub fn remark(self, remark: [u8; 32]) -> Self {
        self.push(FieldKind::Remark, remark)
    }

    pub fn build(mut self) -> Block {
        let mut header = Header::from_slot(&self.slots[0]);
        header.block_type = self.type_word.0;
        self.slots[0] = header.to_slot();
        Block { slots: self.slots }
    }
}
