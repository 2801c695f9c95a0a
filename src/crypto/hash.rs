//! Hash functions: SHA-256, double-SHA-256, Keccak-256, and
//! RIPEMD-160-on-SHA-256.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest as _, Sha256, Sha512};
use sha3::Keccak256;

type HmacSha512 = Hmac<Sha512>;

/// A bare 32-byte digest, used for every hash function in this module.
pub type Digest32 = [u8; 32];

/// Computes `SHA-256(data)`.
pub fn sha256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes `SHA-256(SHA-256(data))`, the block-hashing primitive used by
/// [`crate::codec::block_codec`].
pub fn dsha256(data: &[u8]) -> Digest32 {
    sha256(&sha256(data))
}

/// Computes `Keccak-256(data)`.
pub fn keccak256(data: &[u8]) -> Digest32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes `RIPEMD-160(SHA-256(data))`, zero-padded to 32 bytes in the
/// low 20 bytes. Used where a short, Bitcoin-style address digest is
/// needed from a public key.
pub fn ripemd160_sha256(data: &[u8]) -> [u8; 20] {
    let sha = sha256(data);
    let mut hasher = Ripemd160::new();
    hasher.update(sha);
    hasher.finalize().into()
}

/// Computes `HMAC-SHA-512(key, data)`.
///
/// The signer used by external key-derivation code (BIP-32/BIP-44, out
/// of scope for this crate) is the only expected caller; it is kept here
/// because it is a pure hash primitive with no derivation-path logic.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"xdag"), sha256(b"xdag"));
        assert_ne!(sha256(b"xdag"), sha256(b"xdag2"));
    }

    #[test]
    fn dsha256_is_sha256_twice() {
        let once = sha256(b"block-bytes");
        let twice = sha256(&once);
        assert_eq!(dsha256(b"block-bytes"), twice);
    }

    #[test]
    fn keccak256_differs_from_sha256() {
        assert_ne!(keccak256(b"xdag"), sha256(b"xdag"));
    }

    #[test]
    fn ripemd160_sha256_produces_20_bytes() {
        let out = ripemd160_sha256(b"pubkey-bytes");
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn hmac_sha512_is_deterministic_and_key_sensitive() {
        let a = hmac_sha512(b"key-a", b"data");
        let b = hmac_sha512(b"key-a", b"data");
        let c = hmac_sha512(b"key-b", b"data");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
