//! Cryptographic primitives used across the consensus core.
//!
//! This module wraps the hash functions and the ECDSA scheme the rest of
//! the crate depends on. Nothing here is consensus-aware: callers supply
//! raw byte slices and get back digests or signatures.

pub mod ecdsa;
pub mod hash;

pub use ecdsa::{
    public_key_from_secret, recover_any_public_key, recover_public_key, sign_recoverable,
    verify_against_pubkey, verify_recoverable, KeyError, Signature65,
};
pub use hash::{dsha256, hmac_sha512, keccak256, ripemd160_sha256, sha256, Digest32};
