//! ECDSA on secp256k1 with recoverable signatures.
//!
//! The crate treats key derivation (BIP-32/BIP-44) as an external,
//! opaque signer: this module only signs/verifies/recovers over
//! already-derived secret and public keys.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::dsha256;

/// A recoverable ECDSA signature: 64 bytes of `(r, s)` plus a 1-byte
/// recovery id, serialized as `[r(32) | s(32) | v(1)]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature65(pub [u8; 65]);

impl Signature65 {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature does not recover to the expected public key")]
    RecoveryMismatch,
}

/// Signs the double-SHA-256 of `message` with `secret_key`, producing a
/// recoverable signature.
pub fn sign_recoverable(secret_key: &[u8; 32], message: &[u8]) -> Result<Signature65, KeyError> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(secret_key).map_err(|_| KeyError::InvalidSecretKey)?;
    let digest = dsha256(message);
    let msg = Message::from_digest(digest);
    let sig = secp.sign_ecdsa_recoverable(&msg, &sk);
    let (recovery_id, compact) = sig.serialize_compact();
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    Ok(Signature65(out))
}

/// Recovers the public key that produced `signature` over `message`.
pub fn recover_public_key(signature: &Signature65, message: &[u8]) -> Result<[u8; 33], KeyError> {
    let secp = Secp256k1::verification_only();
    let digest = dsha256(message);
    let msg = Message::from_digest(digest);

    let recovery_id =
        RecoveryId::from_i32(signature.0[64] as i32).map_err(|_| KeyError::InvalidSignature)?;
    let compact = &signature.0[..64];
    let sig = RecoverableSignature::from_compact(compact, recovery_id)
        .map_err(|_| KeyError::InvalidSignature)?;

    let pubkey = secp
        .recover_ecdsa(&msg, &sig)
        .map_err(|_| KeyError::InvalidSignature)?;
    Ok(pubkey.serialize())
}

/// Verifies that `signature` over `message` recovers to `expected_pubkey`.
pub fn verify_recoverable(
    signature: &Signature65,
    message: &[u8],
    expected_pubkey: &[u8; 33],
) -> Result<(), KeyError> {
    let recovered = recover_public_key(signature, message)?;
    if &recovered == expected_pubkey {
        Ok(())
    } else {
        Err(KeyError::RecoveryMismatch)
    }
}

/// Recovers the public key from a bare 64-byte `(r, s)` pair with no
/// stored recovery id, by trying both candidate ids and returning
/// whichever recovers successfully.
///
/// Block wire format has no room for the recovery id byte, unlike
/// [`Signature65`]; callers that need a specific key (rather than just
/// "some" recovered key) should use [`verify_against_pubkey`] instead,
/// since an attacker-chosen `(r, s)` can recover to two different keys.
pub fn recover_any_public_key(sig64: &[u8; 64], message: &[u8]) -> Result<[u8; 33], KeyError> {
    let secp = Secp256k1::verification_only();
    let digest = dsha256(message);
    let msg = Message::from_digest(digest);

    for id in [0u8, 1u8] {
        let recovery_id = RecoveryId::from_i32(id as i32).map_err(|_| KeyError::InvalidSignature)?;
        let Ok(sig) = RecoverableSignature::from_compact(sig64, recovery_id) else {
            continue;
        };
        if let Ok(pubkey) = secp.recover_ecdsa(&msg, &sig) {
            return Ok(pubkey.serialize());
        }
    }
    Err(KeyError::InvalidSignature)
}

/// Verifies a bare 64-byte `(r, s)` pair against a specific expected
/// public key, trying both recovery ids.
pub fn verify_against_pubkey(
    sig64: &[u8; 64],
    message: &[u8],
    expected_pubkey: &[u8; 33],
) -> Result<(), KeyError> {
    let secp = Secp256k1::verification_only();
    let digest = dsha256(message);
    let msg = Message::from_digest(digest);

    for id in [0u8, 1u8] {
        let recovery_id = RecoveryId::from_i32(id as i32).map_err(|_| KeyError::InvalidSignature)?;
        let Ok(sig) = RecoverableSignature::from_compact(sig64, recovery_id) else {
            continue;
        };
        if let Ok(pubkey) = secp.recover_ecdsa(&msg, &sig) {
            if &pubkey.serialize() == expected_pubkey {
                return Ok(());
            }
        }
    }
    Err(KeyError::RecoveryMismatch)
}

/// Derives the uncompressed-key-independent public key bytes from a
/// secret key, for tests and local key generation.
pub fn public_key_from_secret(secret_key: &[u8; 32]) -> Result<[u8; 33], KeyError> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(secret_key).map_err(|_| KeyError::InvalidSecretKey)?;
    let pk = PublicKey::from_secret_key(&secp, &sk);
    Ok(pk.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_secret(byte: u8) -> [u8; 32] {
        let mut sk = [byte; 32];
        // avoid the all-zero and overflow-modulus edge cases
        sk[0] |= 1;
        sk
    }

    #[test]
    fn sign_then_recover_round_trips() {
        let sk = dummy_secret(7);
        let pk = public_key_from_secret(&sk).unwrap();
        let msg = b"xdag block body";

        let sig = sign_recoverable(&sk, msg).unwrap();
        let recovered = recover_public_key(&sig, msg).unwrap();

        assert_eq!(recovered, pk);
        assert!(verify_recoverable(&sig, msg, &pk).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let sk = dummy_secret(9);
        let pk = public_key_from_secret(&sk).unwrap();
        let sig = sign_recoverable(&sk, b"original").unwrap();
        assert!(verify_recoverable(&sig, b"tampered", &pk).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let sk_a = dummy_secret(1);
        let sk_b = dummy_secret(2);
        let pk_b = public_key_from_secret(&sk_b).unwrap();
        let sig = sign_recoverable(&sk_a, b"msg").unwrap();
        assert!(verify_recoverable(&sig, b"msg", &pk_b).is_err());
    }

    fn sig64(sig: &Signature65) -> [u8; 64] {
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.0[..64]);
        out
    }

    #[test]
    fn recover_any_public_key_finds_the_signer_without_a_stored_id() {
        let sk = dummy_secret(11);
        let pk = public_key_from_secret(&sk).unwrap();
        let sig = sign_recoverable(&sk, b"body").unwrap();

        let recovered = recover_any_public_key(&sig64(&sig), b"body").unwrap();
        assert_eq!(recovered, pk);
    }

    #[test]
    fn verify_against_pubkey_accepts_matching_key_without_a_stored_id() {
        let sk = dummy_secret(12);
        let pk = public_key_from_secret(&sk).unwrap();
        let sig = sign_recoverable(&sk, b"body").unwrap();

        assert!(verify_against_pubkey(&sig64(&sig), b"body", &pk).is_ok());
    }

    #[test]
    fn verify_against_pubkey_rejects_wrong_key_without_a_stored_id() {
        let sk_a = dummy_secret(13);
        let sk_b = dummy_secret(14);
        let pk_b = public_key_from_secret(&sk_b).unwrap();
        let sig = sign_recoverable(&sk_a, b"body").unwrap();

        assert!(verify_against_pubkey(&sig64(&sig), b"body", &pk_b).is_err());
    }
}
