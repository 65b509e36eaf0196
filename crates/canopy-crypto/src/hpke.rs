//! Single-shot public-key encryption over X25519, BLAKE3 and ChaCha20-Poly1305.
//!
//! Base-mode HPKE shape: one ephemeral KEM key per message, a key schedule
//! bound to an `info` string, and an AEAD seal. The MLS layer passes the
//! encoded `EncryptContext` as `info`, so ciphertexts produced for one label
//! never open under another.
//!
//! ## Algorithm
//!
//! ```text
//! Seal(recipient_pk, info, aad, plaintext; eph_sk):
//!   1. eph_pk = X25519_basepoint_mult(eph_sk)
//!   2. dh = X25519(eph_sk, recipient_pk)
//!   3. kem_secret = BLAKE3::derive_key("Canopy v1 hpke-shared-secret",
//!                       dh || eph_pk || recipient_pk)
//!   4. key   = BLAKE3::derive_key("Canopy v1 hpke-key",   kem_secret || info)
//!   5. nonce = BLAKE3::derive_key("Canopy v1 hpke-nonce", kem_secret || info)[:12]
//!   6. ciphertext = ChaCha20-Poly1305.Encrypt(key, nonce, aad, plaintext)
//!   7. return (kem_output = eph_pk, ciphertext)
//!
//! Export(recipient_pk, info; eph_sk):
//!   steps 1-3, then secret = BLAKE3::derive_key("Canopy v1 hpke-export",
//!                                               kem_secret || info)
//! ```
//!
//! All `||` concatenations use [`blake3::encode_multi_field`].

use zeroize::Zeroize;

use crate::blake3::{self, contexts};
use crate::chacha20;
use crate::types::HpkeCiphertext;
use crate::x25519::{key_array, X25519StaticSecret};
use crate::{CryptoError, Result};

struct KeySchedule {
    key: [u8; 32],
    nonce: [u8; chacha20::NONCE_SIZE],
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        self.key.zeroize();
        self.nonce.zeroize();
    }
}

fn kem_secret(dh: &[u8; 32], eph_pk: &[u8; 32], recipient_pk: &[u8; 32]) -> [u8; 32] {
    blake3::derive_key(
        contexts::HPKE_SHARED_SECRET,
        &blake3::encode_multi_field(&[dh, eph_pk, recipient_pk]),
    )
}

fn key_schedule(kem_secret: &[u8; 32], info: &[u8]) -> KeySchedule {
    let material = blake3::encode_multi_field(&[kem_secret, info]);
    let key = blake3::derive_key(contexts::HPKE_KEY, &material);
    let nonce_full = blake3::derive_key(contexts::HPKE_NONCE, &material);
    let mut nonce = [0u8; chacha20::NONCE_SIZE];
    nonce.copy_from_slice(&nonce_full[..chacha20::NONCE_SIZE]);
    KeySchedule { key, nonce }
}

/// Seal with explicit ephemeral randomness (for reproducible test vectors).
///
/// # Arguments
///
/// * `recipient_pk` - Recipient's X25519 public key bytes
/// * `info` - Key schedule context
/// * `aad` - Additional authenticated data
/// * `plaintext` - Data to encrypt
/// * `randomness` - 32 bytes used as the ephemeral secret
pub fn seal_deterministic(
    recipient_pk: &[u8],
    info: &[u8],
    aad: &[u8],
    plaintext: &[u8],
    randomness: &[u8; 32],
) -> Result<HpkeCiphertext> {
    let recipient_pk = key_array(recipient_pk)?;
    let eph = X25519StaticSecret::from_bytes(*randomness);
    let eph_pk = eph.public_key();
    let dh = eph.diffie_hellman(&recipient_pk);

    let schedule = key_schedule(&kem_secret(dh.as_bytes(), &eph_pk, &recipient_pk), info);
    let ciphertext = chacha20::encrypt(&schedule.key, &schedule.nonce, aad, plaintext)?;

    Ok(HpkeCiphertext {
        kem_output: eph_pk.to_vec(),
        ciphertext,
    })
}

/// Seal with a fresh random ephemeral key.
pub fn seal(recipient_pk: &[u8], info: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<HpkeCiphertext> {
    let mut randomness = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut randomness);
    let sealed = seal_deterministic(recipient_pk, info, aad, plaintext, &randomness);
    randomness.zeroize();
    sealed
}

/// Open a sealed ciphertext with the recipient's private key.
///
/// # Errors
///
/// Returns [`CryptoError::HpkeDecryption`] if authentication fails, and a
/// key-length error if the private key or KEM output are malformed.
pub fn open(
    recipient_sk: &[u8],
    info: &[u8],
    aad: &[u8],
    ciphertext: &HpkeCiphertext,
) -> Result<Vec<u8>> {
    let recipient = X25519StaticSecret::from_slice(recipient_sk)?;
    let eph_pk = key_array(&ciphertext.kem_output)?;
    let dh = recipient.diffie_hellman(&eph_pk);

    let schedule = key_schedule(&kem_secret(dh.as_bytes(), &eph_pk, &recipient.public_key()), info);
    chacha20::decrypt(&schedule.key, &schedule.nonce, aad, &ciphertext.ciphertext).map_err(|e| {
        match e {
            CryptoError::AeadDecryption => CryptoError::HpkeDecryption,
            other => other,
        }
    })
}

/// Agree on an exported secret with the holder of `recipient_pk`.
///
/// Returns `(kem_output, secret)`.
pub fn export(recipient_pk: &[u8], info: &[u8]) -> Result<(Vec<u8>, [u8; 32])> {
    let recipient_pk = key_array(recipient_pk)?;
    let eph = X25519StaticSecret::random();
    let eph_pk = eph.public_key();
    let dh = eph.diffie_hellman(&recipient_pk);

    let secret = exporter(&kem_secret(dh.as_bytes(), &eph_pk, &recipient_pk), info);
    Ok((eph_pk.to_vec(), secret))
}

/// Recompute an exported secret on the recipient side.
pub fn export_with(kem_output: &[u8], recipient_sk: &[u8], info: &[u8]) -> Result<[u8; 32]> {
    let recipient = X25519StaticSecret::from_slice(recipient_sk)?;
    let eph_pk = key_array(kem_output)?;
    let dh = recipient.diffie_hellman(&eph_pk);
    Ok(exporter(
        &kem_secret(dh.as_bytes(), &eph_pk, &recipient.public_key()),
        info,
    ))
}

fn exporter(kem_secret: &[u8; 32], info: &[u8]) -> [u8; 32] {
    blake3::derive_key(
        contexts::HPKE_EXPORT,
        &blake3::encode_multi_field(&[kem_secret, info]),
    )
}

/// Deterministically derive an X25519 key pair from input keying material.
///
/// Returns `(private_key, public_key)`.
pub fn derive_key_pair(ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let secret = X25519StaticSecret::from_bytes(blake3::derive_key(
        contexts::HPKE_DERIVE_KEY_PAIR,
        ikm,
    ));
    (secret.to_bytes(), secret.public_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> ([u8; 32], [u8; 32]) {
        let sk = X25519StaticSecret::random();
        (sk.to_bytes(), sk.public_key())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (sk, pk) = recipient();
        let ct = seal(&pk, b"info", b"aad", b"group secrets").expect("seal");
        assert_eq!(ct.kem_output.len(), 32);
        let pt = open(&sk, b"info", b"aad", &ct).expect("open");
        assert_eq!(pt, b"group secrets");
    }

    #[test]
    fn test_seal_is_randomised() {
        let (_, pk) = recipient();
        let a = seal(&pk, b"info", &[], b"same").expect("seal");
        let b = seal(&pk, b"info", &[], b"same").expect("seal");
        assert_ne!(a.kem_output, b.kem_output);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_deterministic_seal_reproducible() {
        let (_, pk) = recipient();
        let a = seal_deterministic(&pk, b"info", &[], b"pt", &[7u8; 32]).expect("seal");
        let b = seal_deterministic(&pk, b"info", &[], b"pt", &[7u8; 32]).expect("seal");
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_info_fails() {
        let (sk, pk) = recipient();
        let ct = seal(&pk, b"label A", &[], b"pt").expect("seal");
        assert!(matches!(
            open(&sk, b"label B", &[], &ct),
            Err(CryptoError::HpkeDecryption)
        ));
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let (_, pk) = recipient();
        let (other_sk, _) = recipient();
        let ct = seal(&pk, b"info", &[], b"pt").expect("seal");
        assert!(matches!(
            open(&other_sk, b"info", &[], &ct),
            Err(CryptoError::HpkeDecryption)
        ));
    }

    #[test]
    fn test_export_agreement() {
        let (sk, pk) = recipient();
        let (kem_output, sender_secret) = export(&pk, b"external init").expect("export");
        let receiver_secret = export_with(&kem_output, &sk, b"external init").expect("export");
        assert_eq!(sender_secret, receiver_secret);

        let other = export_with(&kem_output, &sk, b"other info").expect("export");
        assert_ne!(sender_secret, other);
    }

    #[test]
    fn test_derive_key_pair_deterministic() {
        let (sk1, pk1) = derive_key_pair(b"path secret");
        let (sk2, pk2) = derive_key_pair(b"path secret");
        assert_eq!(sk1, sk2);
        assert_eq!(pk1, pk2);
        assert_ne!(derive_key_pair(b"other").1, pk1);
    }

    #[test]
    fn test_malformed_kem_output_rejected() {
        let (sk, pk) = recipient();
        let mut ct = seal(&pk, b"info", &[], b"pt").expect("seal");
        ct.kem_output.truncate(16);
        assert!(matches!(
            open(&sk, b"info", &[], &ct),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }
}
