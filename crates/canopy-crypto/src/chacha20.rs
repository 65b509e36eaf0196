//! ChaCha20-Poly1305 AEAD encryption (RFC 8439).
//!
//! Used for the shared encrypted GroupInfo in a Welcome and as the AEAD
//! inside labelled HPKE seals.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::{CryptoError, Result};

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

fn cipher_and_nonce<'a>(key: &[u8], nonce: &'a [u8]) -> Result<(ChaCha20Poly1305, &'a Nonce)> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    Ok((
        ChaCha20Poly1305::new(Key::from_slice(key)),
        Nonce::from_slice(nonce),
    ))
}

/// Encrypt data with ChaCha20-Poly1305.
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `nonce` - 12-byte nonce (must never be reused with the same key)
/// * `aad` - Additional authenticated data
/// * `plaintext` - Data to encrypt
///
/// # Returns
///
/// Ciphertext with appended 16-byte authentication tag.
pub fn encrypt(key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let (cipher, nonce) = cipher_and_nonce(key, nonce)?;
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncryption)
}

/// Decrypt data with ChaCha20-Poly1305.
///
/// Returns the plaintext, or [`CryptoError::AeadDecryption`] if
/// authentication fails. No partial plaintext is ever returned.
pub fn decrypt(key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let (cipher, nonce) = cipher_and_nonce(key, nonce)?;
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadDecryption)
}
