//! Ed25519 signing and verification (RFC 8032).
//!
//! Signs GroupInfo and leaf nodes. Keys travel as raw bytes inside
//! [`SignaturePrivateKey`](crate::SignaturePrivateKey) and
//! [`SignaturePublicKey`](crate::SignaturePublicKey); this module converts
//! them to `ed25519-dalek` types at the point of use.

use ed25519_dalek::{Signer, Verifier};

use crate::{CryptoError, Result};

/// Length of an Ed25519 seed or public key.
pub const KEY_SIZE: usize = 32;

/// Length of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 signing key (private key).
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a signing key from a 32-byte seed slice.
    pub fn from_slice(seed: &[u8]) -> Result<Self> {
        let seed: [u8; KEY_SIZE] = seed.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: seed.len(),
        })?;
        Ok(Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// Get the raw seed bytes of this signing key.
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the corresponding public key bytes.
    pub fn verifying_key_bytes(&self) -> [u8; KEY_SIZE] {
        self.inner.verifying_key().to_bytes()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.inner.sign(message).to_bytes()
    }
}

/// Verify `signature` over `message` under the public key bytes `public_key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] or [`CryptoError::InvalidInput`]
/// for malformed keys and signatures, and
/// [`CryptoError::SignatureVerification`] if the signature does not verify.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let key_bytes: [u8; KEY_SIZE] =
        public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: public_key.len(),
            })?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    let signature = ed25519_dalek::Signature::from_slice(signature)
        .map_err(|_| CryptoError::SignatureVerification)?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::SignatureVerification)
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &hex::encode(self.verifying_key_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = SigningKey::generate();
        let sig = key.sign(b"group info");
        assert!(verify(&key.verifying_key_bytes(), b"group info", &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let key = SigningKey::generate();
        let sig = key.sign(b"correct message");
        assert!(matches!(
            verify(&key.verifying_key_bytes(), b"wrong message", &sig),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn test_truncated_signature_fails() {
        let key = SigningKey::generate();
        let sig = key.sign(b"msg");
        assert!(verify(&key.verifying_key_bytes(), b"msg", &sig[..63]).is_err());
    }

    #[test]
    fn test_rfc8032_test1_public_key() {
        let key = SigningKey::from_slice(&hex_literal::hex!(
            "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60"
        ))
        .expect("seed");
        assert_eq!(
            key.verifying_key_bytes(),
            hex_literal::hex!("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a")
        );
    }
}
