//! X25519 key agreement (RFC 7748).
//!
//! The KEM of the Canopy suite: HPKE init keys, ratchet tree node
//! encryption keys and the ephemeral keys of every labelled seal.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// Length of X25519 public and private keys.
pub const KEY_SIZE: usize = 32;

/// An X25519 static secret key.
#[derive(Clone)]
pub struct X25519StaticSecret {
    inner: StaticSecret,
}

/// An X25519 shared secret.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl X25519StaticSecret {
    /// Generate a new random static secret.
    pub fn random() -> Self {
        Self {
            inner: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            inner: StaticSecret::from(bytes),
        }
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_bytes(key_array(bytes)?))
    }

    /// Get the raw bytes of this secret.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Compute the corresponding public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.inner).to_bytes()
    }

    /// Perform Diffie-Hellman key agreement.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> SharedSecret {
        let shared = self.inner.diffie_hellman(&PublicKey::from(*their_public));
        SharedSecret {
            bytes: *shared.as_bytes(),
        }
    }
}

impl SharedSecret {
    /// Get the raw bytes of the shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Convert a key slice to a fixed-size array, checking its length.
pub fn key_array(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })
}

impl std::fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X25519StaticSecret")
            .field("public", &hex::encode(self.public_key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diffie_hellman_agreement() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();

        let alice_shared = alice.diffie_hellman(&bob.public_key());
        let bob_shared = bob.diffie_hellman(&alice.public_key());
        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_rfc7748_section6_1() {
        let alice = X25519StaticSecret::from_bytes(hex_literal::hex!(
            "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a"
        ));
        assert_eq!(
            alice.public_key(),
            hex_literal::hex!("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
        );
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(matches!(
            X25519StaticSecret::from_slice(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 31
            })
        ));
    }
}
