//! Secrets, keys and ciphertext containers.
//!
//! Public values are plain byte newtypes with an `opaque<V>` encoding.
//! Private values zeroize on drop and never print their contents.

use canopy_codec::{read_opaque, write_opaque, Codec, Cursor};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

macro_rules! opaque_bytes {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Vec<u8>);

        impl $name {
            /// Wrap raw bytes.
            pub fn new(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Length in bytes.
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Whether the value is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl Codec for $name {
            fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
                write_opaque(buf, &self.0)
            }

            fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
                Ok(Self(read_opaque(cursor)?))
            }
        }
    };
}

opaque_bytes!(
    /// An HPKE (X25519) public key.
    HpkePublicKey
);

opaque_bytes!(
    /// A signature verification key.
    SignaturePublicKey
);

opaque_bytes!(
    /// An AEAD nonce.
    Nonce
);

/// Secret key material. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The all-zero secret of `len` bytes.
    pub fn zero(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    /// The empty secret.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Secret {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED; {}])", self.0.len())
    }
}

impl Codec for Secret {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        write_opaque(buf, &self.0)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self(read_opaque(cursor)?))
    }
}

/// An HPKE (X25519) private key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HpkePrivateKey(Vec<u8>);

impl HpkePrivateKey {
    /// Wrap raw private key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for HpkePrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HpkePrivateKey([REDACTED])")
    }
}

/// A signature private key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SignaturePrivateKey(Vec<u8>);

impl SignaturePrivateKey {
    /// Wrap raw private key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SignaturePrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignaturePrivateKey([REDACTED])")
    }
}

/// An HPKE key pair.
#[derive(Clone, Debug)]
pub struct HpkeKeyPair {
    pub private_key: HpkePrivateKey,
    pub public_key: HpkePublicKey,
}

/// Output of a labelled HPKE seal.
///
/// ```text
/// struct {
///     opaque kem_output<V>;
///     opaque ciphertext<V>;
/// } HPKECiphertext;
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpkeCiphertext {
    pub kem_output: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl Codec for HpkeCiphertext {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        write_opaque(buf, &self.kem_output)?;
        write_opaque(buf, &self.ciphertext)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        Ok(Self {
            kem_output: read_opaque(cursor)?,
            ciphertext: read_opaque(cursor)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new(vec![0xAB; 32]);
        let printed = format!("{secret:?}");
        assert_eq!(printed, "Secret([REDACTED; 32])");
        assert!(!printed.contains("ab"));
    }

    #[test]
    fn test_public_key_encoding() {
        let key = HpkePublicKey::new(vec![1, 2, 3]);
        assert_eq!(key.encode_to_vec().expect("encode"), vec![3, 1, 2, 3]);
        assert_eq!(
            HpkePublicKey::decode_exact(&[3, 1, 2, 3]).expect("decode"),
            key
        );
    }

    #[test]
    fn test_hpke_ciphertext_field_order() {
        let ct = HpkeCiphertext {
            kem_output: vec![0xAA],
            ciphertext: vec![0xBB, 0xCC],
        };
        let bytes = ct.encode_to_vec().expect("encode");
        assert_eq!(bytes, vec![1, 0xAA, 2, 0xBB, 0xCC]);
        assert_eq!(HpkeCiphertext::decode_exact(&bytes).expect("decode"), ct);
    }

    #[test]
    fn test_public_key_serde_roundtrip() {
        let key = SignaturePublicKey::new(vec![9; 32]);
        let json = serde_json::to_string(&key).expect("serialize");
        let restored: SignaturePublicKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(key, restored);
    }
}
