//! # canopy-crypto
//!
//! The cryptographic boundary of Canopy.
//!
//! Everything above this crate talks to cryptography through the
//! [`CipherSuiteProvider`] trait: labelled public-key encryption, AEAD,
//! key export, the MLS hash/KDF helpers and labelled signatures. The
//! concrete suite shipped here is fixed:
//!
//! | Primitive | Algorithm |
//! |-----------|-----------|
//! | KEM       | X25519 (RFC 7748) |
//! | AEAD      | ChaCha20-Poly1305 (RFC 8439) |
//! | Hash/KDF  | BLAKE3 (hash, keyed hash, derive-key, XOF) |
//! | Signature | Ed25519 (RFC 8032) |
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 hashing and the MLS KDF built on it
//! - [`chacha20`]: ChaCha20-Poly1305 AEAD encryption
//! - [`ed25519`]: Ed25519 signing and verification
//! - [`x25519`]: X25519 key agreement
//! - [`hpke`]: Labelled single-shot public-key encryption and export
//! - [`suite`]: Cipher suite identifiers and the provider trait
//! - [`types`]: Secrets, keys and ciphertext containers

pub mod blake3;
pub mod chacha20;
pub mod ed25519;
pub mod hpke;
pub mod suite;
pub mod types;
pub mod x25519;

pub use suite::{CipherSuite, CipherSuiteProvider, Curve25519ChaChaBlake3};
pub use types::{
    HpkeCiphertext, HpkeKeyPair, HpkePrivateKey, HpkePublicKey, Nonce, Secret,
    SignaturePrivateKey, SignaturePublicKey,
};

/// Prefix prepended to every protocol label before it is hashed, signed or
/// fed to a KDF.
pub const LABEL_PREFIX: &str = "MLS 1.0 ";

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// AEAD decryption failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    AeadEncryption,

    /// HPKE open failed.
    #[error("HPKE decryption failed")]
    HpkeDecryption,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A labelled structure could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] canopy_codec::CodecError),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
