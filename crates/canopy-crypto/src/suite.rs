//! Cipher suite identifiers and the provider capability.
//!
//! [`CipherSuiteProvider`] is the only way the MLS layer reaches
//! cryptography. Operations that need a suite take a provider as an ordinary
//! argument; nothing is looked up implicitly.
//!
//! ## Labelled inputs
//!
//! ```text
//! struct { uint16 length; opaque label<V>; opaque context<V>; } KDFLabel;
//! struct { opaque label<V>; opaque content<V>; }                SignContent;
//! struct { opaque label<V>; opaque context<V>; }                EncryptContext;
//! struct { opaque label<V>; opaque value<V>; }                  RefHashInput;
//! ```
//!
//! Every `label` is [`LABEL_PREFIX`] followed by the caller's label, except
//! `RefHashInput`, whose labels already carry the prefix.

use canopy_codec::{write_opaque, Codec, CodecError, Cursor};
use serde::{Deserialize, Serialize};

use crate::blake3;
use crate::chacha20;
use crate::ed25519;
use crate::hpke;
use crate::types::{
    HpkeCiphertext, HpkeKeyPair, HpkePrivateKey, HpkePublicKey, Nonce, Secret,
    SignaturePrivateKey, SignaturePublicKey,
};
use crate::{CryptoError, Result, LABEL_PREFIX};

/// Registered cipher suite identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherSuite {
    /// X25519 / ChaCha20-Poly1305 / BLAKE3 / Ed25519 (private-use code point).
    X25519ChaCha20Poly1305Blake3Ed25519,
}

impl CipherSuite {
    /// Wire code point.
    pub fn code(&self) -> u16 {
        match self {
            Self::X25519ChaCha20Poly1305Blake3Ed25519 => 0xF0A1,
        }
    }

    /// Look up a suite by code point. `0x0000` is reserved.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0xF0A1 => Some(Self::X25519ChaCha20Poly1305Blake3Ed25519),
            _ => None,
        }
    }
}

impl Codec for CipherSuite {
    fn encode(&self, buf: &mut Vec<u8>) -> canopy_codec::Result<()> {
        self.code().encode(buf)
    }

    fn decode(cursor: &mut Cursor<'_>) -> canopy_codec::Result<Self> {
        let code = u16::decode(cursor)?;
        Self::from_code(code).ok_or(CodecError::InvalidValue {
            type_name: "CipherSuite",
            value: u64::from(code),
        })
    }
}

/// Cryptographic capabilities of one cipher suite.
///
/// Implementations are stateless and safe to share across threads. Every
/// failure is a typed [`CryptoError`]; no method returns partial output.
pub trait CipherSuiteProvider: Send + Sync {
    /// The suite this provider implements.
    fn suite(&self) -> CipherSuite;

    /// Output length of [`hash`](Self::hash) and KDF secrets (`Nh`).
    fn hash_len(&self) -> usize;

    /// AEAD key length (`Nk`).
    fn key_len(&self) -> usize;

    /// AEAD nonce length (`Nn`).
    fn nonce_len(&self) -> usize;

    fn hash(&self, data: &[u8]) -> Vec<u8>;

    fn mac(&self, key: &Secret, data: &[u8]) -> Vec<u8>;

    /// `Extract(salt, ikm)`.
    fn extract(&self, salt: &Secret, ikm: &Secret) -> Secret;

    /// `ExpandWithLabel(secret, label, context, length)`.
    fn expand_with_label(
        &self,
        secret: &Secret,
        label: &str,
        context: &[u8],
        length: u16,
    ) -> Result<Secret>;

    /// `DeriveSecret(secret, label) = ExpandWithLabel(secret, label, "", Nh)`.
    fn derive_secret(&self, secret: &Secret, label: &str) -> Result<Secret> {
        let length = u16::try_from(self.hash_len())
            .map_err(|_| CryptoError::InvalidInput("hash length exceeds u16".into()))?;
        self.expand_with_label(secret, label, &[], length)
    }

    /// `RefHash(label, value) = Hash(RefHashInput)`.
    fn ref_hash(&self, label: &str, value: &[u8]) -> Result<Vec<u8>> {
        let mut input = Vec::new();
        write_opaque(&mut input, label.as_bytes())?;
        write_opaque(&mut input, value)?;
        Ok(self.hash(&input))
    }

    fn sign_with_label(
        &self,
        key: &SignaturePrivateKey,
        label: &str,
        content: &[u8],
    ) -> Result<Vec<u8>>;

    fn verify_with_label(
        &self,
        key: &SignaturePublicKey,
        label: &str,
        content: &[u8],
        signature: &[u8],
    ) -> Result<()>;

    /// `EncryptWithLabel(public_key, label, context, plaintext)`.
    fn seal_with_label(
        &self,
        public_key: &HpkePublicKey,
        label: &str,
        context: &[u8],
        plaintext: &[u8],
    ) -> Result<HpkeCiphertext>;

    /// `DecryptWithLabel(private_key, label, context, ciphertext)`.
    fn open_with_label(
        &self,
        private_key: &HpkePrivateKey,
        label: &str,
        context: &[u8],
        ciphertext: &HpkeCiphertext,
    ) -> Result<Vec<u8>>;

    /// [`open_with_label`](Self::open_with_label) taking a full key pair.
    fn open_with_label_key_pair(
        &self,
        key_pair: &HpkeKeyPair,
        label: &str,
        context: &[u8],
        ciphertext: &HpkeCiphertext,
    ) -> Result<Vec<u8>> {
        self.open_with_label(&key_pair.private_key, label, context, ciphertext)
    }

    fn encrypt_aead(&self, key: &Secret, nonce: &Nonce, aad: &[u8], plaintext: &[u8])
        -> Result<Vec<u8>>;

    fn decrypt_aead(
        &self,
        key: &Secret,
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// One-shot secret agreement with the holder of `public_key`.
    /// Returns `(kem_output, secret)`.
    fn export(&self, public_key: &HpkePublicKey, info: &str) -> Result<(Vec<u8>, Secret)>;

    /// Recompute an exported secret from the recipient's key pair.
    fn export_with(&self, kem_output: &[u8], key_pair: &HpkeKeyPair, info: &str)
        -> Result<Secret>;

    fn generate_hpke_key_pair(&self) -> HpkeKeyPair;

    /// `DeriveKeyPair(ikm)`.
    fn derive_hpke_key_pair(&self, ikm: &Secret) -> HpkeKeyPair;

    /// Returns `(private_key, public_key)`.
    fn generate_signature_key_pair(&self) -> (SignaturePrivateKey, SignaturePublicKey);

    fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// A fresh random nonce of `len` bytes (PSK nonces use `hash_len`).
    fn generate_nonce(&self, len: usize) -> Nonce {
        Nonce::new(self.random_bytes(len))
    }
}

fn labelled(label: &str) -> Vec<u8> {
    let mut full = Vec::with_capacity(LABEL_PREFIX.len() + label.len());
    full.extend_from_slice(LABEL_PREFIX.as_bytes());
    full.extend_from_slice(label.as_bytes());
    full
}

/// Encode `struct { opaque label<V>; opaque data<V>; }` with a prefixed label.
fn labelled_pair(label: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_opaque(&mut out, &labelled(label))?;
    write_opaque(&mut out, data)?;
    Ok(out)
}

/// Encode a `KDFLabel`.
pub fn kdf_label(label: &str, context: &[u8], length: u16) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    length.encode(&mut out)?;
    out.extend_from_slice(&labelled_pair(label, context)?);
    Ok(out)
}

/// The X25519 / ChaCha20-Poly1305 / BLAKE3 / Ed25519 suite.
#[derive(Clone, Copy, Debug, Default)]
pub struct Curve25519ChaChaBlake3;

impl CipherSuiteProvider for Curve25519ChaChaBlake3 {
    fn suite(&self) -> CipherSuite {
        CipherSuite::X25519ChaCha20Poly1305Blake3Ed25519
    }

    fn hash_len(&self) -> usize {
        blake3::OUTPUT_LEN
    }

    fn key_len(&self) -> usize {
        chacha20::KEY_SIZE
    }

    fn nonce_len(&self) -> usize {
        chacha20::NONCE_SIZE
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).to_vec()
    }

    fn mac(&self, key: &Secret, data: &[u8]) -> Vec<u8> {
        blake3::mac(key.as_bytes(), data).to_vec()
    }

    fn extract(&self, salt: &Secret, ikm: &Secret) -> Secret {
        Secret::new(blake3::extract(salt.as_bytes(), ikm.as_bytes()).to_vec())
    }

    fn expand_with_label(
        &self,
        secret: &Secret,
        label: &str,
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        let info = kdf_label(label, context, length)?;
        let mut out = vec![0u8; usize::from(length)];
        blake3::expand(secret.as_bytes(), &info, &mut out);
        Ok(Secret::new(out))
    }

    fn sign_with_label(
        &self,
        key: &SignaturePrivateKey,
        label: &str,
        content: &[u8],
    ) -> Result<Vec<u8>> {
        let signing_key = ed25519::SigningKey::from_slice(key.as_bytes())?;
        Ok(signing_key.sign(&labelled_pair(label, content)?).to_vec())
    }

    fn verify_with_label(
        &self,
        key: &SignaturePublicKey,
        label: &str,
        content: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        ed25519::verify(key.as_bytes(), &labelled_pair(label, content)?, signature)
    }

    fn seal_with_label(
        &self,
        public_key: &HpkePublicKey,
        label: &str,
        context: &[u8],
        plaintext: &[u8],
    ) -> Result<HpkeCiphertext> {
        let info = labelled_pair(label, context)?;
        hpke::seal(public_key.as_bytes(), &info, &[], plaintext)
    }

    fn open_with_label(
        &self,
        private_key: &HpkePrivateKey,
        label: &str,
        context: &[u8],
        ciphertext: &HpkeCiphertext,
    ) -> Result<Vec<u8>> {
        let info = labelled_pair(label, context)?;
        hpke::open(private_key.as_bytes(), &info, &[], ciphertext)
    }

    fn encrypt_aead(
        &self,
        key: &Secret,
        nonce: &Nonce,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        chacha20::encrypt(key.as_bytes(), nonce.as_bytes(), aad, plaintext)
    }

    fn decrypt_aead(
        &self,
        key: &Secret,
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        chacha20::decrypt(key.as_bytes(), nonce.as_bytes(), aad, ciphertext)
    }

    fn export(&self, public_key: &HpkePublicKey, info: &str) -> Result<(Vec<u8>, Secret)> {
        let (kem_output, secret) = hpke::export(public_key.as_bytes(), info.as_bytes())?;
        Ok((kem_output, Secret::new(secret.to_vec())))
    }

    fn export_with(
        &self,
        kem_output: &[u8],
        key_pair: &HpkeKeyPair,
        info: &str,
    ) -> Result<Secret> {
        let secret = hpke::export_with(kem_output, key_pair.private_key.as_bytes(), info.as_bytes())?;
        Ok(Secret::new(secret.to_vec()))
    }

    fn generate_hpke_key_pair(&self) -> HpkeKeyPair {
        let ikm = Secret::new(self.random_bytes(32));
        self.derive_hpke_key_pair(&ikm)
    }

    fn derive_hpke_key_pair(&self, ikm: &Secret) -> HpkeKeyPair {
        let (private_key, public_key) = hpke::derive_key_pair(ikm.as_bytes());
        HpkeKeyPair {
            private_key: HpkePrivateKey::new(private_key.to_vec()),
            public_key: HpkePublicKey::new(public_key.to_vec()),
        }
    }

    fn generate_signature_key_pair(&self) -> (SignaturePrivateKey, SignaturePublicKey) {
        let key = ed25519::SigningKey::generate();
        (
            SignaturePrivateKey::new(key.to_bytes().to_vec()),
            SignaturePublicKey::new(key.verifying_key_bytes().to_vec()),
        )
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut out);
        out
    }
}
