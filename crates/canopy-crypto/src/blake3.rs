//! Domain-separated BLAKE3 hashing and the KDF built on it.
//!
//! BLAKE3 provides every hash-family primitive of the Canopy suite.
//! Cross-purpose collisions are prevented by BLAKE3's derive-key mode: each
//! purpose has one registered context string, and raw secrets are never used
//! as keyed-hash keys directly.
//!
//! ## Primitives
//!
//! - [`hash`]: `Hash` for tree hashes, parent hashes, transcript hashes
//! - [`mac`]: `MAC` (keyed hash under a derived key)
//! - [`extract`]: HKDF-Extract analogue
//! - [`expand`]: HKDF-Expand analogue (keyed XOF)

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const MAC_KEY: &str = "Canopy v1 mac-key";
    pub const EXTRACT_SALT: &str = "Canopy v1 extract-salt";
    pub const EXPAND_KEY: &str = "Canopy v1 expand-key";
    pub const HPKE_SHARED_SECRET: &str = "Canopy v1 hpke-shared-secret";
    pub const HPKE_KEY: &str = "Canopy v1 hpke-key";
    pub const HPKE_NONCE: &str = "Canopy v1 hpke-nonce";
    pub const HPKE_EXPORT: &str = "Canopy v1 hpke-export";
    pub const HPKE_DERIVE_KEY_PAIR: &str = "Canopy v1 hpke-derive-key-pair";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[
        MAC_KEY,
        EXTRACT_SALT,
        EXPAND_KEY,
        HPKE_SHARED_SECRET,
        HPKE_KEY,
        HPKE_NONCE,
        HPKE_EXPORT,
        HPKE_DERIVE_KEY_PAIR,
    ];
}

/// Output length of every fixed-size BLAKE3 primitive.
pub const OUTPUT_LEN: usize = 32;

/// Compute the BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a key using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string from [`contexts`]
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Compute a keyed BLAKE3 hash.
pub fn keyed_hash(key: &[u8; 32], message: &[u8]) -> [u8; 32] {
    *::blake3::keyed_hash(key, message).as_bytes()
}

/// MAC over `message` under an arbitrary-length `key`.
pub fn mac(key: &[u8], message: &[u8]) -> [u8; 32] {
    keyed_hash(&derive_key(contexts::MAC_KEY, key), message)
}

/// Extract a pseudorandom key from `ikm` using `salt`.
pub fn extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    keyed_hash(&derive_key(contexts::EXTRACT_SALT, salt), ikm)
}

/// Expand `prk` into `output.len()` bytes bound to `info`.
pub fn expand(prk: &[u8], info: &[u8], output: &mut [u8]) {
    let mut hasher = ::blake3::Hasher::new_keyed(&derive_key(contexts::EXPAND_KEY, prk));
    hasher.update(info);
    hasher.finalize_xof().fill(output);
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_context_strings_prefixed() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(
                ctx.starts_with("Canopy v1 "),
                "Context string '{ctx}' has wrong prefix"
            );
        }
    }

    #[test]
    fn test_hash_matches_reference() {
        // BLAKE3 of the empty input.
        assert_eq!(
            hash(b""),
            hex_literal::hex!("af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262")
        );
    }

    #[test]
    fn test_derive_key_different_contexts() {
        let key1 = derive_key(contexts::MAC_KEY, &[0u8; 32]);
        let key2 = derive_key(contexts::EXTRACT_SALT, &[0u8; 32]);
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_mac_depends_on_key() {
        assert_ne!(mac(b"key-a", b"msg"), mac(b"key-b", b"msg"));
        assert_eq!(mac(b"key-a", b"msg"), mac(b"key-a", b"msg"));
    }

    #[test]
    fn test_extract_argument_order_matters() {
        assert_ne!(extract(b"salt", b"ikm"), extract(b"ikm", b"salt"));
    }

    #[test]
    fn test_expand_prefix_stable() {
        let mut short = [0u8; 16];
        let mut long = [0u8; 64];
        expand(b"prk", b"info", &mut short);
        expand(b"prk", b"info", &mut long);
        assert_eq!(short, long[..16]);

        let mut other = [0u8; 16];
        expand(b"prk", b"other info", &mut other);
        assert_ne!(short, other);
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
    }

    #[test]
    fn test_is_registered_context() {
        assert!(is_registered_context("Canopy v1 hpke-key"));
        assert!(!is_registered_context("Canopy v1 made-up-context"));
    }
}
