//! # canopy-codec
//!
//! Byte-exact encoding for the MLS presentation language (RFC 9420, Section 2.1).
//!
//! Every struct that crosses the wire or feeds a hash, signature or KDF in
//! Canopy is encoded through the [`Codec`] trait defined here. Field order is
//! part of the contract: implementations encode fields in declaration order
//! and decode them back in the same order.
//!
//! ## Wire rules
//!
//! ```text
//! uintN        big-endian, N/8 bytes
//! opaque<V>    varint(len) || bytes
//! T<V>         varint(total encoded byte length) || T || T || ...
//! optional<T>  0x00 | 0x01 || T
//! ```
//!
//! The variable-length prefix is the QUIC-style varint from RFC 9000,
//! restricted to 30 bits and required to use the minimum encoding.

mod cursor;
mod primitives;
pub mod varint;

pub use cursor::Cursor;
pub use primitives::{read_opaque, write_opaque};

/// Error types for encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input ended before the value was complete.
    #[error("unexpected end of input: needed {needed} more bytes")]
    UnexpectedEnd { needed: usize },

    /// Bytes were left over after decoding a complete value.
    #[error("trailing data: {remaining} bytes left after decoding")]
    TrailingData { remaining: usize },

    /// A varint length prefix was malformed or not minimally encoded.
    #[error("invalid varint: {0}")]
    InvalidVarint(String),

    /// A length does not fit in a 30-bit varint.
    #[error("length {0} exceeds the varint range")]
    LengthOverflow(usize),

    /// A field held a value outside its enumerated range.
    #[error("invalid value {value} for {type_name}")]
    InvalidValue { type_name: &'static str, value: u64 },
}

/// Convenience result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// A value with a canonical wire encoding.
pub trait Codec: Sized {
    /// Append the encoding of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a value from the front of `cursor`, advancing it.
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self>;

    /// Encode into a fresh buffer.
    fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a value that must span all of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingData`] if bytes remain after the value.
    fn decode_exact(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let value = Self::decode(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(CodecError::TrailingData {
                remaining: cursor.remaining(),
            });
        }
        Ok(value)
    }
}
