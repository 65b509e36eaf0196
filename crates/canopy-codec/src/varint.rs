//! Variable-length integer prefix (RFC 9420, Section 2.1.2).
//!
//! ```text
//! prefix  length  usable bits
//!   00      1         6
//!   01      2        14
//!   10      4        30
//!   11      -     invalid
//! ```

use crate::{CodecError, Cursor, Result};

/// Largest value representable in a varint.
pub const MAX_VARINT: usize = (1 << 30) - 1;

/// Append `value` as a minimally-encoded varint.
///
/// # Errors
///
/// Returns [`CodecError::LengthOverflow`] if `value` exceeds [`MAX_VARINT`].
pub fn write(buf: &mut Vec<u8>, value: usize) -> Result<()> {
    if value < 1 << 6 {
        buf.push(value as u8);
    } else if value < 1 << 14 {
        buf.extend_from_slice(&((value as u16) | 0x4000).to_be_bytes());
    } else if value <= MAX_VARINT {
        buf.extend_from_slice(&((value as u32) | 0x8000_0000).to_be_bytes());
    } else {
        return Err(CodecError::LengthOverflow(value));
    }
    Ok(())
}

/// Read a varint, rejecting the reserved prefix and non-minimal encodings.
pub fn read(cursor: &mut Cursor<'_>) -> Result<usize> {
    let first = cursor.peek()?;
    let (len, value) = match first >> 6 {
        0 => {
            let [b] = cursor.take_array::<1>()?;
            (1, usize::from(b))
        }
        1 => {
            let bytes = cursor.take_array::<2>()?;
            (2, usize::from(u16::from_be_bytes(bytes) & 0x3FFF))
        }
        2 => {
            let bytes = cursor.take_array::<4>()?;
            (4, (u32::from_be_bytes(bytes) & 0x3FFF_FFFF) as usize)
        }
        _ => {
            return Err(CodecError::InvalidVarint(format!(
                "reserved prefix in byte {first:#04x}"
            )))
        }
    };

    let minimal = match len {
        1 => true,
        2 => value >= 1 << 6,
        _ => value >= 1 << 14,
    };
    if !minimal {
        return Err(CodecError::InvalidVarint(format!(
            "value {value} not minimally encoded in {len} bytes"
        )));
    }
    Ok(value)
}
