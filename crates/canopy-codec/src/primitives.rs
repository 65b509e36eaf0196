//! Codec implementations for integers, optionals, vectors and opaque bytes.

use crate::{varint, Codec, CodecError, Cursor, Result};

macro_rules! impl_uint {
    ($($ty:ty),*) => {
        $(
            impl Codec for $ty {
                fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
                    buf.extend_from_slice(&self.to_be_bytes());
                    Ok(())
                }

                fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
                    Ok(<$ty>::from_be_bytes(cursor.take_array()?))
                }
            }
        )*
    };
}

impl_uint!(u8, u16, u32, u64);

impl<T: Codec> Codec for Option<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            None => buf.push(0),
            Some(value) => {
                buf.push(1);
                value.encode(buf)?;
            }
        }
        Ok(())
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        match u8::decode(cursor)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(cursor)?)),
            other => Err(CodecError::InvalidValue {
                type_name: "optional presence",
                value: u64::from(other),
            }),
        }
    }
}

impl<T: Codec> Codec for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        for item in self {
            item.encode(&mut body)?;
        }
        varint::write(buf, body.len())?;
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let len = varint::read(cursor)?;
        let mut body = cursor.sub_cursor(len)?;
        let mut items = Vec::new();
        while !body.is_empty() {
            items.push(T::decode(&mut body)?);
        }
        Ok(items)
    }
}

/// Append `bytes` as `opaque<V>`.
pub fn write_opaque(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    varint::write(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Read an `opaque<V>` value.
pub fn read_opaque(cursor: &mut Cursor<'_>) -> Result<Vec<u8>> {
    let len = varint::read(cursor)?;
    Ok(cursor.take(len)?.to_vec())
}
