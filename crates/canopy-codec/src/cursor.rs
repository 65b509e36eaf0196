//! Read cursor over a borrowed byte slice.

use crate::{CodecError, Result};

/// A forward-only reader over encoded bytes.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEnd {
                needed: len - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Take exactly `N` bytes as an array.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Look at the next byte without consuming it.
    pub fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(CodecError::UnexpectedEnd { needed: 1 })
    }

    /// Split off a sub-cursor over the next `len` bytes.
    pub fn sub_cursor(&mut self, len: usize) -> Result<Cursor<'a>> {
        Ok(Cursor::new(self.take(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_advances() {
        let mut cursor = Cursor::new(&[1, 2, 3, 4]);
        assert_eq!(cursor.take(2).expect("take"), &[1, 2]);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.peek().expect("peek"), 3);
        assert_eq!(cursor.take_array::<2>().expect("take"), [3, 4]);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_take_past_end_fails() {
        let mut cursor = Cursor::new(&[1, 2]);
        assert_eq!(
            cursor.take(5),
            Err(CodecError::UnexpectedEnd { needed: 3 })
        );
        // A failed take consumes nothing.
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn test_peek_empty() {
        let cursor = Cursor::new(&[]);
        assert!(cursor.peek().is_err());
    }
}
