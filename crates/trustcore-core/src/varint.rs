//! Unsigned LEB128 varints and a small cursor for fixed-layout decoding.
//!
//! Blocks and encrypted payloads both start with varint-encoded fields, so
//! the codec lives here and is shared with the protect crate.

use crate::error::CoreError;

/// Longest valid encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Append `n` as a varint.
pub fn encode_to(buf: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        buf.push((n as u8) | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
}

/// Encode `n` as a fresh varint buffer.
pub fn encode(n: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    encode_to(&mut buf, n);
    buf
}

/// Number of bytes `n` takes once encoded.
pub fn encoded_len(n: u64) -> usize {
    let mut len = 1;
    let mut n = n >> 7;
    while n > 0 {
        len += 1;
        n >>= 7;
    }
    len
}

/// Decode a varint from the start of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        let low = u64::from(byte & 0x7f);
        let shift = 7 * i as u32;
        if shift == 63 && low > 1 {
            return None;
        }
        value |= low << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Sequential reader over a byte slice.
///
/// Every read names the field it is reading so that decode errors identify
/// which part of a record was truncated.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn varint(&mut self, field: &'static str) -> Result<u64, CoreError> {
        let rest = &self.bytes[self.pos..];
        if rest.is_empty() {
            return Err(CoreError::Truncated { field });
        }
        let (value, len) = decode(rest).ok_or(CoreError::InvalidVarint { field })?;
        self.pos += len;
        Ok(value)
    }

    pub fn bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CoreError> {
        if self.remaining() < len {
            return Err(CoreError::Truncated { field });
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CoreError> {
        let slice = self.bytes(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn byte(&mut self, field: &'static str) -> Result<u8, CoreError> {
        Ok(self.array::<1>(field)?[0])
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Fail if anything is left after the last field.
    pub fn finish(self, context: &'static str) -> Result<(), CoreError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(CoreError::TrailingBytes { context, count }),
        }
    }
}
