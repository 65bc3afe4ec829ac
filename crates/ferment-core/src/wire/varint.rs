//! Base-128 variable-length integers.
//!
//! Each byte carries 7 payload bits, least significant group first, with the
//! high bit set on every byte except the last. Signed values are written
//! through their two's-complement bit pattern (no zigzag), so any negative
//! value takes the full 10 bytes.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Longest possible encoding of a 64-bit value
pub const MAX_VARINT_LEN: usize = 10;

const DATA_BITS_MASK: u8 = 0x7F;
const CONTINUATION_BIT_MASK: u8 = 0x80;

/// Encode a varint into the buffer.
pub fn encode_varint(mut value: u64, buf: &mut impl BufMut) {
    while value >= u64::from(CONTINUATION_BIT_MASK) {
        buf.put_u8((value as u8 & DATA_BITS_MASK) | CONTINUATION_BIT_MASK);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes [`encode_varint`] writes for `value`.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Offsets in
/// errors are relative to `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(Error::malformed_varint(0));
        }
        // The 10th byte holds only bit 63.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(Error::malformed_varint(0));
        }

        result |= u64::from(byte & DATA_BITS_MASK) << shift;
        shift += 7;

        if byte & CONTINUATION_BIT_MASK == 0 {
            return Ok((result, i + 1));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        return Err(Error::malformed_varint(0));
    }
    Err(Error::truncated(0, data.len() + 1, data.len()))
}
