//! Protobuf-style base-128 varints used by the tagged message bodies.

use crate::errors::{ProtocolError, Result};

/// Longest encoding of a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

/// Number of bytes [`write_varint`] emits for `value`.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Append the varint encoding of `value`.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decode a varint from the front of `input`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_varint(input: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;

    for (i, &byte) in input.iter().take(MAX_VARINT_LEN).enumerate() {
        let bits = u64::from(byte & 0x7F);
        let shift = 7 * i as u32;

        // The tenth byte may only contribute the single remaining bit
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(ProtocolError::MalformedVarint);
        }

        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(ProtocolError::MalformedVarint)
}
