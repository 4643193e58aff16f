//! Variable-length integer encoding utilities.
//!
//! Integers are written 7 bits per byte, least significant group first, with
//! the high bit of each byte flagging a continuation. Every block, FST node
//! and postings tail in this crate uses this encoding.

use std::io::Write;

use crate::error::{QuiverError, Result};

/// Maximum encoded length of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the variable-length encoding of `value` to `buf`.
pub fn push_u64(buf: &mut Vec<u8>, value: u64) {
    let mut val = value;
    loop {
        let byte = (val & 0x7F) as u8;
        val >>= 7;
        if val == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Append the variable-length encoding of `value` to `buf`.
pub fn push_u32(buf: &mut Vec<u8>, value: u32) {
    push_u64(buf, value as u64);
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoded_len(value));
    push_u64(&mut bytes, value);
    bytes
}

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a u64 value from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(QuiverError::corruption("varint", "VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(QuiverError::corruption("varint", "Incomplete VarInt"))
}

/// Decode a u32 value from the start of `bytes`.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, len) = decode_u64(bytes)?;
    let value = u32::try_from(value)
        .map_err(|_| QuiverError::corruption("varint", "VarInt exceeds 32 bits"))?;
    Ok((value, len))
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let mut bytes = [0u8; MAX_VARINT_LEN];
    let mut val = value;
    let mut len = 0;
    loop {
        let byte = (val & 0x7F) as u8;
        val >>= 7;
        if val == 0 {
            bytes[len] = byte;
            len += 1;
            break;
        }
        bytes[len] = byte | 0x80;
        len += 1;
    }
    writer.write_all(&bytes[..len])?;
    Ok(len)
}
