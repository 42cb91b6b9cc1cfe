//! Fixed-width big-endian codec and hex helpers.
//!
//! Every numeric field carried on the wire has a declared byte width. Encoding a value that
//! does not fit its width is an error rather than a silent truncation.

use alloy_primitives::{B256, U256};

use crate::errors::CodecError;

/// Maximum width, in bytes, of any fixed-width field.
pub const MAX_WIDTH: usize = 32;

/// Encodes `value` as exactly `width` big-endian bytes.
pub fn encode_uint(value: U256, width: usize) -> Result<Vec<u8>, CodecError> {
    if width > MAX_WIDTH {
        return Err(CodecError::WidthTooLarge(width));
    }

    let full: [u8; 32] = value.to_be_bytes();
    let (head, tail) = full.split_at(MAX_WIDTH - width);
    if head.iter().any(|b| *b != 0) {
        return Err(CodecError::Overflow { value, width });
    }

    Ok(tail.to_vec())
}

/// Decodes a big-endian unsigned integer of at most 32 bytes.
pub fn decode_uint(bytes: &[u8]) -> Result<U256, CodecError> {
    if bytes.len() > MAX_WIDTH {
        return Err(CodecError::WidthTooLarge(bytes.len()));
    }
    Ok(U256::from_be_slice(bytes))
}

/// Reads a `width`-byte big-endian integer at `offset`.
pub fn read_uint(buf: &[u8], offset: usize, width: usize) -> Result<U256, CodecError> {
    let slice = read_bytes(buf, offset, width)?;
    decode_uint(slice)
}

/// Reads a `width`-byte integer that must also fit in a `u64`.
pub fn read_u64(buf: &[u8], offset: usize, width: usize) -> Result<u64, CodecError> {
    let value = read_uint(buf, offset, width)?;
    u64::try_from(value).map_err(|_| CodecError::Overflow { value, width: 8 })
}

/// Returns `buf[offset..offset + len]`, failing instead of panicking on short input.
pub fn read_bytes(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    let end = offset
        .checked_add(len)
        .ok_or(CodecError::OutOfBounds { offset, len, available: buf.len() })?;
    buf.get(offset..end)
        .ok_or(CodecError::OutOfBounds { offset, len, available: buf.len() })
}

/// Left pads `bytes` into a 32-byte word.
pub fn to_bytes32(bytes: &[u8]) -> Result<B256, CodecError> {
    if bytes.len() > MAX_WIDTH {
        return Err(CodecError::WidthTooLarge(bytes.len()));
    }
    Ok(B256::left_padding_from(bytes))
}

/// Drops leading zero bytes. Zero becomes the empty slice.
pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Hex encodes with the canonical `0x` prefix.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without a `0x` prefix.
pub fn from_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    if body.len() % 2 != 0 {
        return Err(CodecError::OddHexLength(s.len()));
    }
    hex::decode(body).map_err(|e| CodecError::InvalidHex(e.to_string()))
}
