//! Errors from encoding and decoding primitives.

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("value {value} does not fit in {width} bytes")]
    Overflow { value: U256, width: usize },

    #[error("field width {0} exceeds 32 bytes")]
    WidthTooLarge(usize),

    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("hex string has odd length {0}")]
    OddHexLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("calldata too short for selector")]
    MissingSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("cannot build a merkle tree with no leaves")]
    EmptyTree,

    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("unknown transition phase {0}")]
    Unknown(u8),
}
