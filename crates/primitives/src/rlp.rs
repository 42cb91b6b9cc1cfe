//! RLP helpers for proof payloads submitted to the dispute contracts.

use alloy_primitives::{Bytes, B256, U256};
use alloy_rlp::{Encodable, Header};

use crate::codec::strip_leading_zeros;

/// Encodes a list of trie nodes the way the verifier's `Lib_RLPReader` expects them.
pub fn encode_proof_nodes(nodes: &[Bytes]) -> Bytes {
    let payload_length = nodes.iter().map(Encodable::length).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for node in nodes {
        node.encode(&mut out);
    }
    out.into()
}

/// Trie value of a storage slot: the RLP string of the word without leading zeros.
pub fn encode_storage_value(value: B256) -> Bytes {
    let stripped = strip_leading_zeros(value.as_slice());
    alloy_rlp::encode(Bytes::copy_from_slice(stripped)).into()
}

/// Same as [`encode_storage_value`] for a numeric slot value.
pub fn encode_storage_uint(value: U256) -> Bytes {
    encode_storage_value(B256::from(value))
}

/// Init code that deploys the bytes appended to it verbatim.
///
/// `PUSH1 0x0D; CODESIZE; SUB; DUP1; PUSH1 0x0D; PUSH1 0; CODECOPY; PUSH1 0; RETURN` copies
/// everything after the 13-byte prefix into memory and returns it as runtime code, so
/// the constructor runs none of the payload.
pub const CODE_COPIER_PREFIX: [u8; 13] = [
    0x60, 0x0D, 0x38, 0x03, 0x80, 0x60, 0x0D, 0x60, 0x00, 0x39, 0x60, 0x00, 0xf3,
];

/// Wraps runtime code in the copier prefix.
pub fn copier_init_code(runtime: &[u8]) -> Bytes {
    let mut code = Vec::with_capacity(CODE_COPIER_PREFIX.len() + runtime.len());
    code.extend_from_slice(&CODE_COPIER_PREFIX);
    code.extend_from_slice(runtime);
    code.into()
}
