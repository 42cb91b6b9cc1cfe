//! Sparse Merkle-Patricia Trie rebuilt from `eth_getProof` style node lists.
//!
//! The tries built here hold only the nodes a proof opened. They are enough to read, update
//! and re-prove the touched keys, and they hash to the same root as the full trie.

use alloy_primitives::{b256, keccak256, B256};

mod account;
mod error;
mod nibbles;
mod node;

pub use account::StateAccount;
pub use error::Error;
pub use node::MptNode;

/// Root hash of an empty trie: `keccak256(rlp(""))`.
pub const EMPTY_ROOT: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Hash of empty code: `keccak256("")`.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Keccak-256, the hash used for secure trie keys.
pub fn keccak(data: impl AsRef<[u8]>) -> B256 {
    keccak256(data)
}
