use alloy_primitives::{B256, U256};
use alloy_rlp_derive::{RlpDecodable, RlpEncodable};

use crate::{EMPTY_ROOT, KECCAK_EMPTY};

/// Account record stored as a leaf of the state trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StateAccount {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl Default for StateAccount {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT,
            code_hash: KECCAK_EMPTY,
        }
    }
}
