//! State diff proofs served by the rollup node.

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Deserializer};

use crate::codec::{from_hex, to_bytes32};

/// Merkle proof of one storage slot of an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageStateProof {
    #[serde(deserialize_with = "deserialize_word")]
    pub key: B256,
    pub value: U256,
    pub proof: Vec<Bytes>,
}

/// Merkle proof of one account, plus proofs of every storage slot it touched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStateProof {
    pub address: Address,
    pub account_proof: Vec<Bytes>,
    pub balance: U256,
    pub code_hash: B256,
    pub nonce: U64,
    pub storage_hash: B256,
    #[serde(default)]
    pub storage_proof: Vec<StorageStateProof>,
}

/// Result of `eth_getStateDiffProof` for one rollup block.
///
/// `account_state_proofs` is optional because nodes that have not finished indexing omit the
/// field entirely. Consumers must treat `None` as "not available yet".
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateDiffProof {
    #[serde(default)]
    pub header: serde_json::Value,
    #[serde(rename = "accounts", default)]
    pub account_state_proofs: Option<Vec<AccountStateProof>>,
}

/// Accepts hex words of any length up to 32 bytes, left padding short ones.
fn deserialize_word<'de, D: Deserializer<'de>>(de: D) -> Result<B256, D::Error> {
    let s = String::deserialize(de)?;
    let bytes = from_hex(&s).map_err(serde::de::Error::custom)?;
    to_bytes32(&bytes).map_err(serde::de::Error::custom)
}
