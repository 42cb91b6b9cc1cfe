use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default value for `polling_interval_ms` in [`ProverConfig`].
const DEFAULT_POLLING_INTERVAL_MS: u64 = 5_000;

/// Gas limit of code deployments and of every transitioner write except `applyTransaction`.
const DEFAULT_DEPLOY_GAS_LIMIT: u64 = 4_000_000;

/// Gas limit of `applyTransaction`.
const DEFAULT_RUN_GAS_LIMIT: u64 = 9_500_000;

/// Rollup block number of state root `0`.
const DEFAULT_L2_BLOCK_OFFSET: u64 = 1;

const DEFAULT_MAX_STALLED_ROUNDS: u32 = 8;

/// Settings of the detect and dispute loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    #[serde(default = "default_deploy_gas_limit")]
    pub deploy_gas_limit: u64,

    #[serde(default = "default_run_gas_limit")]
    pub run_gas_limit: u64,

    /// First state root index checked after startup.
    #[serde(default)]
    pub from_l2_transaction_index: u64,

    /// Distance between a state root index and the rollup block that produced it.
    #[serde(default = "default_l2_block_offset")]
    pub l2_block_offset: u64,

    /// Whether rebuilt tries must hash to the published pre-state root before any write.
    #[serde(default = "default_verify_trie_roots")]
    pub verify_trie_roots: bool,

    /// Commit rounds without progress tolerated before a dispute is abandoned.
    #[serde(default = "default_max_stalled_rounds")]
    pub max_stalled_rounds: u32,
}

impl ProverConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            deploy_gas_limit: DEFAULT_DEPLOY_GAS_LIMIT,
            run_gas_limit: DEFAULT_RUN_GAS_LIMIT,
            from_l2_transaction_index: 0,
            l2_block_offset: DEFAULT_L2_BLOCK_OFFSET,
            verify_trie_roots: true,
            max_stalled_rounds: DEFAULT_MAX_STALLED_ROUNDS,
        }
    }
}

fn default_polling_interval_ms() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

fn default_deploy_gas_limit() -> u64 {
    DEFAULT_DEPLOY_GAS_LIMIT
}

fn default_run_gas_limit() -> u64 {
    DEFAULT_RUN_GAS_LIMIT
}

fn default_l2_block_offset() -> u64 {
    DEFAULT_L2_BLOCK_OFFSET
}

fn default_verify_trie_roots() -> bool {
    true
}

fn default_max_stalled_rounds() -> u32 {
    DEFAULT_MAX_STALLED_ROUNDS
}
