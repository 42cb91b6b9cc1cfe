//! Config file loading and `-o` overrides.

use std::{fs, path::PathBuf, time::Duration};

use alloy_primitives::Address;
use ovm_dispute::ProverConfig;
use ovm_ledger::ScanSettings;
use serde::Deserialize;
use toml::value::{Table, Value};

use crate::{
    args::{Args, EnvArgs},
    errors::{ConfigError, InitError},
};

const DEFAULT_LOG_PAGE_SIZE: u64 = 2000;
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_CONNECT_RETRY_DELAY_MS: u64 = 1000;

fn default_log_page_size() -> u64 {
    DEFAULT_LOG_PAGE_SIZE
}

fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

fn default_connect_retry_delay_ms() -> u64 {
    DEFAULT_CONNECT_RETRY_DELAY_MS
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BaseChainConfig {
    pub rpc_url: String,

    /// `Lib_AddressManager`. Taken from `rollup_getInfo` when unset.
    #[serde(default)]
    pub address_manager: Option<Address>,

    /// First base chain block scanned for batch events.
    #[serde(default)]
    pub l1_start_block: u64,

    /// Confirmations a batch event needs before it is read.
    #[serde(default)]
    pub l1_block_finality: u64,

    #[serde(default = "default_log_page_size")]
    pub log_page_size: u64,
}

impl BaseChainConfig {
    pub(crate) fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            start_block: self.l1_start_block,
            finality_depth: self.l1_block_finality,
            page_size: self.log_page_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RollupConfig {
    pub rpc_url: String,
}

/// Logging configuration for the fraud prover.
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct LoggingConfig {
    /// Service label to append to the service name (e.g., "mainnet", "dev").
    pub service_label: Option<String>,

    /// OpenTelemetry OTLP endpoint URL for distributed tracing.
    pub otlp_url: Option<String>,

    /// Directory path for file-based logging.
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names (defaults to "ovm-fraud-prover" if not set).
    pub log_file_prefix: Option<String>,

    /// Use JSON format for logs instead of compact format.
    #[serde(default)]
    pub json_format: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    pub base_chain: BaseChainConfig,
    pub rollup: RollupConfig,

    #[serde(default)]
    pub prover: ProverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Attempts per startup connection before giving up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

impl Config {
    pub(crate) fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }
}

/// Reads the config file named in `args` and applies env and CLI overrides, in that order.
pub(crate) fn load_config(args: &Args, env_args: &EnvArgs) -> Result<Config, InitError> {
    let config_str = fs::read_to_string(&args.config)?;
    let mut override_strs = env_args.get_overrides();
    override_strs.extend(args.get_all_overrides());
    parse_config(&config_str, &override_strs)
}

fn parse_config(config_str: &str, override_strs: &[String]) -> Result<Config, InitError> {
    let mut config_toml: Value = toml::from_str(config_str)?;

    let overrides = override_strs
        .iter()
        .map(|o| parse_override(o))
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let table = config_toml
        .as_table_mut()
        .ok_or(ConfigError::TraverseNonTableAt {
            key: "<root>".to_owned(),
            path: String::new(),
        })?;
    for (path, value) in overrides {
        apply_override(&path, value, table)?;
    }

    Ok(config_toml.try_into::<Config>()?)
}

/// Splits `a.b.c=value`. The value is read as a TOML literal and falls back to a string.
fn parse_override(raw: &str) -> Result<(String, Value), ConfigError> {
    let (path, value) = raw
        .split_once('=')
        .filter(|(path, _)| !path.is_empty() && !path.split('.').any(str::is_empty))
        .ok_or_else(|| ConfigError::InvalidOverride(raw.to_owned()))?;

    let value = format!("v = {value}")
        .parse::<Value>()
        .ok()
        .and_then(|doc| doc.get("v").cloned())
        .unwrap_or_else(|| Value::String(value.to_owned()));
    Ok((path.to_owned(), value))
}

/// Sets `path` in `table`, creating intermediate tables that do not exist yet.
fn apply_override(path: &str, value: Value, table: &mut Table) -> Result<(), ConfigError> {
    let mut keys: Vec<&str> = path.split('.').collect();
    let Some(last) = keys.pop() else {
        return Err(ConfigError::InvalidOverride(path.to_owned()));
    };

    let mut current = table;
    let mut walked = Vec::with_capacity(keys.len());
    for key in keys {
        let entry = current
            .entry(key.to_owned())
            .or_insert_with(|| Value::Table(Table::new()));
        current = entry
            .as_table_mut()
            .ok_or_else(|| ConfigError::TraverseNonTableAt {
                key: key.to_owned(),
                path: walked.join("."),
            })?;
        walked.push(key);
    }
    current.insert(last.to_owned(), value);
    Ok(())
}
