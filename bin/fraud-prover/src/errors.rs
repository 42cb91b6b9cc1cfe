//! Error types for initialization and configuration.

use std::io;

use ovm_common::logging::LoggingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum InitError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("unparsable config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config: {0}")]
    MalformedConfig(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("no wallet key, set {0}")]
    MissingWalletKey(&'static str),

    #[error("invalid wallet key: {0}")]
    InvalidWalletKey(String),

    /// No address manager in config and the rollup does not report one.
    #[error("address manager unknown")]
    MissingAddressManager,

    /// Startup retries ran out.
    #[error("{0}")]
    Connect(String),
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    /// Tried to traverse into a primitive.
    #[error("can't traverse into non-table key: {key} (at {path})")]
    TraverseNonTableAt { key: String, path: String },

    /// Invalid override string.
    #[error("invalid override: '{0}'")]
    InvalidOverride(String),
}
