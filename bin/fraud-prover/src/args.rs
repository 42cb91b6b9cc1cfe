//! CLI argument parsing and environment variable handling.

use std::{env, fmt, path::PathBuf};

use argh::FromArgs;

/// Environment variable holding the hex private key of the base chain wallet.
pub(crate) const WALLET_KEY_VAR: &str = "L1_WALLET_KEY";

/// Configs overridable by environment. Mostly for sensitive data.
#[derive(Clone)]
pub(crate) struct EnvArgs {
    /// Never logged, never written into the config table.
    pub wallet_key: Option<String>,
    pub otlp_url: Option<String>,
    pub service_label: Option<String>,
}

impl fmt::Debug for EnvArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvArgs")
            .field("wallet_key", &self.wallet_key.as_ref().map(|_| "<redacted>"))
            .field("otlp_url", &self.otlp_url)
            .field("service_label", &self.service_label)
            .finish()
    }
}

impl EnvArgs {
    pub(crate) fn from_env() -> Self {
        Self {
            wallet_key: env::var(WALLET_KEY_VAR).ok(),
            otlp_url: env::var("OVM_OTLP_URL").ok(),
            service_label: env::var("OVM_SVC_LABEL").ok(),
        }
    }

    /// Overrides gathered from env.
    pub(crate) fn get_overrides(&self) -> Vec<String> {
        let mut overrides = Vec::new();
        if let Some(url) = &self.otlp_url {
            overrides.push(format!("logging.otlp_url=\"{url}\""));
        }
        if let Some(label) = &self.service_label {
            overrides.push(format!("logging.service_label=\"{label}\""));
        }
        overrides
    }
}

#[derive(Clone, Debug, FromArgs)]
#[argh(description = "OVM fraud prover")]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: PathBuf,

    /// Base chain JSON-RPC endpoint that will override the one in the config toml.
    #[argh(option, description = "base chain rpc url")]
    pub l1_rpc_url: Option<String>,

    /// Rollup JSON-RPC endpoint that will override the one in the config toml.
    #[argh(option, description = "rollup rpc url")]
    pub l2_rpc_url: Option<String>,

    /// First state root index to check.
    #[argh(option, description = "first state root index to verify")]
    pub from_index: Option<u64>,

    /// Other generic overrides to the config toml.
    /// Will be used, for example, as `-o prover.run_gas_limit=9000000 -o base_chain.log_page_size=500`
    #[argh(option, short = 'o', description = "generic config overrides")]
    pub overrides: Vec<String>,
}

impl Args {
    /// Overrides passed by the user, then the ones from dedicated args.
    pub(crate) fn get_all_overrides(&self) -> Vec<String> {
        let mut overrides = self.overrides.clone();
        if let Some(url) = &self.l1_rpc_url {
            overrides.push(format!("base_chain.rpc_url=\"{url}\""));
        }
        if let Some(url) = &self.l2_rpc_url {
            overrides.push(format!("rollup.rpc_url=\"{url}\""));
        }
        if let Some(index) = self.from_index {
            overrides.push(format!("prover.from_l2_transaction_index={index}"));
        }
        overrides
    }
}
