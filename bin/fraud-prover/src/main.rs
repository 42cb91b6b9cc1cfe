//! OVM fraud prover
//!
//! Compares every state root the sequencer publishes on the base chain with the rollup's own
//! state and plays a fraud proof against the first one that disagrees.

mod args;
mod config;
mod errors;

use std::{future, sync::Arc};

use alloy::{
    network::EthereumWallet,
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use anyhow::Result;
use args::{Args, EnvArgs, WALLET_KEY_VAR};
use config::{Config, LoggingConfig};
use errors::InitError;
use ovm_common::{
    logging::{self, FileLoggingConfig, LoggerConfig, OtlpExportConfig},
    retry::{retry_fixed, RetryPolicy},
};
use ovm_dispute::{service, AlloyDisputeContracts, GasSettings, ProverContext};
use ovm_ledger::{
    rpc::{AlloyBaseChainClient, AlloyRollupClient, ContractAddresses},
    BaseChainLedger, BatchContracts, RollupLedger,
};
use tokio::runtime::Handle;
use tracing::{error, info};

const SERVICE_NAME: &str = "ovm-fraud-prover";

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");

        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> Result<()> {
    let env_args = EnvArgs::from_env();
    let config = config::load_config(&args, &env_args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ovm-fraud-prover-rt")
        .build()?;

    // Init the logging before we do anything else.
    init_logging(runtime.handle(), &config.logging)?;

    let wallet_key = env_args
        .wallet_key
        .ok_or(InitError::MissingWalletKey(WALLET_KEY_VAR))?;
    let result = runtime.block_on(start(config, wallet_key));
    if let Err(err) = &result {
        error!(%err, "fraud prover stopped");
    }

    {
        let _g = runtime.enter();
        logging::finalize();
    }
    result
}

/// Connects to both chains, discovers the contracts and runs the poll loop until ctrl-c.
async fn start(config: Config, wallet_key: String) -> Result<()> {
    let signer: PrivateKeySigner = wallet_key
        .trim()
        .parse()
        .map_err(|err| InitError::InvalidWalletKey(format!("{err}")))?;
    let sender = signer.address();
    let policy = RetryPolicy::fixed(config.connect_attempts, config.connect_retry_delay());

    let base_provider = retry_fixed("connect to base chain", policy, || {
        connect_base_chain(&config.base_chain.rpc_url, signer.clone())
    })
    .await
    .map_err(|err| InitError::Connect(err.to_string()))?;
    let rollup_provider = retry_fixed("connect to rollup", policy, || {
        connect_rollup(&config.rollup.rpc_url)
    })
    .await
    .map_err(|err| InitError::Connect(err.to_string()))?;
    let rollup = Arc::new(RollupLedger::new(Arc::new(AlloyRollupClient::new(
        rollup_provider,
    ))));

    let address_manager = match config.base_chain.address_manager {
        Some(address) => address,
        None => retry_fixed("fetch rollup info", policy, || rollup.get_rollup_info())
            .await
            .map_err(|err| InitError::Connect(err.to_string()))?
            .addresses
            .address_resolver
            .ok_or(InitError::MissingAddressManager)?,
    };
    let addresses = retry_fixed("resolve contracts", policy, || {
        ContractAddresses::resolve(&base_provider, address_manager)
    })
    .await
    .map_err(|err| InitError::Connect(err.to_string()))?;
    info!(%address_manager, ?addresses, %sender, "resolved base chain contracts");

    let base = Arc::new(BaseChainLedger::new(
        Arc::new(AlloyBaseChainClient::new(
            base_provider.clone(),
            addresses.execution_manager,
        )),
        BatchContracts {
            state_commitment_chain: addresses.state_commitment_chain,
            canonical_transaction_chain: addresses.canonical_transaction_chain,
        },
        config.base_chain.scan_settings(),
    ));
    retry_fixed("warm event cache", policy, || base.warm_cache())
        .await
        .map_err(|err| InitError::Connect(err.to_string()))?;

    let gas = GasSettings {
        deploy_gas_limit: config.prover.deploy_gas_limit,
        run_gas_limit: config.prover.run_gas_limit,
    };
    let contracts = Arc::new(AlloyDisputeContracts::new(
        base_provider,
        sender,
        addresses.fraud_verifier,
        gas,
        base.clone(),
    ));

    let ctx = ProverContext {
        rollup,
        base,
        contracts,
        config: Arc::new(config.prover),
    };
    service::run(ctx, shutdown_signal()).await;
    Ok(())
}

async fn connect_base_chain(
    url: &str,
    signer: PrivateKeySigner,
) -> Result<DynProvider, TransportError> {
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect(url)
        .await?;
    let chain_id = provider.get_chain_id().await?;
    info!(%url, %chain_id, "connected to base chain");
    Ok(provider.erased())
}

async fn connect_rollup(url: &str) -> Result<DynProvider, TransportError> {
    let provider = ProviderBuilder::new().connect(url).await?;
    let block = provider.get_block_number().await?;
    info!(%url, %block, "connected to rollup");
    Ok(provider.erased())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "cannot listen for ctrl-c, running until killed");
        future::pending::<()>().await;
    }
}

/// Sets up the logging system given a handle to a runtime context to possibly
/// start the OTLP output on.
fn init_logging(rt: &Handle, config: &LoggingConfig) -> Result<(), InitError> {
    let service_name = logging::format_service_name(SERVICE_NAME, config.service_label.as_deref());

    let mut lconfig = LoggerConfig::new(service_name)
        .with_service_version(env!("CARGO_PKG_VERSION"))
        .with_json_logging(config.json_format);

    if let Some(url) = &config.otlp_url {
        lconfig = lconfig.with_otlp(OtlpExportConfig::new(url.clone()));
    }

    if let Some(dir) = &config.log_dir {
        let prefix = config
            .log_file_prefix
            .clone()
            .unwrap_or_else(|| SERVICE_NAME.to_owned());
        lconfig = lconfig.with_file_logging(
            FileLoggingConfig::new(dir.clone(), prefix).with_json_format(config.json_format),
        );
    }

    {
        // OTLP batch export spawns onto the runtime.
        let _g = rt.enter();
        logging::init(lconfig)?;
    }

    if let Some(url) = &config.otlp_url {
        info!(%url, "using OpenTelemetry tracing output");
    }
    if let Some(dir) = &config.log_dir {
        info!(log_dir = %dir.display(), "file logging enabled");
    }
    Ok(())
}
