//! The polling loop tying detection, assembly and the driver together.

use std::{future::Future, sync::Arc};

use ovm_ledger::{
    client::{BaseChainClient, RollupClient},
    BaseChainLedger, RollupLedger,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::{
    assembler::assemble,
    config::ProverConfig,
    contracts::DisputeContracts,
    detector::find_next_mismatched_state_root,
    driver::{DisputeDriver, DisputeOutcome, DriverSettings},
    errors::DisputeError,
};

/// Everything a poll cycle needs. Built once at startup.
#[derive(Debug)]
pub struct ProverContext<R, B, C> {
    pub rollup: Arc<RollupLedger<R>>,
    pub base: Arc<BaseChainLedger<B>>,
    pub contracts: Arc<C>,
    pub config: Arc<ProverConfig>,
}

impl<R, B, C> Clone for ProverContext<R, B, C> {
    fn clone(&self) -> Self {
        Self {
            rollup: self.rollup.clone(),
            base: self.base.clone(),
            contracts: self.contracts.clone(),
            config: self.config.clone(),
        }
    }
}

/// Runs one detect and dispute cycle.
///
/// `checkpoint` is the first state root index not yet known to match. It moves forward as
/// batches are verified and back to the start of the pre-state batch after a dispute.
pub async fn poll_once<R, B, C, Rn>(
    ctx: &ProverContext<R, B, C>,
    checkpoint: &mut u64,
    rng: &mut Rn,
) -> Result<Option<DisputeOutcome>, DisputeError>
where
    R: RollupClient,
    B: BaseChainClient,
    C: DisputeContracts,
    Rn: Rng + Send,
{
    let info = ctx.rollup.get_rollup_info().await?;
    if info.syncing {
        debug!("rollup node is syncing, skipping cycle");
        return Ok(None);
    }

    let config = ctx.config.as_ref();
    let scan = find_next_mismatched_state_root(
        &ctx.base,
        &ctx.rollup,
        *checkpoint,
        config.l2_block_offset,
    )
    .await?;
    *checkpoint = scan.next_unverified;
    let Some(index) = scan.mismatch else {
        return Ok(None);
    };

    warn!(%index, "published state root disagrees with the rollup, disputing");
    let mut data = assemble(
        &ctx.base,
        &ctx.rollup,
        index,
        config.l2_block_offset,
        config.verify_trie_roots,
    )
    .await?;

    let settings = DriverSettings {
        max_stalled_rounds: config.max_stalled_rounds,
    };
    let mut driver = DisputeDriver::new(ctx.contracts.clone(), ctx.rollup.clone(), settings, rng);
    let outcome = driver.resolve(&mut data).await?;

    *checkpoint = data.pre_state_root_proof.batch_header.prev_total_elements;
    Ok(Some(outcome))
}

/// Polls until `shutdown` resolves. Cycle errors are logged and the next cycle starts over
/// from detection.
pub async fn run<R, B, C>(ctx: ProverContext<R, B, C>, shutdown: impl Future<Output = ()>)
where
    R: RollupClient,
    B: BaseChainClient,
    C: DisputeContracts,
{
    let mut checkpoint = ctx.config.from_l2_transaction_index;
    let mut rng = StdRng::from_entropy();
    tokio::pin!(shutdown);

    info!(%checkpoint, "fraud prover started");
    loop {
        match poll_once(&ctx, &mut checkpoint, &mut rng).await {
            Ok(Some(outcome)) => info!(?outcome, %checkpoint, "dispute resolved"),
            Ok(None) => debug!(%checkpoint, "no provable mismatch"),
            Err(error) => handle_cycle_error(error, checkpoint),
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!(%checkpoint, "shutting down");
                break;
            }
            _ = tokio::time::sleep(ctx.config.polling_interval()) => {}
        }
    }
}

fn handle_cycle_error(error: DisputeError, checkpoint: u64) {
    if error.is_recoverable() {
        warn!(%error, %checkpoint, "poll cycle failed, retrying next cycle");
    } else {
        error!(%error, %checkpoint, "dispute aborted, needs attention");
    }
}
