//! Finds the first published state root that the rollup node disagrees with.

use ovm_ledger::{
    client::{BaseChainClient, RollupClient},
    BaseChainLedger, LedgerError, RollupLedger,
};
use tracing::{debug, info};

/// Outcome of one detector pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MismatchScan {
    /// Global index of the first divergent state root.
    pub mismatch: Option<u64>,
    /// First index not yet known to match. Never lower than the index the scan started at.
    pub next_unverified: u64,
}

/// Compares published state roots with the rollup's own, batch by batch, starting at
/// `next_unverified`.
///
/// Stops at the first divergence, or as soon as either chain runs out of data. Global index
/// `i` is checked against rollup block `i + l2_block_offset`.
pub async fn find_next_mismatched_state_root<B, R>(
    base: &BaseChainLedger<B>,
    rollup: &RollupLedger<R>,
    next_unverified: u64,
    l2_block_offset: u64,
) -> Result<MismatchScan, LedgerError>
where
    B: BaseChainClient,
    R: RollupClient,
{
    let mut next = next_unverified;
    loop {
        let Some(header) = base.get_state_root_batch_header(next).await? else {
            debug!(%next, "no state batch published yet");
            return Ok(MismatchScan {
                mismatch: None,
                next_unverified: next,
            });
        };
        let Some(published) = base.get_batch_state_roots(next).await? else {
            return Ok(MismatchScan {
                mismatch: None,
                next_unverified: next,
            });
        };
        if (published.len() as u64) < header.batch_size {
            return Err(LedgerError::ElementMissing {
                index: header.prev_total_elements + published.len() as u64,
                available: published.len(),
            });
        }

        for (offset, published_root) in published.iter().enumerate() {
            let index = header.prev_total_elements + offset as u64;
            if index < next || index >= header.end() {
                continue;
            }

            let Some(rollup_root) = rollup.get_state_root(index + l2_block_offset).await? else {
                debug!(%index, "rollup has not produced the block yet");
                return Ok(MismatchScan {
                    mismatch: None,
                    next_unverified: index,
                });
            };

            if rollup_root != *published_root {
                info!(
                    %index,
                    batch_index = header.batch_index,
                    published = %published_root,
                    computed = %rollup_root,
                    "state root mismatch"
                );
                return Ok(MismatchScan {
                    mismatch: Some(index),
                    next_unverified: index,
                });
            }
        }

        debug!(batch_index = header.batch_index, end = header.end(), "batch verified");
        next = header.end();
    }
}
