//! Read access to OVM batch data on the base chain and to state on the rollup.

mod base;
mod cache;
pub mod client;
pub mod contracts;
pub mod errors;
mod rollup;
pub mod rpc;
pub mod types;

pub use base::{BaseChainLedger, BatchContracts};
pub use cache::{EventCache, ScanSettings};
pub use errors::{ClientError, LedgerError};
pub use rollup::RollupLedger;
