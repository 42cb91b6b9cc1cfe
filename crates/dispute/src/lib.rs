//! Watches published OVM state roots and disputes the ones the rollup disagrees with.
//!
//! A poll cycle runs in three stages:
//!
//! 1. [`detector`] walks state batches from a checkpoint and finds the first root that does not
//!    match the rollup's own state root.
//! 2. [`assembler`] fetches the batch proofs and the state diff for that root and rebuilds the
//!    sparse tries.
//! 3. [`driver`] walks the on-chain state transitioner through its phases and finalizes the
//!    fraud proof.
//!
//! Every write is raced by other provers, so the driver treats reverts that only mean "someone
//! else did this already" as success.

pub mod assembler;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod detector;
pub mod driver;
pub mod errors;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

pub use assembler::FraudProofData;
pub use chain::{AlloyDisputeContracts, AlloyStateTransitioner, GasSettings};
pub use config::ProverConfig;
pub use contracts::{DisputeContracts, StateTransitioner, Step};
pub use driver::{DisputeDriver, DisputeOutcome, DriverSettings};
pub use errors::{ContractError, DisputeError};
pub use service::{poll_once, run, ProverContext};
