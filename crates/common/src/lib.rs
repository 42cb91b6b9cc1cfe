//! Ambient utilities for the fraud prover: logging setup and bounded retries.

pub mod logging;
pub mod retry;
