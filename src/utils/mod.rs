//! Supporting utilities for the eigensolver and the command-line driver.
//!
//! - **`eigvec_io`**: saves and loads eigenpairs as CSV files, one row per
//!   complex entry, so that a converged set can be reused by a later run.
//!
//! - **`perf`**: flop and timing reports, plus the peak resident set size on
//!   Linux systems.

pub mod eigvec_io;
pub mod perf;
