//! Test harness for running reshuffle case tables through the streamer.
//!
//! This module provides infrastructure for:
//! - Loading case tables (TOML) of reshuffle configurations
//! - Running each case through the register-programmed streamer and the oracle
//! - Reporting pass/mismatch/error per case
//!
//! # Usage
//!
//! ```bash
//! cargo run -- run cases/reshuffle.toml
//! ```

pub mod case_suite;

pub use case_suite::{Bench, Case, CaseSuite, CaseTable, SuiteResult, TestOutcome};
