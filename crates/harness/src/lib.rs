//! fixsim Test Harness
//!
//! Runs loaded layers against recorded golden activations and reports how
//! far the simulated datapath is from the recorded one.

mod compare;
mod config;
mod error;
mod golden;

pub use compare::{allclose, compare, Comparison, MaxDiff, Outcome, ATOL, RTOL};
pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use golden::{CaseReport, GoldenSuite, LayerReport, SuiteReport, SuiteSummary};
