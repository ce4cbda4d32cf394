//! # parity-checks
//!
//! Assertion library for Parity comparisons.
//!
//! This crate provides:
//! - Pure assertion functions over extracted snapshots
//! - Check verdicts with expected vs. observed values
//! - Evaluation of a check catalogue against a reference/candidate page pair

pub mod assertions;
mod evaluator;
mod verdict;

pub use evaluator::{evaluate_catalogue, evaluate_check, PagePair};
pub use verdict::{CheckVerdict, Outcome};
