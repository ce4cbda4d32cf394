//! Comparison matrix runner for Parity
//!
//! Runs every (page, viewport) cell of the matrix against a reference and a
//! candidate rendering, evaluates the check catalogue, diffs full-page
//! captures and collects the results into one [`Report`].
//!
//! # Architecture
//!
//! - [`sources`]: Reference/candidate roots and page URL composition
//! - [`cell`]: One cell's lifecycle and its report
//! - [`runner`]: Matrix scheduling with bounded parallelism
//! - [`artifacts`]: Per-cell rasters and records on disk
//! - [`report`]: Run-wide report and CI summary

pub mod artifacts;
pub mod cell;
pub mod report;
pub mod runner;
pub mod sources;

pub use artifacts::ArtifactStore;
pub use cell::{CellReport, CellStatus};
pub use report::{Report, RunPolicy, RunSummary};
pub use runner::{MatrixConfig, MatrixRunner};
pub use sources::SourceRoot;
