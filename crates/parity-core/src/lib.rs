//! # parity-core
//!
//! Core types for the Parity visual comparison system.
//!
//! Parity renders two builds of the same site (a trusted reference and a
//! candidate) across a matrix of pages and viewports, and decides whether the
//! candidate still looks and behaves like the reference.
//!
//! ## Core Paradigm
//!
//! - A cell is one (page, viewport) pair; cells never share rendering handles
//! - Extracted snapshots belong to exactly one (page, viewport, selector, origin)
//! - Checks are data, evaluated as pure functions of extracted snapshots
//! - Pixel drift is reported; only hard checks and load failures fail a run

mod check;
mod config;
mod error;
mod types;

pub use check::*;
pub use config::*;
pub use error::{ParityError, Result};
pub use types::*;
