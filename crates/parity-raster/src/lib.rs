//! Raster images and pixel-level comparison for Parity
//!
//! # Architecture
//!
//! - [`raster`]: RGB raster images backed by one contiguous buffer
//! - [`diff`]: The raster differ producing a [`DiffResult`] and a visualization

pub mod diff;
pub mod raster;

pub use diff::{DiffPolicy, DiffResult, RasterDiff, RasterDiffer};
pub use raster::RasterImage;
