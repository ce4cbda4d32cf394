//! Unified error types for Parity

use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Parity operations
#[derive(Error, Debug)]
pub enum ParityError {
    // Rendering provider errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {timeout:?} waiting for {url} to go idle")]
    LoadTimeout { url: String, timeout: Duration },

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    // Extraction errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    // Raster errors
    #[error("Image error: {0}")]
    Image(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid source root '{root}': {reason}")]
    InvalidRoot { root: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl ParityError {
    /// Whether this error is a load timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LoadTimeout { .. })
    }
}

/// Result type alias using ParityError
pub type Result<T> = std::result::Result<T, ParityError>;
