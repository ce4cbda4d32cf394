//! Artifact storage for comparison runs
//!
//! Layout under the output directory:
//!
//! ```text
//! <page_slug>/<viewport>/reference.png
//! <page_slug>/<viewport>/candidate.png
//! <page_slug>/<viewport>/diff.png
//! <page_slug>/<viewport>/comparison_result.json
//! fonts_detected.json
//! report.json
//! summary.txt
//! ```

use parity_core::{FontInventory, PageTarget, ParityError, Result, Viewport};
use parity_raster::DiffResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::report::Report;

pub const REFERENCE_FILE: &str = "reference.png";
pub const CANDIDATE_FILE: &str = "candidate.png";
pub const DIFF_FILE: &str = "diff.png";
pub const RESULT_FILE: &str = "comparison_result.json";
pub const FONTS_FILE: &str = "fonts_detected.json";
pub const REPORT_FILE: &str = "report.json";
pub const SUMMARY_FILE: &str = "summary.txt";

/// Encoded rasters of one cell
#[derive(Debug, Clone)]
pub struct CellImages {
    pub reference_png: Vec<u8>,
    pub candidate_png: Vec<u8>,
    pub diff_png: Vec<u8>,
}

/// Paths of a cell's stored artifacts, relative to the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellArtifacts {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub diff: PathBuf,
    pub result: PathBuf,
}

/// Writes run artifacts under one output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output directory; fails early when it is not writable
    pub async fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_context(e, "create output directory", &self.root))
    }

    /// Directory of one cell, relative to the output directory
    pub fn cell_dir(page: &PageTarget, viewport: &Viewport) -> PathBuf {
        PathBuf::from(page.slug()).join(&viewport.name)
    }

    /// Store a cell's rasters and its comparison record
    pub async fn store_cell(
        &self,
        page: &PageTarget,
        viewport: &Viewport,
        images: &CellImages,
        result: &DiffResult,
    ) -> Result<CellArtifacts> {
        let relative = Self::cell_dir(page, viewport);
        let dir = self.root.join(&relative);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_context(e, "create artifact directory", &dir))?;

        self.write(&relative.join(REFERENCE_FILE), &images.reference_png)
            .await?;
        self.write(&relative.join(CANDIDATE_FILE), &images.candidate_png)
            .await?;
        self.write(&relative.join(DIFF_FILE), &images.diff_png).await?;
        let record = serde_json::to_vec_pretty(result)?;
        self.write(&relative.join(RESULT_FILE), &record).await?;

        debug!("Stored artifacts in {}", dir.display());
        Ok(CellArtifacts {
            reference: relative.join(REFERENCE_FILE),
            candidate: relative.join(CANDIDATE_FILE),
            diff: relative.join(DIFF_FILE),
            result: relative.join(RESULT_FILE),
        })
    }

    /// Store the run-wide font inventory as `{"fonts": [...]}`
    pub async fn store_fonts(&self, fonts: &FontInventory) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(fonts)?;
        self.write(Path::new(FONTS_FILE), &json).await
    }

    /// Store the structured report and its text summary
    pub async fn store_report(&self, report: &Report) -> Result<()> {
        let json = serde_json::to_vec_pretty(report)?;
        self.write(Path::new(REPORT_FILE), &json).await?;
        self.write(Path::new(SUMMARY_FILE), report.render_summary().as_bytes())
            .await?;
        Ok(())
    }

    async fn write(&self, relative: &Path, data: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(relative);
        fs::write(&path, data)
            .await
            .map_err(|e| io_context(e, "write artifact", &path))?;
        Ok(path)
    }
}

fn io_context(e: std::io::Error, action: &str, path: &Path) -> ParityError {
    ParityError::Io(std::io::Error::new(
        e.kind(),
        format!("Failed to {} {}: {}", action, path.display(), e),
    ))
}
