//! Comparison matrix runner
//!
//! Every (page, viewport) cell runs as its own task. A semaphore bounds how
//! many cells hold pages at once; with the default of one the matrix runs
//! sequentially. Results land in one slot per cell key, so the report order
//! does not depend on completion order.

use chrono::Utc;
use parity_browser::RenderingProvider;
use parity_core::{
    validate_pages, CellKey, CheckSpec, PageTarget, ParityConfig, ParityError, Result, Viewport,
};
use parity_raster::{DiffPolicy, RasterDiffer};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::cell::{run_cell, CellContext, CellReport};
use crate::report::{Report, RunPolicy};
use crate::sources::SourceRoot;

/// Matrix settings resolved from config and command-line overrides
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub pages: Vec<PageTarget>,
    pub viewports: Vec<Viewport>,
    pub checks: Vec<CheckSpec>,
    pub policy: DiffPolicy,
    pub load_timeout: Duration,
    pub max_parallel_cells: usize,
    pub fail_on_visual_drift: bool,
    pub output_dir: PathBuf,
}

impl MatrixConfig {
    /// Full matrix described by a config file
    pub fn from_config(config: &ParityConfig) -> Self {
        Self {
            pages: config.pages.clone(),
            viewports: config.viewports.clone(),
            checks: config.checks.clone(),
            policy: DiffPolicy::from(&config.diff),
            load_timeout: Duration::from_secs(config.run.load_timeout_secs),
            max_parallel_cells: config.run.max_parallel_cells,
            fail_on_visual_drift: config.run.fail_on_visual_drift,
            output_dir: config.output_dir.clone(),
        }
    }

    /// Pages to compare; repeats are dropped
    pub fn with_pages(mut self, pages: Vec<PageTarget>) -> Self {
        let mut seen = HashSet::new();
        self.pages = pages.into_iter().filter(|p| seen.insert(p.clone())).collect();
        self
    }

    /// Viewports to compare; repeated names are dropped
    pub fn with_viewports(mut self, viewports: Vec<Viewport>) -> Self {
        let mut seen = HashSet::new();
        self.viewports = viewports
            .into_iter()
            .filter(|v| seen.insert(v.name.clone()))
            .collect();
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.policy.pass_threshold = threshold;
        self
    }

    pub fn with_parallelism(mut self, cells: usize) -> Self {
        self.max_parallel_cells = cells;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn fail_on_visual_drift(mut self, enabled: bool) -> Self {
        self.fail_on_visual_drift = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(ParityError::Config("no pages selected".to_string()));
        }
        if self.viewports.is_empty() {
            return Err(ParityError::Config("no viewports selected".to_string()));
        }
        validate_pages(&self.pages)?;
        let mut names = HashSet::new();
        if let Some(repeated) = self.viewports.iter().find(|v| !names.insert(v.name.as_str())) {
            return Err(ParityError::Config(format!(
                "duplicate viewport name '{}'",
                repeated.name
            )));
        }
        if !(0.0..=100.0).contains(&self.policy.pass_threshold) {
            return Err(ParityError::Config(format!(
                "pass threshold {} outside 0..=100",
                self.policy.pass_threshold
            )));
        }
        if self.load_timeout.is_zero() {
            return Err(ParityError::Config("load timeout must be positive".to_string()));
        }
        Ok(())
    }

    fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            pass_threshold: self.policy.pass_threshold,
            pixel_threshold: self.policy.pixel_threshold,
            load_timeout_secs: self.load_timeout.as_secs_f64(),
            max_parallel_cells: self.max_parallel_cells.max(1),
            fail_on_visual_drift: self.fail_on_visual_drift,
        }
    }
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self::from_config(&ParityConfig::default())
    }
}

/// Runs the page x viewport matrix against one provider
pub struct MatrixRunner {
    provider: Arc<dyn RenderingProvider>,
    reference: SourceRoot,
    candidate: SourceRoot,
    config: MatrixConfig,
}

impl MatrixRunner {
    pub fn new(
        provider: Arc<dyn RenderingProvider>,
        reference: SourceRoot,
        candidate: SourceRoot,
        config: MatrixConfig,
    ) -> Self {
        Self {
            provider,
            reference,
            candidate,
            config,
        }
    }

    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Cells in matrix order
    pub fn cells(&self) -> Vec<(PageTarget, Viewport)> {
        self.config
            .pages
            .iter()
            .flat_map(|page| {
                self.config
                    .viewports
                    .iter()
                    .map(move |viewport| (page.clone(), viewport.clone()))
            })
            .collect()
    }

    /// Run every cell and write the report
    ///
    /// Cell failures are recorded in the report; only configuration and
    /// artifact I/O errors end the run early.
    pub async fn run(&self) -> Result<Report> {
        self.config.validate()?;
        let started_at = Utc::now();

        let artifacts = ArtifactStore::new(&self.config.output_dir);
        artifacts.prepare().await?;

        let cells = self.cells();
        let parallel = self.config.max_parallel_cells.max(1);
        info!(
            "Running {} cells ({} pages x {} viewports, {} at a time) into {}",
            cells.len(),
            self.config.pages.len(),
            self.config.viewports.len(),
            parallel,
            artifacts.root().display()
        );

        let ctx = Arc::new(CellContext {
            provider: Arc::clone(&self.provider),
            reference: self.reference.clone(),
            candidate: self.candidate.clone(),
            checks: self.config.checks.clone(),
            differ: RasterDiffer::new(self.config.policy),
            load_timeout: self.config.load_timeout,
            artifacts: artifacts.clone(),
        });

        let permits = Arc::new(Semaphore::new(parallel));
        let mut tasks = JoinSet::new();
        for (page, viewport) in cells {
            let ctx = Arc::clone(&ctx);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ParityError::Other(format!("cell scheduler closed: {}", e)))?;
                run_cell(ctx, page, viewport).await
            });
        }

        let mut results: BTreeMap<CellKey, CellReport> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let cell = joined.map_err(|e| ParityError::Other(format!("cell task failed: {}", e)))??;
            if let Some(previous) = results.insert(cell.key(), cell) {
                warn!("Cell {} reported twice; keeping the latest", previous.key());
            }
        }

        let report = Report::new(
            started_at,
            self.reference.to_string(),
            self.candidate.to_string(),
            self.config.run_policy(),
            results.into_values().collect(),
        );

        artifacts.store_fonts(&report.fonts).await?;
        artifacts.store_report(&report).await?;

        info!(
            "Run {} finished: {} cells, {} hard failures, {} load failures",
            report.run_id,
            report.summary.cells,
            report.summary.hard_failures,
            report.summary.load_failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults() {
        let config = MatrixConfig::default();
        assert_eq!(config.pages.len(), 9);
        assert_eq!(config.viewports.len(), 4);
        assert_eq!(config.policy.pass_threshold, 95.0);
        assert_eq!(config.policy.pixel_threshold, 30);
        assert_eq!(config.load_timeout, Duration::from_secs(30));
        assert_eq!(config.max_parallel_cells, 1);
        assert!(!config.fail_on_visual_drift);
    }

    #[test]
    fn test_validate_rejects_bad_overrides() {
        assert!(MatrixConfig::default().validate().is_ok());
        assert!(MatrixConfig::default().with_pages(Vec::new()).validate().is_err());
        assert!(MatrixConfig::default()
            .with_pass_threshold(101.0)
            .validate()
            .is_err());
        assert!(MatrixConfig::default()
            .with_load_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_repeated_cells_collapse() {
        let config = MatrixConfig::default()
            .with_pages(vec![
                PageTarget::new("index.html"),
                PageTarget::new("talks/index.html"),
                PageTarget::new("index.html"),
            ])
            .with_viewports(vec![
                Viewport::new("mobile", 375, 667),
                Viewport::new("mobile", 375, 667),
            ]);
        assert_eq!(config.pages.len(), 2);
        assert_eq!(config.viewports.len(), 1);
        assert!(config.validate().is_ok());

        let mut raw = config;
        raw.viewports.push(Viewport::new("mobile", 360, 640));
        let err = raw.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate viewport name 'mobile'"));
    }

    #[test]
    fn test_colliding_artifact_directories_are_rejected() {
        let config = MatrixConfig::default()
            .with_pages(vec![PageTarget::new("a/b.html"), PageTarget::new("a_b.html")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("share artifact directory 'a_b'"));
    }

    #[test]
    fn test_run_policy_clamps_parallelism() {
        let policy = MatrixConfig::default().with_parallelism(0).run_policy();
        assert_eq!(policy.max_parallel_cells, 1);
        assert_eq!(policy.load_timeout_secs, 30.0);
    }
}
