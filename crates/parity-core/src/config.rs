//! Configuration management for Parity
//!
//! Run settings come from `parity.toml` (or an explicit file) layered under
//! command-line overrides. Everything has a default, so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::check::{default_catalogue, CheckSpec};
use crate::types::{PageTarget, Viewport};
use crate::{ParityError, Result};

/// Name of the config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "parity.toml";

/// Top-level Parity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParityConfig {
    /// Reference source root (URL or local directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Candidate source root (URL or local directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,

    /// Where artifacts and reports are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Pixel comparison policy
    #[serde(default)]
    pub diff: DiffSettings,

    /// Matrix execution settings
    #[serde(default)]
    pub run: RunSettings,

    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Viewport catalogue
    #[serde(default = "Viewport::default_catalogue")]
    pub viewports: Vec<Viewport>,

    /// Page catalogue
    #[serde(default = "PageTarget::default_catalogue")]
    pub pages: Vec<PageTarget>,

    /// Check catalogue
    #[serde(default = "default_catalogue")]
    pub checks: Vec<CheckSpec>,
}

/// Raster comparison policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSettings {
    /// Minimum similarity percentage for a cell to count as visually equal
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Summed RGB difference above which a pixel counts as different
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: u32,
}

/// Matrix execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Bound on navigation plus network-idle wait, per page
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Cells evaluated concurrently (1 = sequential)
    #[serde(default = "default_max_parallel_cells")]
    pub max_parallel_cells: usize,

    /// Treat similarity below the pass threshold as a run failure
    #[serde(default)]
    pub fail_on_visual_drift: bool,
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

// Default value providers
fn default_output_dir() -> PathBuf {
    PathBuf::from("parity-results")
}

fn default_pass_threshold() -> f64 {
    95.0
}

fn default_pixel_threshold() -> u32 {
    30
}

fn default_load_timeout_secs() -> u64 {
    30
}

fn default_max_parallel_cells() -> usize {
    1
}

fn default_headless() -> bool {
    true
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            pixel_threshold: default_pixel_threshold(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            load_timeout_secs: default_load_timeout_secs(),
            max_parallel_cells: default_max_parallel_cells(),
            fail_on_visual_drift: false,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            user_agent: None,
        }
    }
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            reference: None,
            candidate: None,
            output_dir: default_output_dir(),
            diff: DiffSettings::default(),
            run: RunSettings::default(),
            browser: BrowserSettings::default(),
            viewports: Viewport::default_catalogue(),
            pages: PageTarget::default_catalogue(),
            checks: default_catalogue(),
        }
    }
}

impl ParityConfig {
    /// Load `parity.toml` from `dir`, or fall back to defaults
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, dir.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a specific config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ParityError::Config(msg) => {
                ParityError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ParityError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ParityError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.viewports.is_empty() {
            return Err(ParityError::Config("no viewports configured".to_string()));
        }
        if self.pages.is_empty() {
            return Err(ParityError::Config("no pages configured".to_string()));
        }

        let mut names = HashSet::new();
        for viewport in &self.viewports {
            if viewport.width == 0 || viewport.height == 0 {
                return Err(ParityError::Config(format!(
                    "viewport '{}' must have a non-zero size",
                    viewport.name
                )));
            }
            if !names.insert(viewport.name.as_str()) {
                return Err(ParityError::Config(format!(
                    "duplicate viewport name '{}'",
                    viewport.name
                )));
            }
        }

        validate_pages(&self.pages)?;

        let mut checks = HashSet::new();
        for check in &self.checks {
            if !checks.insert(check.name.as_str()) {
                return Err(ParityError::Config(format!(
                    "duplicate check name '{}'",
                    check.name
                )));
            }
        }

        if !(0.0..=100.0).contains(&self.diff.pass_threshold) {
            return Err(ParityError::Config(format!(
                "pass_threshold must be within 0..=100, got {}",
                self.diff.pass_threshold
            )));
        }
        if self.diff.pixel_threshold > 765 {
            return Err(ParityError::Config(format!(
                "pixel_threshold must be within 0..=765, got {}",
                self.diff.pixel_threshold
            )));
        }
        if self.run.load_timeout_secs == 0 {
            return Err(ParityError::Config(
                "load_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Restrict the viewport catalogue to the named entries (empty = all)
    pub fn select_viewports(&self, names: &[String]) -> Result<Vec<Viewport>> {
        if names.is_empty() {
            return Ok(self.viewports.clone());
        }

        let mut seen = HashSet::new();
        names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .map(|name| {
                self.viewports
                    .iter()
                    .find(|v| &v.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        ParityError::Config(format!(
                            "unknown viewport '{}' (known: {})",
                            name,
                            self.viewports
                                .iter()
                                .map(|v| v.name.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                    })
            })
            .collect()
    }

    /// Restrict the page catalogue to the given paths (empty = all)
    ///
    /// Pages outside the catalogue are accepted: any path of the site can be compared.
    pub fn select_pages(&self, paths: &[String]) -> Vec<PageTarget> {
        if paths.is_empty() {
            self.pages.clone()
        } else {
            let mut seen = HashSet::new();
            paths
                .iter()
                .map(|p| PageTarget::new(p.as_str()))
                .filter(|page| seen.insert(page.clone()))
                .collect()
        }
    }
}

/// Reject repeated pages and pages whose artifact directories would coincide
pub fn validate_pages(pages: &[PageTarget]) -> Result<()> {
    let mut slugs: HashMap<String, &PageTarget> = HashMap::new();
    for page in pages {
        if let Some(other) = slugs.insert(page.slug(), page) {
            return Err(ParityError::Config(if other == page {
                format!("duplicate page '{}'", page)
            } else {
                format!(
                    "pages '{}' and '{}' share artifact directory '{}'",
                    other,
                    page,
                    page.slug()
                )
            }));
        }
    }
    Ok(())
}
