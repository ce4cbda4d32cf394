//! Source roots for the reference and candidate renderings

use parity_core::{PageTarget, ParityError, Result};
use std::path::Path;
use url::Url;

/// Base URL that page paths are resolved against
///
/// Accepts `http(s)://` and `file://` URLs as well as local directories,
/// which are turned into `file://` URLs. The base always ends with `/`, so
/// page paths are joined under it rather than replacing its last segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    base: Url,
}

impl SourceRoot {
    pub fn parse(root: &str) -> Result<Self> {
        let trimmed = root.trim();
        if trimmed.is_empty() {
            return Err(invalid(root, "empty root"));
        }

        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => Self::from_url(url),
            // Anything else, including Windows drive letters, is a local path
            _ => Self::from_directory(Path::new(trimmed)),
        }
    }

    /// Root at a local directory
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let absolute = dir
            .canonicalize()
            .map_err(|e| invalid(&dir.display().to_string(), &e.to_string()))?;
        if !absolute.is_dir() {
            return Err(invalid(&dir.display().to_string(), "not a directory"));
        }

        let base = Url::from_directory_path(&absolute)
            .map_err(|_| invalid(&absolute.display().to_string(), "cannot form a file URL"))?;
        Ok(Self { base })
    }

    fn from_url(mut url: Url) -> Result<Self> {
        if url.cannot_be_a_base() {
            return Err(invalid(url.as_str(), "URL cannot be a base"));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { base: url })
    }

    /// Full URL of a page under this root
    pub fn url_for(&self, page: &PageTarget) -> Result<Url> {
        self.base
            .join(page.path())
            .map_err(|e| invalid(self.base.as_str(), &format!("cannot join '{}': {}", page, e)))
    }
}

impl std::fmt::Display for SourceRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.base.as_str())
    }
}

fn invalid(root: &str, reason: &str) -> ParityError {
    ParityError::InvalidRoot {
        root: root.to_string(),
        reason: reason.to_string(),
    }
}
