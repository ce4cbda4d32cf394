//! Rendering provider abstraction
//!
//! The provider is the lifetime-scoped browser context: it is created once per
//! run and passed explicitly to whoever needs pages. Each page handle belongs
//! to exactly one matrix cell.

use async_trait::async_trait;
use parity_core::{Result, Viewport};
use parity_raster::RasterImage;
use std::ops::Deref;
use std::time::Duration;
use tracing::debug;

/// Source of rendered pages (allows mocking in tests)
#[async_trait]
pub trait RenderingProvider: Send + Sync {
    /// Open a fresh page rendered at exactly the viewport's size
    async fn new_page(&self, viewport: &Viewport) -> Result<Box<dyn PageHandle>>;
}

/// One live rendered page
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate to a URL; fails with `Navigation` on unreachable or invalid URLs
    async fn goto(&self, url: &str) -> Result<()>;

    /// Wait until network activity settles; fails with `LoadTimeout` after `timeout`
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    /// Evaluate a script in page context and return its JSON result
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Capture the page as a raster
    async fn screenshot(&self, full_page: bool) -> Result<RasterImage>;

    /// Release the page; must be idempotent
    fn close(&self);
}

/// Page handle that is closed when dropped
///
/// Cells hold their pages through this guard, so a failing check, an early
/// return or a timeout cannot leak a handle.
pub struct ScopedPage {
    page: Box<dyn PageHandle>,
    viewport: String,
}

impl ScopedPage {
    /// Open a page from the provider and take ownership of it
    pub async fn open(provider: &dyn RenderingProvider, viewport: &Viewport) -> Result<Self> {
        let page = provider.new_page(viewport).await?;
        debug!("Opened page at {}", viewport);
        Ok(Self {
            page,
            viewport: viewport.name.clone(),
        })
    }

    /// Wrap an already opened handle
    pub fn new(page: Box<dyn PageHandle>, viewport: impl Into<String>) -> Self {
        Self {
            page,
            viewport: viewport.into(),
        }
    }
}

impl Deref for ScopedPage {
    type Target = dyn PageHandle;

    fn deref(&self) -> &Self::Target {
        self.page.as_ref()
    }
}

impl Drop for ScopedPage {
    fn drop(&mut self) {
        debug!("Releasing page at viewport {}", self.viewport);
        self.page.close();
    }
}
