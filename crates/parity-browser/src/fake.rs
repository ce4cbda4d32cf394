//! In-memory rendering provider for tests
//!
//! A [`FakeSite`] is a scripted rendering: canned answers to typed queries,
//! optionally overridden per viewport, plus a screenshot. A [`FakeProvider`]
//! serves sites by URL prefix and counts the page handles it hands out, so
//! tests can assert that every handle was released.
//!
//! Queries nobody scripted behave like an empty document: no element matches,
//! counts are zero, the font inventory is empty and the body is exactly as wide
//! as the viewport.

use async_trait::async_trait;
use parity_core::{ComputedStyleSnapshot, GeometrySnapshot, ParityError, Result, Viewport};
use parity_raster::RasterImage;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::extract::Query;
use crate::provider::{PageHandle, RenderingProvider};

/// Scripted rendering of one source root
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    responses: HashMap<(Option<String>, String), String>,
    screenshots: HashMap<Option<String>, RasterImage>,
    unreachable: bool,
    hanging: bool,
    failing_screenshot: bool,
    load_delay: Option<Duration>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `payload` at every viewport
    pub fn respond(mut self, query: Query, payload: Value) -> Self {
        self.responses.insert((None, query.script()), payload.to_string());
        self
    }

    /// Answer `query` with `payload` at one viewport only
    pub fn respond_at(mut self, viewport: &str, query: Query, payload: Value) -> Self {
        self.responses
            .insert((Some(viewport.to_string()), query.script()), payload.to_string());
        self
    }

    pub fn with_style(self, selector: &str, style: ComputedStyleSnapshot) -> Self {
        let payload = serde_json::to_value(style).unwrap_or(Value::Null);
        self.respond(Query::style(selector), payload)
            .with_count(selector, 1)
    }

    pub fn with_geometry(self, selector: &str, rect: GeometrySnapshot) -> Self {
        let payload = serde_json::to_value(rect).unwrap_or(Value::Null);
        self.respond(Query::geometry(selector), payload)
    }

    pub fn with_geometry_at(self, viewport: &str, selector: &str, rect: GeometrySnapshot) -> Self {
        let payload = serde_json::to_value(rect).unwrap_or(Value::Null);
        self.respond_at(viewport, Query::geometry(selector), payload)
    }

    pub fn with_count(self, selector: &str, count: u32) -> Self {
        self.respond(Query::count(selector), Value::from(count))
    }

    pub fn with_visible(self, selector: &str, visible: bool) -> Self {
        self.respond(Query::visible(selector), Value::Bool(visible))
    }

    pub fn with_visible_at(self, viewport: &str, selector: &str, visible: bool) -> Self {
        self.respond_at(viewport, Query::visible(selector), Value::Bool(visible))
    }

    /// Make `text` appear once under `scope`
    pub fn with_text(self, scope: &str, text: &str) -> Self {
        self.respond(Query::text_within(scope, text), Value::from(1u32))
    }

    pub fn with_fonts(self, fonts: &[&str]) -> Self {
        self.respond(Query::Fonts, Value::from(fonts.to_vec()))
    }

    pub fn with_scroll_width(self, width: f64) -> Self {
        self.respond(Query::ScrollWidth, Value::from(width))
    }

    pub fn with_scroll_width_at(self, viewport: &str, width: f64) -> Self {
        self.respond_at(viewport, Query::ScrollWidth, Value::from(width))
    }

    /// Screenshot returned at every viewport without its own
    pub fn with_screenshot(mut self, image: RasterImage) -> Self {
        self.screenshots.insert(None, image);
        self
    }

    pub fn with_screenshot_at(mut self, viewport: &str, image: RasterImage) -> Self {
        self.screenshots.insert(Some(viewport.to_string()), image);
        self
    }

    /// Navigation fails as if the server were down
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Network never goes idle
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }

    /// Every capture fails
    pub fn failing_screenshot(mut self) -> Self {
        self.failing_screenshot = true;
        self
    }

    /// Idle wait takes this long before succeeding
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    fn answer(&self, viewport: &Viewport, script: &str) -> String {
        let scoped = (Some(viewport.name.clone()), script.to_string());
        if let Some(payload) = self.responses.get(&scoped) {
            return payload.clone();
        }
        if let Some(payload) = self.responses.get(&(None, script.to_string())) {
            return payload.clone();
        }
        empty_document_answer(viewport, script)
    }

    fn screenshot_for(&self, viewport: &Viewport) -> RasterImage {
        self.screenshots
            .get(&Some(viewport.name.clone()))
            .or_else(|| self.screenshots.get(&None))
            .cloned()
            .unwrap_or_else(|| RasterImage::filled(viewport.width, viewport.height, [255, 255, 255]))
    }
}

fn empty_document_answer(viewport: &Viewport, script: &str) -> String {
    if script == Query::ScrollWidth.script() {
        Value::from(viewport.width).to_string()
    } else if script == Query::Fonts.script() {
        "[]".to_string()
    } else if script.contains("querySelectorAll(") {
        "0".to_string()
    } else {
        "null".to_string()
    }
}

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    opened: AtomicUsize,
    peak: AtomicUsize,
}

/// Provider serving [`FakeSite`]s by URL prefix
#[derive(Debug, Default)]
pub struct FakeProvider {
    sites: Vec<(String, Arc<FakeSite>)>,
    counters: Arc<Counters>,
    visited: Arc<Mutex<Vec<String>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `site` for every URL starting with `prefix`
    pub fn with_site(mut self, prefix: impl Into<String>, site: FakeSite) -> Self {
        self.sites.push((prefix.into(), Arc::new(site)));
        self
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Handles opened over the provider's lifetime
    pub fn pages_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Largest number of handles open at the same time
    pub fn peak_open_handles(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Every URL navigated to, in order
    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RenderingProvider for FakeProvider {
    async fn new_page(&self, viewport: &Viewport) -> Result<Box<dyn PageHandle>> {
        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.peak.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            viewport: viewport.clone(),
            sites: self.sites.clone(),
            current: Mutex::new(None),
            counters: Arc::clone(&self.counters),
            visited: Arc::clone(&self.visited),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakePage {
    viewport: Viewport,
    sites: Vec<(String, Arc<FakeSite>)>,
    current: Mutex<Option<(String, Arc<FakeSite>)>>,
    counters: Arc<Counters>,
    visited: Arc<Mutex<Vec<String>>>,
    closed: AtomicBool,
}

impl FakePage {
    fn loaded(&self) -> Result<(String, Arc<FakeSite>)> {
        self.current
            .lock()
            .map_err(|_| ParityError::Browser("page state poisoned".to_string()))?
            .clone()
            .ok_or_else(|| ParityError::Browser("no document loaded".to_string()))
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(url.to_string());
        }

        let site = self
            .sites
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, site)| Arc::clone(site))
            .ok_or_else(|| ParityError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })?;

        if site.unreachable {
            return Err(ParityError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }

        let mut current = self
            .current
            .lock()
            .map_err(|_| ParityError::Browser("page state poisoned".to_string()))?;
        *current = Some((url.to_string(), site));
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let (url, site) = self.loaded()?;
        if site.hanging {
            tokio::time::sleep(timeout).await;
            return Err(ParityError::LoadTimeout { url, timeout });
        }
        if let Some(delay) = site.load_delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ParityError::LoadTimeout { url, timeout });
            }
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let (_, site) = self.loaded()?;
        Ok(Value::String(site.answer(&self.viewport, script)))
    }

    async fn screenshot(&self, _full_page: bool) -> Result<RasterImage> {
        let (url, site) = self.loaded()?;
        if site.failing_screenshot {
            return Err(ParityError::Screenshot(format!("capture of {} failed", url)));
        }
        Ok(site.screenshot_for(&self.viewport))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
