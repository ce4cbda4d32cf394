//! Screenshot capture using Chrome DevTools Protocol

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use headless_chrome::protocol::cdp::Page::{self, CaptureScreenshotFormatOption};
use headless_chrome::Tab;
use parity_core::{ParityError, Result};
use parity_raster::RasterImage;
use serde::Deserialize;
use tracing::debug;

/// Screenshot capture options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    /// Capture the whole document rather than the visible viewport
    pub full_page: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self { full_page: true }
    }
}

/// Scrollable extent of the document, in CSS pixels
#[derive(Debug, Clone, Copy, Deserialize)]
struct DocumentExtent {
    width: f64,
    height: f64,
}

const EXTENT_SCRIPT: &str = r#"(() => {
    const d = document.documentElement;
    const b = document.body || d;
    return JSON.stringify({
        width: Math.max(d.scrollWidth, b.scrollWidth, d.clientWidth),
        height: Math.max(d.scrollHeight, b.scrollHeight, d.clientHeight),
    });
})()"#;

fn document_extent(tab: &Tab) -> Result<DocumentExtent> {
    let result = tab
        .evaluate(EXTENT_SCRIPT, false)
        .map_err(|e| ParityError::Screenshot(format!("Failed to measure document: {}", e)))?;

    let text = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| ParityError::Screenshot("document size unavailable".to_string()))?;

    serde_json::from_str(text)
        .map_err(|e| ParityError::Screenshot(format!("Malformed document size: {}", e)))
}

/// Screenshot request for a capture; full-page captures paint past the viewport
fn capture_request(extent: Option<DocumentExtent>) -> Page::CaptureScreenshot {
    let clip = extent.map(|extent| Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width,
        height: extent.height,
        scale: 1.0,
    });

    Page::CaptureScreenshot {
        format: Some(CaptureScreenshotFormatOption::Png),
        quality: None,
        capture_beyond_viewport: clip.as_ref().map(|_| true),
        clip,
        from_surface: Some(true),
        optimize_for_speed: None,
    }
}

/// Decode the base64 PNG payload returned by DevTools
fn decode_capture(data: &str) -> Result<RasterImage> {
    let png = STANDARD
        .decode(data)
        .map_err(|e| ParityError::Screenshot(format!("Malformed capture payload: {}", e)))?;
    debug!("Captured {} bytes", png.len());
    RasterImage::decode(&png)
}

/// Capture a tab as a decoded raster (blocking; call from a blocking thread)
pub fn capture_tab(tab: &Tab, options: ScreenshotOptions) -> Result<RasterImage> {
    let extent = if options.full_page {
        let extent = document_extent(tab)?;
        debug!(
            "Capturing full page ({}x{} CSS px)",
            extent.width, extent.height
        );
        Some(extent)
    } else {
        debug!("Capturing visible viewport");
        None
    };

    let captured = tab
        .call_method(capture_request(extent))
        .map_err(|e| ParityError::Screenshot(e.to_string()))?;
    decode_capture(&captured.data)
}
