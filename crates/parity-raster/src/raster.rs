//! RGB raster images produced by full-page captures

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use parity_core::{ParityError, Result};
use std::io::Cursor;
use std::path::Path;

/// Width x height grid of RGB pixels in one row-major buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    inner: RgbImage,
}

impl RasterImage {
    /// Image filled with a single colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            inner: RgbImage::from_pixel(width, height, image::Rgb(rgb)),
        }
    }

    /// Wrap a raw RGB buffer (3 bytes per pixel, row-major)
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        let actual = pixels.len();
        RgbImage::from_raw(width, height, pixels)
            .map(|inner| Self { inner })
            .ok_or_else(|| {
                ParityError::Image(format!(
                    "buffer of {} bytes does not fit {}x{} RGB (expected {})",
                    actual, width, height, expected
                ))
            })
    }

    /// Decode an encoded capture (PNG or any enabled format), dropping alpha
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ParityError::Image(format!("Failed to decode capture: {}", e)))?;
        Ok(Self {
            inner: decoded.to_rgb8(),
        })
    }

    /// Load an image file from disk
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path).map_err(|e| {
            ParityError::Image(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            inner: decoded.to_rgb8(),
        })
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.inner
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| ParityError::Image(format!("Failed to encode PNG: {}", e)))?;
        Ok(out.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Whether the image has no pixels at all
    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Raw RGB bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.inner.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.inner.get_pixel(x, y).0
    }

    /// Resample to the given size with Lanczos3 interpolation
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            inner: imageops::resize(&self.inner, width, height, FilterType::Lanczos3),
        }
    }
}
