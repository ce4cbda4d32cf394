//! Pixel-level comparison of two captures
//!
//! Both images are scanned as flat row-major buffers. Rows are tiled across
//! the rayon pool; each row reports its own count and maximum, so the result
//! does not depend on scheduling.

use parity_core::DiffSettings;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use tracing::{debug, info};

use crate::raster::RasterImage;

/// Summed RGB difference above which a pixel counts as different
pub const DEFAULT_PIXEL_THRESHOLD: u32 = 30;

/// Similarity percentage at or above which a comparison passes
pub const DEFAULT_PASS_THRESHOLD: f64 = 95.0;

const HIGHLIGHT: [u8; 3] = [255, 0, 0];

/// Thresholds applied by the differ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffPolicy {
    pub pixel_threshold: u32,
    pub pass_threshold: f64,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            pixel_threshold: DEFAULT_PIXEL_THRESHOLD,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl From<&DiffSettings> for DiffPolicy {
    fn from(settings: &DiffSettings) -> Self {
        Self {
            pixel_threshold: settings.pixel_threshold,
            pass_threshold: settings.pass_threshold,
        }
    }
}

/// Outcome of comparing two captures
///
/// Similarity and pass/fail are derived from the stored counts on every
/// access, so they cannot drift from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffResult {
    total_pixels: u64,
    different_pixels: u64,
    max_difference: u32,
    pass_threshold: f64,
}

impl DiffResult {
    pub fn new(
        total_pixels: u64,
        different_pixels: u64,
        max_difference: u32,
        pass_threshold: f64,
    ) -> Self {
        Self {
            total_pixels,
            different_pixels: different_pixels.min(total_pixels),
            max_difference,
            pass_threshold,
        }
    }

    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    pub fn different_pixels(&self) -> u64 {
        self.different_pixels
    }

    /// Largest summed RGB difference seen (0..=765)
    pub fn max_difference(&self) -> u32 {
        self.max_difference
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    /// Share of pixels not classified as different, in percent
    pub fn similarity_percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 100.0;
        }
        (self.total_pixels - self.different_pixels) as f64 * 100.0 / self.total_pixels as f64
    }

    pub fn passed(&self) -> bool {
        self.similarity_percentage() >= self.pass_threshold
    }
}

#[derive(Serialize)]
struct DiffRecord {
    total_pixels: u64,
    different_pixels: u64,
    similarity_percentage: f64,
    max_difference: u32,
    passed: bool,
}

impl Serialize for DiffResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DiffRecord {
            total_pixels: self.total_pixels,
            different_pixels: self.different_pixels,
            similarity_percentage: self.similarity_percentage(),
            max_difference: self.max_difference,
            passed: self.passed(),
        }
        .serialize(serializer)
    }
}

/// Comparison result together with its visualization
#[derive(Debug, Clone)]
pub struct RasterDiff {
    pub result: DiffResult,
    /// Red where pixels differ, candidate luminance elsewhere
    pub visualization: RasterImage,
    /// Whether the candidate had to be resampled to the reference size
    pub resampled: bool,
}

/// Compares captures under a [`DiffPolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDiffer {
    policy: DiffPolicy,
}

impl RasterDiffer {
    pub fn new(policy: DiffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DiffPolicy {
        &self.policy
    }

    /// Compare `candidate` against `reference` at the reference's resolution
    ///
    /// An empty candidate has nothing to resample; against a non-empty
    /// reference every pixel counts as different.
    pub fn compare(&self, reference: &RasterImage, candidate: &RasterImage) -> RasterDiff {
        if candidate.is_empty() && !reference.is_empty() {
            info!(
                "Empty candidate against {}x{} reference",
                reference.width(),
                reference.height()
            );
            let total = reference.pixel_count();
            return RasterDiff {
                result: DiffResult::new(total, total, 765, self.policy.pass_threshold),
                visualization: RasterImage::filled(reference.width(), reference.height(), HIGHLIGHT),
                resampled: false,
            };
        }

        let (candidate, resampled) = normalize(reference, candidate);
        let (width, height) = reference.dimensions();
        let total_pixels = reference.pixel_count();

        let mut visualization = vec![0u8; reference.as_raw().len()];
        let row_len = width as usize * 3;

        let (different_pixels, max_difference) = if row_len == 0 || height == 0 {
            (0, 0)
        } else {
            visualization
                .par_chunks_mut(row_len)
                .zip(reference.as_raw().par_chunks(row_len))
                .zip(candidate.as_raw().par_chunks(row_len))
                .map(|((out, reference_row), candidate_row)| {
                    scan_row(
                        reference_row,
                        candidate_row,
                        out,
                        self.policy.pixel_threshold,
                    )
                })
                .reduce(
                    || (0, 0),
                    |(count_a, max_a), (count_b, max_b)| (count_a + count_b, max_a.max(max_b)),
                )
        };

        let result = DiffResult::new(
            total_pixels,
            different_pixels,
            max_difference,
            self.policy.pass_threshold,
        );

        debug!(
            "Compared {}x{}: {} of {} pixels differ (max {})",
            width, height, different_pixels, total_pixels, max_difference
        );

        // from_raw cannot fail: the buffer was sized from the reference
        let visualization = RasterImage::from_raw(width, height, visualization)
            .unwrap_or_else(|_| RasterImage::filled(width, height, [0, 0, 0]));

        RasterDiff {
            result,
            visualization,
            resampled,
        }
    }
}

/// Bring the candidate to the reference's size; equal sizes pass through untouched
fn normalize<'a>(reference: &RasterImage, candidate: &'a RasterImage) -> (Cow<'a, RasterImage>, bool) {
    if reference.dimensions() == candidate.dimensions() {
        return (Cow::Borrowed(candidate), false);
    }

    info!(
        "Dimension mismatch: reference {}x{}, candidate {}x{}; resampling candidate",
        reference.width(),
        reference.height(),
        candidate.width(),
        candidate.height()
    );
    (
        Cow::Owned(candidate.resized(reference.width(), reference.height())),
        true,
    )
}

/// Classify one row, writing its visualization; returns (different, max difference)
fn scan_row(reference: &[u8], candidate: &[u8], out: &mut [u8], threshold: u32) -> (u64, u32) {
    let mut different = 0u64;
    let mut max_difference = 0u32;

    for col in 0..reference.len() / 3 {
        let i = col * 3;
        let r = &reference[i..i + 3];
        let c = &candidate[i..i + 3];

        let difference: u32 = r
            .iter()
            .zip(c)
            .map(|(&a, &b)| u32::from(a.abs_diff(b)))
            .sum();
        max_difference = max_difference.max(difference);

        if difference > threshold {
            different += 1;
            out[i..i + 3].copy_from_slice(&HIGHLIGHT);
        } else {
            let gray = ((u32::from(c[0]) + u32::from(c[1]) + u32::from(c[2])) / 3) as u8;
            out[i..i + 3].fill(gray);
        }
    }

    (different, max_difference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RasterImage {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128]);
            }
        }
        RasterImage::from_raw(width, height, pixels).unwrap()
    }

    #[test]
    fn test_identical_images() {
        let img = gradient(64, 48);
        let diff = RasterDiffer::default().compare(&img, &img);

        assert_eq!(diff.result.total_pixels(), 64 * 48);
        assert_eq!(diff.result.different_pixels(), 0);
        assert_eq!(diff.result.max_difference(), 0);
        assert_eq!(diff.result.similarity_percentage(), 100.0);
        assert!(diff.result.passed());
        assert!(!diff.resampled);
    }

    #[test]
    fn test_black_versus_white() {
        let reference = RasterImage::filled(100, 100, [0, 0, 0]);
        let candidate = RasterImage::filled(100, 100, [255, 255, 255]);
        let diff = RasterDiffer::default().compare(&reference, &candidate);

        assert_eq!(diff.result.different_pixels(), 10_000);
        assert_eq!(diff.result.similarity_percentage(), 0.0);
        assert_eq!(diff.result.max_difference(), 765);
        assert!(!diff.result.passed());
        assert_eq!(diff.visualization.pixel(50, 50), [255, 0, 0]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let reference = RasterImage::filled(10, 10, [100, 100, 100]);
        let at_threshold = RasterImage::filled(10, 10, [110, 110, 110]);
        let over_threshold = RasterImage::filled(10, 10, [110, 110, 111]);

        let differ = RasterDiffer::default();
        assert_eq!(differ.compare(&reference, &at_threshold).result.different_pixels(), 0);
        assert_eq!(
            differ.compare(&reference, &over_threshold).result.different_pixels(),
            100
        );
    }

    #[test]
    fn test_visualization_is_candidate_luminance() {
        let reference = RasterImage::filled(4, 4, [10, 20, 30]);
        let candidate = RasterImage::filled(4, 4, [12, 21, 31]);
        let diff = RasterDiffer::default().compare(&reference, &candidate);

        assert_eq!(diff.result.different_pixels(), 0);
        // (12 + 21 + 31) / 3 = 21
        assert_eq!(diff.visualization.pixel(3, 3), [21, 21, 21]);
    }

    #[test]
    fn test_partial_difference() {
        let reference = RasterImage::filled(10, 10, [255, 255, 255]);
        let mut pixels = reference.as_raw().to_vec();
        // first two rows turn black
        pixels[..10 * 2 * 3].fill(0);
        let candidate = RasterImage::from_raw(10, 10, pixels).unwrap();

        let diff = RasterDiffer::default().compare(&reference, &candidate);
        assert_eq!(diff.result.different_pixels(), 20);
        assert_eq!(diff.result.similarity_percentage(), 80.0);
        assert!(!diff.result.passed());
        assert_eq!(diff.visualization.pixel(0, 1), [255, 0, 0]);
        assert_eq!(diff.visualization.pixel(0, 2), [255, 255, 255]);
    }

    #[test]
    fn test_pass_threshold_policy() {
        let reference = RasterImage::filled(10, 10, [255, 255, 255]);
        let mut pixels = reference.as_raw().to_vec();
        pixels[..3 * 3].fill(0);
        let candidate = RasterImage::from_raw(10, 10, pixels).unwrap();

        let lenient = RasterDiffer::default().compare(&reference, &candidate);
        assert_eq!(lenient.result.similarity_percentage(), 97.0);
        assert!(lenient.result.passed());

        let strict = RasterDiffer::new(DiffPolicy {
            pass_threshold: 99.0,
            ..DiffPolicy::default()
        })
        .compare(&reference, &candidate);
        assert!(!strict.result.passed());
    }

    #[test]
    fn test_size_mismatch_resamples_candidate() {
        let reference = RasterImage::filled(40, 30, [18, 18, 18]);
        let candidate = RasterImage::filled(80, 60, [18, 18, 18]);
        let diff = RasterDiffer::default().compare(&reference, &candidate);

        assert!(diff.resampled);
        assert_eq!(diff.result.total_pixels(), 1200);
        assert_eq!(diff.visualization.dimensions(), (40, 30));
        assert_eq!(diff.result.different_pixels(), 0);
    }

    #[test]
    fn test_empty_candidate_matches_nothing() {
        let reference = RasterImage::filled(10, 10, [0, 0, 0]);
        let candidate = RasterImage::filled(0, 0, [0, 0, 0]);
        assert!(candidate.is_empty());

        let diff = RasterDiffer::default().compare(&reference, &candidate);
        assert_eq!(diff.result.total_pixels(), 100);
        assert_eq!(diff.result.different_pixels(), 100);
        assert_eq!(diff.result.similarity_percentage(), 0.0);
        assert!(!diff.result.passed());
        assert!(!diff.resampled);
        assert_eq!(diff.visualization.pixel(0, 0), [255, 0, 0]);
    }

    #[test]
    fn test_equal_size_is_never_resampled() {
        let reference = gradient(33, 17);
        let candidate = gradient(33, 17);
        let (normalized, resampled) = normalize(&reference, &candidate);
        assert!(!resampled);
        assert!(matches!(normalized, Cow::Borrowed(_)));
        assert_eq!(normalized.as_raw(), candidate.as_raw());

        let first = RasterDiffer::default().compare(&reference, &candidate);
        let second = RasterDiffer::default().compare(&reference, &normalized);
        assert_eq!(first.result, second.result);
        assert_eq!(first.visualization, second.visualization);
    }

    #[test]
    fn test_empty_images() {
        let empty = RasterImage::filled(0, 0, [0, 0, 0]);
        let diff = RasterDiffer::default().compare(&empty, &empty);
        assert_eq!(diff.result.total_pixels(), 0);
        assert_eq!(diff.result.similarity_percentage(), 100.0);
        assert!(diff.result.passed());
    }

    #[test]
    fn test_serialized_record() {
        let result = DiffResult::new(10_000, 10_000, 765, 95.0);
        let json = serde_json::to_value(result).unwrap();

        assert_eq!(json["total_pixels"], 10_000);
        assert_eq!(json["different_pixels"], 10_000);
        assert_eq!(json["similarity_percentage"], 0.0);
        assert_eq!(json["max_difference"], 765);
        assert_eq!(json["passed"], false);
    }

    #[test]
    fn test_different_pixels_bounded_by_total() {
        let result = DiffResult::new(100, 250, 40, 95.0);
        assert_eq!(result.different_pixels(), 100);
        assert_eq!(result.similarity_percentage(), 0.0);
    }
}
