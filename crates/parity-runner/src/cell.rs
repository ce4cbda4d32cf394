//! One comparison cell: a page rendered at one viewport by both origins

use parity_browser::{extract, PageHandle, RenderingProvider, ScopedPage};
use parity_checks::{evaluate_catalogue, CheckVerdict, PagePair};
use parity_core::{
    CellKey, CheckSpec, FontInventory, Origin, PageTarget, ParityError, Result, Viewport,
};
use parity_raster::{DiffResult, RasterDiffer, RasterImage};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::artifacts::{ArtifactStore, CellArtifacts, CellImages};
use crate::sources::SourceRoot;

/// How far a cell got
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellStatus {
    /// Both renderings loaded, were checked and compared
    Completed,
    /// A rendering could not be loaded; no checks ran
    LoadFailed {
        origin: Origin,
        url: String,
        reason: String,
        timed_out: bool,
    },
    /// Checks ran but the rasters could not be captured or compared
    CaptureFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<Origin>,
        reason: String,
    },
}

/// Everything recorded for one cell
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub page: PageTarget,
    pub viewport: Viewport,
    #[serde(flatten)]
    pub status: CellStatus,
    pub verdicts: Vec<CheckVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffResult>,
    /// Candidate capture was resampled to the reference size
    pub resampled: bool,
    /// Font families in use in the candidate rendering
    pub fonts: FontInventory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<CellArtifacts>,
    pub duration_ms: u64,
}

impl CellReport {
    pub fn new(page: PageTarget, viewport: Viewport) -> Self {
        Self {
            page,
            viewport,
            status: CellStatus::Completed,
            verdicts: Vec::new(),
            diff: None,
            resampled: false,
            fonts: FontInventory::new(),
            artifacts: None,
            duration_ms: 0,
        }
    }

    pub fn key(&self) -> CellKey {
        CellKey::new(&self.page, &self.viewport)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, CellStatus::Completed)
    }

    pub fn is_load_failure(&self) -> bool {
        matches!(self.status, CellStatus::LoadFailed { .. })
    }

    pub fn is_capture_failure(&self) -> bool {
        matches!(self.status, CellStatus::CaptureFailed { .. })
    }

    /// Failed verdicts that affect the exit status
    pub fn hard_failures(&self) -> impl Iterator<Item = &CheckVerdict> {
        self.verdicts.iter().filter(|v| v.is_hard_failure())
    }

    /// Captures were compared and fell below the pass threshold
    pub fn has_visual_drift(&self) -> bool {
        self.diff.map_or(false, |d| !d.passed())
    }

    fn finish(mut self, status: CellStatus, started: Instant) -> Self {
        self.status = status;
        self.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Shared, read-only inputs of every cell in a run
pub(crate) struct CellContext {
    pub provider: Arc<dyn RenderingProvider>,
    pub reference: SourceRoot,
    pub candidate: SourceRoot,
    pub checks: Vec<CheckSpec>,
    pub differ: RasterDiffer,
    pub load_timeout: Duration,
    pub artifacts: ArtifactStore,
}

impl CellContext {
    fn root(&self, origin: Origin) -> &SourceRoot {
        match origin {
            Origin::Reference => &self.reference,
            Origin::Candidate => &self.candidate,
        }
    }
}

struct LoadFailure {
    origin: Origin,
    url: String,
    error: ParityError,
}

impl LoadFailure {
    fn new(origin: Origin, url: impl Into<String>, error: ParityError) -> Self {
        Self {
            origin,
            url: url.into(),
            error,
        }
    }

    fn into_status(self) -> CellStatus {
        CellStatus::LoadFailed {
            origin: self.origin,
            url: self.url,
            timed_out: self.error.is_timeout(),
            reason: self.error.to_string(),
        }
    }
}

/// Open a page for `origin` and load it, bounded by `timeout`
async fn open_and_load(
    ctx: &CellContext,
    origin: Origin,
    page: &PageTarget,
    viewport: &Viewport,
) -> std::result::Result<ScopedPage, LoadFailure> {
    let url = ctx
        .root(origin)
        .url_for(page)
        .map_err(|e| LoadFailure::new(origin, page.path(), e))?;

    let handle = ScopedPage::open(ctx.provider.as_ref(), viewport)
        .await
        .map_err(|e| LoadFailure::new(origin, url.as_str(), e))?;

    load(&*handle, &url, ctx.load_timeout)
        .await
        .map_err(|e| LoadFailure::new(origin, url.as_str(), e))?;

    Ok(handle)
}

async fn load(page: &dyn PageHandle, url: &Url, timeout: Duration) -> Result<()> {
    let navigation = async {
        page.goto(url.as_str()).await?;
        page.wait_for_network_idle(timeout).await
    };

    match tokio::time::timeout(timeout, navigation).await {
        Ok(loaded) => loaded,
        Err(_) => Err(ParityError::LoadTimeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

/// Diff two captures and encode the three rasters (CPU-bound)
fn render_diff(
    differ: RasterDiffer,
    reference: RasterImage,
    candidate: RasterImage,
) -> Result<(DiffResult, bool, CellImages)> {
    let diff = differ.compare(&reference, &candidate);
    let images = CellImages {
        reference_png: reference.to_png()?,
        candidate_png: candidate.to_png()?,
        diff_png: diff.visualization.to_png()?,
    };
    Ok((diff.result, diff.resampled, images))
}

/// Run one cell to completion
///
/// Only artifact I/O errors are returned as `Err`; everything that can go
/// wrong with the renderings is recorded in the report.
pub(crate) async fn run_cell(
    ctx: Arc<CellContext>,
    page: PageTarget,
    viewport: Viewport,
) -> Result<CellReport> {
    let started = Instant::now();
    let mut report = CellReport::new(page.clone(), viewport.clone());
    info!("Cell {} @ {}: starting", page, viewport.name);

    let (reference, candidate) = tokio::join!(
        open_and_load(&ctx, Origin::Reference, &page, &viewport),
        open_and_load(&ctx, Origin::Candidate, &page, &viewport),
    );
    let (reference, candidate) = match (reference, candidate) {
        (Ok(reference), Ok(candidate)) => (reference, candidate),
        (Err(failure), _) | (_, Err(failure)) => {
            warn!(
                "Cell {} @ {}: {} failed to load: {}",
                page, viewport.name, failure.origin, failure.error
            );
            return Ok(report.finish(failure.into_status(), started));
        }
    };

    report.verdicts = evaluate_catalogue(
        &ctx.checks,
        PagePair::new(&*reference, &*candidate),
        &page,
        &viewport,
    )
    .await;

    report.fonts = match extract::font_inventory(&*candidate).await {
        Ok(fonts) => fonts,
        Err(e) => {
            warn!("Cell {} @ {}: font inventory unavailable: {}", page, viewport.name, e);
            FontInventory::new()
        }
    };

    let mut shots = Vec::with_capacity(2);
    for (origin, handle) in [(Origin::Reference, &reference), (Origin::Candidate, &candidate)] {
        match handle.screenshot(true).await {
            Ok(shot) if shot.is_empty() => {
                warn!("Cell {} @ {}: {} capture is empty", page, viewport.name, origin);
                let status = CellStatus::CaptureFailed {
                    origin: Some(origin),
                    reason: format!("empty capture ({}x{})", shot.width(), shot.height()),
                };
                return Ok(report.finish(status, started));
            }
            Ok(shot) => shots.push(shot),
            Err(e) => {
                warn!("Cell {} @ {}: {} capture failed: {}", page, viewport.name, origin, e);
                let status = CellStatus::CaptureFailed {
                    origin: Some(origin),
                    reason: e.to_string(),
                };
                return Ok(report.finish(status, started));
            }
        }
    }

    // Handles are no longer needed once both captures exist
    drop(reference);
    drop(candidate);

    let (Some(candidate_shot), Some(reference_shot)) = (shots.pop(), shots.pop()) else {
        let status = CellStatus::CaptureFailed {
            origin: None,
            reason: "capture missing".to_string(),
        };
        return Ok(report.finish(status, started));
    };

    let differ = ctx.differ;
    let rendered =
        tokio::task::spawn_blocking(move || render_diff(differ, reference_shot, candidate_shot))
            .await
            .map_err(|e| ParityError::Other(format!("diff task failed: {}", e)))
            .and_then(|rendered| rendered);

    let (result, resampled, images) = match rendered {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!("Cell {} @ {}: comparison failed: {}", page, viewport.name, e);
            let status = CellStatus::CaptureFailed {
                origin: None,
                reason: e.to_string(),
            };
            return Ok(report.finish(status, started));
        }
    };

    report.artifacts = Some(
        ctx.artifacts
            .store_cell(&page, &viewport, &images, &result)
            .await?,
    );
    report.diff = Some(result);
    report.resampled = resampled;

    info!(
        "Cell {} @ {}: similarity {:.2}% ({}), {} hard failure(s)",
        page,
        viewport.name,
        result.similarity_percentage(),
        if result.passed() { "passed" } else { "below threshold" },
        report.hard_failures().count()
    );
    debug!("Cell {} @ {} took {:?}", page, viewport.name, started.elapsed());

    Ok(report.finish(CellStatus::Completed, started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_browser::fake::{FakeProvider, FakeSite};
    use parity_checks::Outcome;
    use parity_raster::DiffPolicy;
    use tempfile::TempDir;

    fn context(provider: Arc<FakeProvider>, output: &std::path::Path) -> Arc<CellContext> {
        Arc::new(CellContext {
            provider,
            reference: SourceRoot::parse("http://reference/").unwrap(),
            candidate: SourceRoot::parse("http://candidate/").unwrap(),
            checks: Vec::new(),
            differ: RasterDiffer::new(DiffPolicy::default()),
            load_timeout: Duration::from_millis(200),
            artifacts: ArtifactStore::new(output),
        })
    }

    #[tokio::test]
    async fn test_identical_renderings_complete() {
        let temp = TempDir::new().unwrap();
        let provider = FakeProvider::new()
            .with_site("http://reference/", FakeSite::new().with_fonts(&["Inter"]))
            .with_site("http://candidate/", FakeSite::new().with_fonts(&["Inter"]));
        let ctx = context(Arc::new(provider), temp.path());

        let report = run_cell(
            ctx,
            PageTarget::new("index.html"),
            Viewport::new("mobile", 40, 30),
        )
        .await
        .unwrap();

        assert!(report.is_completed());
        let diff = report.diff.unwrap();
        assert_eq!(diff.total_pixels(), 1200);
        assert_eq!(diff.different_pixels(), 0);
        assert!(diff.passed());
        assert_eq!(report.fonts.len(), 1);
        assert!(temp.path().join("index/mobile/diff.png").exists());
    }

    #[tokio::test]
    async fn test_unreachable_candidate_is_load_failure() {
        let temp = TempDir::new().unwrap();
        let provider = FakeProvider::new()
            .with_site("http://reference/", FakeSite::new())
            .with_site("http://candidate/", FakeSite::new().unreachable());
        let ctx = context(Arc::new(provider), temp.path());

        let report = run_cell(
            ctx,
            PageTarget::new("talks/index.html"),
            Viewport::new("desktop", 64, 48),
        )
        .await
        .unwrap();

        assert!(report.is_load_failure());
        match report.status {
            CellStatus::LoadFailed {
                origin,
                ref url,
                timed_out,
                ..
            } => {
                assert_eq!(origin, Origin::Candidate);
                assert_eq!(url, "http://candidate/talks/index.html");
                assert!(!timed_out);
            }
            ref other => panic!("unexpected status: {:?}", other),
        }
        assert!(report.verdicts.is_empty());
        assert!(report.diff.is_none());
    }

    #[tokio::test]
    async fn test_capture_failure_keeps_verdicts() {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(
            FakeProvider::new()
                .with_site("http://reference/", FakeSite::new().failing_screenshot())
                .with_site("http://candidate/", FakeSite::new()),
        );
        let mut ctx = context(Arc::clone(&provider), temp.path());
        Arc::get_mut(&mut ctx).unwrap().checks = vec![CheckSpec::new(
            "fonts_detected",
            parity_core::CheckKind::FontsDetected,
        )];

        let report = run_cell(ctx, PageTarget::new("index.html"), Viewport::new("mobile", 20, 20))
            .await
            .unwrap();

        assert!(report.is_capture_failure());
        assert_eq!(report.verdicts.len(), 1);
        assert!(matches!(report.verdicts[0].outcome, Outcome::Failed { .. }));
        assert_eq!(provider.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_empty_capture_is_not_compared() {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(
            FakeProvider::new()
                .with_site(
                    "http://reference/",
                    FakeSite::new().with_screenshot(RasterImage::filled(10, 10, [0, 0, 0])),
                )
                .with_site(
                    "http://candidate/",
                    FakeSite::new().with_screenshot(RasterImage::filled(0, 0, [0, 0, 0])),
                ),
        );
        let ctx = context(Arc::clone(&provider), temp.path());

        let report = run_cell(ctx, PageTarget::new("index.html"), Viewport::new("mobile", 10, 10))
            .await
            .unwrap();

        match report.status {
            CellStatus::CaptureFailed { origin, ref reason } => {
                assert_eq!(origin, Some(Origin::Candidate));
                assert!(reason.contains("empty capture"));
            }
            ref other => panic!("unexpected status: {:?}", other),
        }
        assert!(report.diff.is_none());
        assert!(!temp.path().join("index/mobile").exists());
        assert_eq!(provider.open_handles(), 0);
    }

    #[test]
    fn test_serialized_status_is_flat() {
        let mut report = CellReport::new(PageTarget::new("index.html"), Viewport::new("mobile", 375, 667));
        report.status = CellStatus::LoadFailed {
            origin: Origin::Reference,
            url: "http://reference/index.html".to_string(),
            reason: "timed out".to_string(),
            timed_out: true,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "load_failed");
        assert_eq!(json["origin"], "reference");
        assert_eq!(json["timed_out"], true);
        assert_eq!(json["page"], "index.html");
        assert!(json.get("diff").is_none());
    }
}
