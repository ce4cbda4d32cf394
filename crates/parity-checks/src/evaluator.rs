//! Evaluate catalogue checks against a page pair

use parity_browser::{extract, PageHandle};
use parity_core::{CheckKind, CheckSpec, Origin, PageTarget, Result, Viewport, WhenAbsent};
use tracing::debug;

use crate::assertions;
use crate::verdict::{CheckVerdict, Outcome};

/// Reference and candidate renderings of the same cell
#[derive(Clone, Copy)]
pub struct PagePair<'a> {
    pub reference: &'a dyn PageHandle,
    pub candidate: &'a dyn PageHandle,
}

impl<'a> PagePair<'a> {
    pub fn new(reference: &'a dyn PageHandle, candidate: &'a dyn PageHandle) -> Self {
        Self {
            reference,
            candidate,
        }
    }

    pub fn get(&self, origin: Origin) -> &'a dyn PageHandle {
        match origin {
            Origin::Reference => self.reference,
            Origin::Candidate => self.candidate,
        }
    }
}

/// Evaluate every check in scope for `page`
///
/// Checks scoped to other pages produce no verdict; checks whose viewport
/// gate excludes `viewport` are recorded as skipped.
pub async fn evaluate_catalogue(
    specs: &[CheckSpec],
    pages: PagePair<'_>,
    page: &PageTarget,
    viewport: &Viewport,
) -> Vec<CheckVerdict> {
    let mut verdicts = Vec::new();
    for spec in specs.iter().filter(|spec| spec.applies_to_page(page)) {
        verdicts.extend(evaluate_check(spec, pages, viewport).await);
    }
    verdicts
}

/// Evaluate one check, yielding one verdict per judged rendering
pub async fn evaluate_check(
    spec: &CheckSpec,
    pages: PagePair<'_>,
    viewport: &Viewport,
) -> Vec<CheckVerdict> {
    if !spec.gate.admits(viewport) {
        let reason = format!("viewport {} outside {}", viewport, spec.gate);
        debug!("Skipping {}: {}", spec.name, reason);
        return vec![CheckVerdict::new(&spec.name, None, spec.hard, Outcome::skip(reason))];
    }

    if spec.kind.is_comparative() {
        let outcome = settle(spec, judge_pair(&spec.kind, pages).await);
        return vec![CheckVerdict::new(&spec.name, None, spec.hard, outcome)];
    }

    let mut verdicts = Vec::new();
    for &origin in spec.targets.origins() {
        let outcome = settle(spec, judge(&spec.kind, pages.get(origin), viewport).await);
        debug!("{} [{}]: {:?}", spec.name, origin, outcome);
        verdicts.push(CheckVerdict::new(&spec.name, Some(origin), spec.hard, outcome));
    }
    verdicts
}

/// Apply the absence policy and turn extraction errors into failures
fn settle(spec: &CheckSpec, judged: Result<Outcome>) -> Outcome {
    match judged {
        Ok(outcome) if outcome.is_element_absent() && spec.when_absent == WhenAbsent::Skip => {
            Outcome::skip(outcome.message().to_string())
        }
        Ok(outcome) => outcome,
        Err(e) => Outcome::fail(format!("could not evaluate: {}", e)),
    }
}

async fn judge(kind: &CheckKind, page: &dyn PageHandle, viewport: &Viewport) -> Result<Outcome> {
    let outcome = match kind {
        CheckKind::Exists { selectors } => {
            let mut outcomes = Vec::with_capacity(selectors.len());
            for selector in selectors {
                let count = extract::count(page, selector).await?;
                outcomes.push(assertions::element_present(selector, count));
            }
            assertions::all_of(outcomes)
        }
        CheckKind::PropertyEquals {
            selector,
            property,
            expected,
        } => {
            let style = extract::computed_style(page, selector).await?;
            assertions::property_equals(selector, *property, expected, style.as_ref())
        }
        CheckKind::PropertyDiffers {
            selector,
            property,
            forbidden,
        } => {
            let style = extract::computed_style(page, selector).await?;
            assertions::property_differs(selector, *property, forbidden, style.as_ref())
        }
        CheckKind::LeftOf { left, right } => {
            let left_rect = extract::geometry(page, left).await?;
            let right_rect = extract::geometry(page, right).await?;
            assertions::left_of(left, right, left_rect.as_ref(), right_rect.as_ref())
        }
        CheckKind::Visible { selectors } => {
            let mut outcomes = Vec::with_capacity(selectors.len());
            for selector in selectors {
                let visibility = extract::visibility(page, selector).await?;
                outcomes.push(assertions::visible(selector, visibility));
            }
            assertions::all_of(outcomes)
        }
        CheckKind::TextPresent { scope, texts } => {
            let mut outcomes = Vec::with_capacity(texts.len());
            for text in texts {
                let matches = extract::text_matches(page, scope, text).await?;
                outcomes.push(assertions::text_present(scope, text, matches));
            }
            assertions::all_of(outcomes)
        }
        CheckKind::FitsViewport { allowance_px } => {
            let width = extract::scroll_width(page).await?;
            assertions::fits_viewport(width, viewport.width, *allowance_px)
        }
        CheckKind::FontsDetected => {
            let fonts = extract::font_inventory(page).await?;
            assertions::fonts_detected(&fonts)
        }
        CheckKind::PropertyWithin { .. } => {
            Outcome::fail(format!("'{}' needs both renderings", kind))
        }
    };
    Ok(outcome)
}

async fn judge_pair(kind: &CheckKind, pages: PagePair<'_>) -> Result<Outcome> {
    match kind {
        CheckKind::PropertyWithin {
            selector,
            property,
            tolerance_px,
        } => {
            let reference = extract::computed_style(pages.reference, selector).await?;
            let candidate = extract::computed_style(pages.candidate, selector).await?;
            Ok(assertions::within_tolerance(
                selector,
                *property,
                *tolerance_px,
                reference.as_ref(),
                candidate.as_ref(),
            ))
        }
        other => Ok(Outcome::fail(format!("'{}' does not compare renderings", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_browser::fake::{FakeProvider, FakeSite};
    use parity_browser::ScopedPage;
    use parity_core::{
        default_catalogue, ComputedStyleSnapshot, GeometrySnapshot, StyleProperty, Targets,
        ViewportGate,
    };

    const REF: &str = "http://reference/";
    const CAND: &str = "http://candidate/";

    fn dark_header() -> ComputedStyleSnapshot {
        ComputedStyleSnapshot::default()
            .with(StyleProperty::BackgroundColor, "rgb(18, 18, 18)")
            .with(StyleProperty::Position, "fixed")
            .with(StyleProperty::FontSize, "32px")
    }

    async fn open_pair(
        provider: &FakeProvider,
        viewport: &Viewport,
    ) -> (ScopedPage, ScopedPage) {
        let reference = ScopedPage::open(provider, viewport).await.unwrap();
        reference.goto(&format!("{}index.html", REF)).await.unwrap();
        let candidate = ScopedPage::open(provider, viewport).await.unwrap();
        candidate.goto(&format!("{}index.html", CAND)).await.unwrap();
        (reference, candidate)
    }

    fn background_check() -> CheckSpec {
        CheckSpec::new(
            "header_background_color",
            CheckKind::PropertyEquals {
                selector: "header".to_string(),
                property: StyleProperty::BackgroundColor,
                expected: "rgb(18, 18, 18)".to_string(),
            },
        )
        .with_targets(Targets::Both)
    }

    #[tokio::test]
    async fn test_matching_header_passes_on_both_origins() {
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new().with_style("header", dark_header()))
            .with_site(CAND, FakeSite::new().with_style("header", dark_header()));
        let desktop = Viewport::new("desktop", 1440, 900);
        let (reference, candidate) = open_pair(&provider, &desktop).await;
        let pages = PagePair::new(&*reference, &*candidate);

        let exists = CheckSpec::new(
            "header_exists",
            CheckKind::Exists {
                selectors: vec!["header".to_string()],
            },
        )
        .with_targets(Targets::Both);

        let mut verdicts = evaluate_check(&exists, pages, &desktop).await;
        verdicts.extend(evaluate_check(&background_check(), pages, &desktop).await);

        assert_eq!(verdicts.len(), 4);
        assert!(verdicts.iter().all(|v| v.passed()), "{:?}", verdicts);
    }

    #[tokio::test]
    async fn test_white_candidate_header_fails() {
        let white = dark_header().with(StyleProperty::BackgroundColor, "rgb(255, 255, 255)");
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new().with_style("header", dark_header()))
            .with_site(CAND, FakeSite::new().with_style("header", white));
        let desktop = Viewport::new("desktop", 1440, 900);
        let (reference, candidate) = open_pair(&provider, &desktop).await;

        let verdicts = evaluate_check(
            &background_check(),
            PagePair::new(&*reference, &*candidate),
            &desktop,
        )
        .await;

        assert!(verdicts[0].passed());
        assert_eq!(verdicts[1].origin, Some(Origin::Candidate));
        assert_eq!(
            verdicts[1].outcome,
            Outcome::Failed {
                reason: "background-color of 'header'".to_string(),
                expected: Some("rgb(18, 18, 18)".to_string()),
                observed: Some("rgb(255, 255, 255)".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_gated_check_is_skipped_on_mobile() {
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new())
            .with_site(CAND, FakeSite::new());
        let mobile = Viewport::new("mobile", 375, 667);
        let (reference, candidate) = open_pair(&provider, &mobile).await;

        let fixed = CheckSpec::new(
            "header_fixed_position",
            CheckKind::PropertyEquals {
                selector: "header".to_string(),
                property: StyleProperty::Position,
                expected: "fixed".to_string(),
            },
        )
        .with_gate(ViewportGate::at_least(992));

        let verdicts = evaluate_check(&fixed, PagePair::new(&*reference, &*candidate), &mobile).await;
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].skipped());
        assert!(verdicts[0].outcome.message().contains("width >= 992px"));
    }

    #[tokio::test]
    async fn test_lenient_absence_skips() {
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new())
            .with_site(CAND, FakeSite::new());
        let desktop = Viewport::new("desktop", 1440, 900);
        let (reference, candidate) = open_pair(&provider, &desktop).await;
        let pages = PagePair::new(&*reference, &*candidate);

        let strict = CheckSpec::new(
            "main_exists",
            CheckKind::Exists {
                selectors: vec!["main".to_string()],
            },
        );
        let verdicts = evaluate_check(&strict, pages, &desktop).await;
        assert_eq!(verdicts[0].outcome.message(), "element not found: main");
        assert!(verdicts[0].is_hard_failure());

        let lenient = CheckSpec::new(
            "heading_font_size",
            CheckKind::PropertyWithin {
                selector: "header h1".to_string(),
                property: StyleProperty::FontSize,
                tolerance_px: 2.0,
            },
        )
        .when_absent(WhenAbsent::Skip);
        let verdicts = evaluate_check(&lenient, pages, &desktop).await;
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].origin, None);
        assert!(verdicts[0].skipped());
    }

    #[tokio::test]
    async fn test_column_order_by_geometry() {
        let aside = GeometrySnapshot::from_rect(0.0, 80.0, 280.0, 600.0);
        let article = GeometrySnapshot::from_rect(300.0, 80.0, 900.0, 600.0);
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new())
            .with_site(
                CAND,
                FakeSite::new()
                    .with_geometry("aside", aside)
                    .with_geometry("article", article),
            );
        let desktop = Viewport::new("desktop", 1440, 900);
        let (reference, candidate) = open_pair(&provider, &desktop).await;

        let order = CheckSpec::new(
            "two_column_order",
            CheckKind::LeftOf {
                left: "aside".to_string(),
                right: "article".to_string(),
            },
        );
        let verdicts = evaluate_check(&order, PagePair::new(&*reference, &*candidate), &desktop).await;
        assert!(verdicts[0].passed());

        let reversed = CheckSpec::new(
            "two_column_order",
            CheckKind::LeftOf {
                left: "article".to_string(),
                right: "aside".to_string(),
            },
        );
        let verdicts =
            evaluate_check(&reversed, PagePair::new(&*reference, &*candidate), &desktop).await;
        assert!(verdicts[0].failed());
    }

    #[tokio::test]
    async fn test_overflow_by_scroll_width() {
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new())
            .with_site("http://candidate/ok/", FakeSite::new().with_scroll_width(1450.0))
            .with_site(CAND, FakeSite::new().with_scroll_width(1470.0));
        let desktop = Viewport::new("desktop", 1440, 900);
        let fits = CheckSpec::new("content_fits_viewport", CheckKind::FitsViewport { allowance_px: 15.0 });

        let reference = ScopedPage::open(&provider, &desktop).await.unwrap();
        reference.goto("http://reference/index.html").await.unwrap();
        let candidate = ScopedPage::open(&provider, &desktop).await.unwrap();

        candidate.goto("http://candidate/ok/index.html").await.unwrap();
        let verdicts = evaluate_check(&fits, PagePair::new(&*reference, &*candidate), &desktop).await;
        assert!(verdicts[0].passed());

        candidate.goto("http://candidate/index.html").await.unwrap();
        let verdicts = evaluate_check(&fits, PagePair::new(&*reference, &*candidate), &desktop).await;
        assert!(verdicts[0].failed());
    }

    #[tokio::test]
    async fn test_default_catalogue_scope() {
        let provider = FakeProvider::new()
            .with_site(REF, FakeSite::new())
            .with_site(CAND, FakeSite::new());
        let mobile = Viewport::new("mobile", 375, 667);
        let (reference, candidate) = open_pair(&provider, &mobile).await;
        let pages = PagePair::new(&*reference, &*candidate);
        let catalogue = default_catalogue();

        // only index.html is checked
        let other = evaluate_catalogue(&catalogue, pages, &PageTarget::new("talks/index.html"), &mobile).await;
        assert!(other.is_empty());

        let verdicts = evaluate_catalogue(&catalogue, pages, &PageTarget::new("index.html"), &mobile).await;
        let find = |name: &str| verdicts.iter().find(|v| v.check == name).unwrap();
        assert!(find("header_fixed_position").skipped());
        assert!(find("two_column_visible").skipped());
        assert!(find("content_fits_viewport").passed());
        assert!(find("mobile_navigation").failed());
        assert!(find("link_color_not_black").skipped());
    }
}
