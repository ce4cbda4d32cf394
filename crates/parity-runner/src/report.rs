//! Run-wide report and CI summary

use chrono::{DateTime, Utc};
use parity_core::FontInventory;
use serde::Serialize;
use std::fmt::Write as _;

use crate::cell::{CellReport, CellStatus};

/// Policy a run was evaluated under
#[derive(Debug, Clone, Serialize)]
pub struct RunPolicy {
    pub pass_threshold: f64,
    pub pixel_threshold: u32,
    pub load_timeout_secs: f64,
    pub max_parallel_cells: usize,
    pub fail_on_visual_drift: bool,
}

/// Counts derived from the cell reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub cells: usize,
    pub completed: usize,
    pub load_failed: usize,
    pub capture_failed: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub checks_skipped: usize,
    pub hard_failures: usize,
    /// Compared cells whose similarity fell below the pass threshold
    pub visual_drift: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f64>,
}

impl RunSummary {
    pub fn from_cells(cells: &[CellReport]) -> Self {
        let mut summary = Self {
            cells: cells.len(),
            ..Self::default()
        };

        for cell in cells {
            match cell.status {
                CellStatus::Completed => summary.completed += 1,
                CellStatus::LoadFailed { .. } => summary.load_failed += 1,
                CellStatus::CaptureFailed { .. } => summary.capture_failed += 1,
            }
            for verdict in &cell.verdicts {
                if verdict.passed() {
                    summary.checks_passed += 1;
                } else if verdict.skipped() {
                    summary.checks_skipped += 1;
                } else {
                    summary.checks_failed += 1;
                }
            }
            summary.hard_failures += cell.hard_failures().count();
            if cell.has_visual_drift() {
                summary.visual_drift += 1;
            }
            if let Some(diff) = cell.diff {
                let similarity = diff.similarity_percentage();
                summary.min_similarity = Some(
                    summary
                        .min_similarity
                        .map_or(similarity, |min| min.min(similarity)),
                );
            }
        }

        summary
    }
}

/// Complete result of one run; built once after every cell finished
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reference: String,
    pub candidate: String,
    pub policy: RunPolicy,
    pub summary: RunSummary,
    /// Font families in use across all candidate renderings
    pub fonts: FontInventory,
    /// Cell reports ordered by (page, viewport)
    pub cells: Vec<CellReport>,
}

impl Report {
    pub fn new(
        started_at: DateTime<Utc>,
        reference: impl Into<String>,
        candidate: impl Into<String>,
        policy: RunPolicy,
        cells: Vec<CellReport>,
    ) -> Self {
        let mut fonts = FontInventory::new();
        for cell in &cells {
            fonts.merge(&cell.fonts);
        }

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            reference: reference.into(),
            candidate: candidate.into(),
            summary: RunSummary::from_cells(&cells),
            policy,
            fonts,
            cells,
        }
    }

    /// Whether the run passes: no hard failure, every cell loaded and compared,
    /// and no visual drift when the drift policy is enabled
    pub fn exit_ok(&self) -> bool {
        let s = &self.summary;
        s.hard_failures == 0
            && s.load_failed == 0
            && s.capture_failed == 0
            && (!self.policy.fail_on_visual_drift || s.visual_drift == 0)
    }

    /// Human/CI-readable summary listing every verdict and every similarity
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Parity run {}", self.run_id);
        let _ = writeln!(out, "Reference: {}", self.reference);
        let _ = writeln!(out, "Candidate: {}", self.candidate);
        let _ = writeln!(
            out,
            "Started {} ({:.1}s)",
            self.started_at.to_rfc3339(),
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        );
        out.push('\n');

        for cell in &self.cells {
            let _ = write!(out, "{}", cell.key());
            match &cell.status {
                CellStatus::Completed => match cell.diff {
                    Some(diff) => {
                        let _ = writeln!(
                            out,
                            ": similarity {:.2}% ({}{})",
                            diff.similarity_percentage(),
                            if diff.passed() { "ok" } else { "below threshold" },
                            if cell.resampled { ", resampled" } else { "" }
                        );
                    }
                    None => out.push_str(": completed\n"),
                },
                CellStatus::LoadFailed {
                    origin,
                    url,
                    reason,
                    timed_out,
                } => {
                    let kind = if *timed_out { "LOAD TIMEOUT" } else { "LOAD FAILED" };
                    let _ = writeln!(out, ": {} ({} {}): {}", kind, origin, url, reason);
                }
                CellStatus::CaptureFailed { origin, reason } => {
                    match origin {
                        Some(origin) => {
                            let _ = writeln!(out, ": CAPTURE FAILED ({}): {}", origin, reason);
                        }
                        None => {
                            let _ = writeln!(out, ": CAPTURE FAILED: {}", reason);
                        }
                    }
                }
            }
            for verdict in &cell.verdicts {
                let _ = writeln!(out, "  {}", verdict);
            }
        }

        out.push('\n');
        let fonts: Vec<&str> = self.fonts.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Fonts detected ({}): {}", fonts.len(), fonts.join(" | "));

        let s = &self.summary;
        let _ = writeln!(
            out,
            "Cells: {} ({} completed, {} load failed, {} capture failed)",
            s.cells, s.completed, s.load_failed, s.capture_failed
        );
        let _ = writeln!(
            out,
            "Checks: {} passed, {} failed ({} hard), {} skipped",
            s.checks_passed, s.checks_failed, s.hard_failures, s.checks_skipped
        );
        let drift_note = if self.policy.fail_on_visual_drift {
            "fatal"
        } else {
            "reported only"
        };
        let _ = writeln!(
            out,
            "Visual drift: {} cell(s) below {}% ({})",
            s.visual_drift, self.policy.pass_threshold, drift_note
        );
        let _ = writeln!(out, "Result: {}", if self.exit_ok() { "PASS" } else { "FAIL" });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_checks::{CheckVerdict, Outcome};
    use parity_core::{Origin, PageTarget, Viewport};
    use parity_raster::DiffResult;

    fn policy(fail_on_visual_drift: bool) -> RunPolicy {
        RunPolicy {
            pass_threshold: 95.0,
            pixel_threshold: 30,
            load_timeout_secs: 30.0,
            max_parallel_cells: 1,
            fail_on_visual_drift,
        }
    }

    fn completed(page: &str, viewport: &str, different: u64) -> CellReport {
        let mut cell = CellReport::new(PageTarget::new(page), Viewport::new(viewport, 10, 10));
        cell.diff = Some(DiffResult::new(100, different, 765, 95.0));
        cell
    }

    #[test]
    fn test_drift_alone_passes_by_default() {
        let cells = vec![completed("index.html", "desktop", 0), completed("index.html", "mobile", 40)];

        let lenient = Report::new(Utc::now(), "a", "b", policy(false), cells.clone());
        assert_eq!(lenient.summary.visual_drift, 1);
        assert_eq!(lenient.summary.min_similarity, Some(60.0));
        assert!(lenient.exit_ok());

        let strict = Report::new(Utc::now(), "a", "b", policy(true), cells);
        assert!(!strict.exit_ok());
    }

    #[test]
    fn test_hard_failure_fails_soft_does_not() {
        let mut cell = completed("index.html", "desktop", 0);
        cell.verdicts.push(CheckVerdict::new(
            "fonts_detected",
            Some(Origin::Candidate),
            false,
            Outcome::fail("no fonts"),
        ));
        let report = Report::new(Utc::now(), "a", "b", policy(false), vec![cell.clone()]);
        assert!(report.exit_ok());
        assert_eq!(report.summary.checks_failed, 1);
        assert_eq!(report.summary.hard_failures, 0);

        cell.verdicts.push(CheckVerdict::new(
            "main_exists",
            Some(Origin::Candidate),
            true,
            Outcome::element_not_found("main"),
        ));
        let report = Report::new(Utc::now(), "a", "b", policy(false), vec![cell]);
        assert!(!report.exit_ok());
        assert_eq!(report.summary.hard_failures, 1);
    }

    #[test]
    fn test_load_failure_fails_run_and_is_distinct() {
        let mut cell = CellReport::new(PageTarget::new("talks/index.html"), Viewport::new("mobile", 375, 667));
        cell.status = CellStatus::LoadFailed {
            origin: Origin::Candidate,
            url: "http://candidate/talks/index.html".to_string(),
            reason: "Timed out".to_string(),
            timed_out: true,
        };
        let report = Report::new(Utc::now(), "a", "b", policy(false), vec![cell]);

        assert!(!report.exit_ok());
        assert_eq!(report.summary.load_failed, 1);
        assert_eq!(report.summary.hard_failures, 0);

        let text = report.render_summary();
        assert!(text.contains("talks/index.html @ mobile: LOAD TIMEOUT (candidate http://candidate/talks/index.html)"));
        assert!(text.contains("Result: FAIL"));
    }

    #[test]
    fn test_summary_lists_verdicts_and_similarity() {
        let mut cell = completed("index.html", "desktop", 3);
        cell.verdicts.push(CheckVerdict::new(
            "header_exists",
            Some(Origin::Reference),
            true,
            Outcome::pass("'header' present (1 found)"),
        ));
        cell.fonts.insert("Inter");
        let report = Report::new(Utc::now(), "http://ref/", "http://cand/", policy(false), vec![cell]);

        let text = report.render_summary();
        assert!(text.contains("index.html @ desktop: similarity 97.00% (ok)"));
        assert!(text.contains("  PASS header_exists [reference]: 'header' present (1 found)"));
        assert!(text.contains("Fonts detected (1): Inter"));
        assert!(text.contains("Result: PASS"));
    }
}
