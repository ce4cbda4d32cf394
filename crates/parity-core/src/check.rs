//! Declarative check catalogue
//!
//! Checks are plain data so a catalogue can be loaded from `parity.toml`.
//! Evaluation lives in `parity-checks`.

use serde::{Deserialize, Serialize};

use crate::types::{Origin, PageTarget, StyleProperty, Viewport};

/// Scrollbar allowance used by the overflow check
pub const DEFAULT_OVERFLOW_ALLOWANCE_PX: f64 = 15.0;

/// Font-size tolerance used by the heading comparison
pub const DEFAULT_FONT_SIZE_TOLERANCE_PX: f64 = 2.0;

/// One named check in the catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    /// Unique check name, used in reports
    pub name: String,

    /// What the check asserts
    #[serde(flatten)]
    pub kind: CheckKind,

    /// Renderings the check runs against
    #[serde(default)]
    pub targets: Targets,

    /// Viewport widths the check applies to
    #[serde(default)]
    pub gate: ViewportGate,

    /// Pages the check applies to (empty = every page)
    #[serde(default)]
    pub pages: Vec<PageTarget>,

    /// How a missing element is treated
    #[serde(default)]
    pub when_absent: WhenAbsent,

    /// Hard checks fail the run; soft checks are only reported
    #[serde(default = "default_hard")]
    pub hard: bool,
}

fn default_hard() -> bool {
    true
}

/// Assertion performed by a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    /// Every selector matches at least one element
    Exists { selectors: Vec<String> },
    /// Computed property equals an exact value
    PropertyEquals {
        selector: String,
        property: StyleProperty,
        expected: String,
    },
    /// Computed property is anything but a forbidden value
    PropertyDiffers {
        selector: String,
        property: StyleProperty,
        forbidden: String,
    },
    /// Pixel property of reference and candidate agree within a tolerance
    PropertyWithin {
        selector: String,
        property: StyleProperty,
        tolerance_px: f64,
    },
    /// `left` element's left edge is strictly left of `right`'s
    LeftOf { left: String, right: String },
    /// Every selector matches a visible element
    Visible { selectors: Vec<String> },
    /// Each text appears inside some element under `scope`
    TextPresent { scope: String, texts: Vec<String> },
    /// Document does not scroll horizontally beyond the allowance
    FitsViewport { allowance_px: f64 },
    /// At least one font family is in use
    FontsDetected,
}

impl CheckKind {
    /// Whether the check compares the two renderings rather than judging each
    pub fn is_comparative(&self) -> bool {
        matches!(self, Self::PropertyWithin { .. })
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exists { selectors } => write!(f, "exists: {}", selectors.join(", ")),
            Self::PropertyEquals {
                selector,
                property,
                expected,
            } => write!(f, "{} of '{}' == {}", property, selector, expected),
            Self::PropertyDiffers {
                selector,
                property,
                forbidden,
            } => write!(f, "{} of '{}' != {}", property, selector, forbidden),
            Self::PropertyWithin {
                selector,
                property,
                tolerance_px,
            } => write!(
                f,
                "{} of '{}' matches reference within {}px",
                property, selector, tolerance_px
            ),
            Self::LeftOf { left, right } => write!(f, "'{}' left of '{}'", left, right),
            Self::Visible { selectors } => write!(f, "visible: {}", selectors.join(", ")),
            Self::TextPresent { scope, texts } => {
                write!(f, "under '{}': {}", scope, texts.join(", "))
            }
            Self::FitsViewport { allowance_px } => {
                write!(f, "scroll width <= viewport width + {}px", allowance_px)
            }
            Self::FontsDetected => write!(f, "at least one font family in use"),
        }
    }
}

/// Renderings a check is evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Targets {
    Both,
    Reference,
    #[default]
    Candidate,
}

impl Targets {
    pub fn origins(&self) -> &'static [Origin] {
        match self {
            Self::Both => &Origin::BOTH,
            Self::Reference => &[Origin::Reference],
            Self::Candidate => &[Origin::Candidate],
        }
    }
}

/// Inclusive width bounds a viewport must satisfy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportGate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
}

impl ViewportGate {
    pub fn at_least(min_width: u32) -> Self {
        Self {
            min_width: Some(min_width),
            max_width: None,
        }
    }

    pub fn at_most(max_width: u32) -> Self {
        Self {
            min_width: None,
            max_width: Some(max_width),
        }
    }

    pub fn admits(&self, viewport: &Viewport) -> bool {
        self.min_width.map_or(true, |min| viewport.width >= min)
            && self.max_width.map_or(true, |max| viewport.width <= max)
    }
}

impl std::fmt::Display for ViewportGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min_width, self.max_width) {
            (None, None) => write!(f, "any width"),
            (Some(min), None) => write!(f, "width >= {}px", min),
            (None, Some(max)) => write!(f, "width <= {}px", max),
            (Some(min), Some(max)) => write!(f, "{}px <= width <= {}px", min, max),
        }
    }
}

/// Treatment of a check whose element is missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhenAbsent {
    /// Fail with "element not found"
    #[default]
    Fail,
    /// Skip: the check only constrains the element when it exists
    Skip,
}

impl CheckSpec {
    pub fn new(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
            targets: Targets::default(),
            gate: ViewportGate::default(),
            pages: Vec::new(),
            when_absent: WhenAbsent::default(),
            hard: true,
        }
    }

    pub fn with_targets(mut self, targets: Targets) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_gate(mut self, gate: ViewportGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn on_pages(mut self, pages: &[&str]) -> Self {
        self.pages = pages.iter().map(|p| PageTarget::new(*p)).collect();
        self
    }

    pub fn when_absent(mut self, when_absent: WhenAbsent) -> Self {
        self.when_absent = when_absent;
        self
    }

    pub fn soft(mut self) -> Self {
        self.hard = false;
        self
    }

    /// Whether the check is in scope for a page at all
    pub fn applies_to_page(&self, page: &PageTarget) -> bool {
        self.pages.is_empty() || self.pages.contains(page)
    }
}

const HEADER_DARK: &str = "rgb(18, 18, 18)";

/// Built-in catalogue used when the config does not provide one
pub fn default_catalogue() -> Vec<CheckSpec> {
    let home = ["index.html"];
    let nav_links = [
        "Publications",
        "Research",
        "Software",
        "Students",
        "Teaching",
        "Short Courses",
        "Talks",
        "Service",
    ];

    vec![
        CheckSpec::new(
            "header_exists",
            CheckKind::Exists {
                selectors: vec!["header".to_string()],
            },
        )
        .with_targets(Targets::Both)
        .on_pages(&home),
        CheckSpec::new(
            "header_background_color",
            CheckKind::PropertyEquals {
                selector: "header".to_string(),
                property: StyleProperty::BackgroundColor,
                expected: HEADER_DARK.to_string(),
            },
        )
        .with_targets(Targets::Both)
        .on_pages(&home),
        CheckSpec::new(
            "header_fixed_position",
            CheckKind::PropertyEquals {
                selector: "header".to_string(),
                property: StyleProperty::Position,
                expected: "fixed".to_string(),
            },
        )
        .with_gate(ViewportGate::at_least(992))
        .on_pages(&home),
        CheckSpec::new(
            "header_navigation_links",
            CheckKind::TextPresent {
                scope: "header".to_string(),
                texts: nav_links.iter().map(|t| t.to_string()).collect(),
            },
        )
        .on_pages(&home),
        CheckSpec::new("fonts_detected", CheckKind::FontsDetected).on_pages(&home),
        CheckSpec::new(
            "heading_font_size",
            CheckKind::PropertyWithin {
                selector: "header h1".to_string(),
                property: StyleProperty::FontSize,
                tolerance_px: DEFAULT_FONT_SIZE_TOLERANCE_PX,
            },
        )
        .when_absent(WhenAbsent::Skip)
        .on_pages(&home),
        CheckSpec::new(
            "main_exists",
            CheckKind::Exists {
                selectors: vec!["main".to_string()],
            },
        )
        .on_pages(&home),
        CheckSpec::new(
            "two_column_visible",
            CheckKind::Visible {
                selectors: vec!["aside".to_string(), "article".to_string()],
            },
        )
        .with_gate(ViewportGate::at_least(640))
        .on_pages(&home),
        CheckSpec::new(
            "two_column_order",
            CheckKind::LeftOf {
                left: "aside".to_string(),
                right: "article".to_string(),
            },
        )
        .with_gate(ViewportGate::at_least(640))
        .on_pages(&home),
        CheckSpec::new(
            "footer_exists",
            CheckKind::Exists {
                selectors: vec!["footer".to_string()],
            },
        )
        .on_pages(&home),
        CheckSpec::new(
            "footer_background_color",
            CheckKind::PropertyEquals {
                selector: "footer".to_string(),
                property: StyleProperty::BackgroundColor,
                expected: HEADER_DARK.to_string(),
            },
        )
        .on_pages(&home),
        CheckSpec::new(
            "link_color_not_black",
            CheckKind::PropertyDiffers {
                selector: "main a".to_string(),
                property: StyleProperty::Color,
                forbidden: "rgb(0, 0, 0)".to_string(),
            },
        )
        .when_absent(WhenAbsent::Skip)
        .on_pages(&home),
        CheckSpec::new(
            "mobile_navigation",
            CheckKind::Exists {
                selectors: vec!["nav".to_string()],
            },
        )
        .with_gate(ViewportGate::at_most(639))
        .on_pages(&home),
        CheckSpec::new(
            "content_fits_viewport",
            CheckKind::FitsViewport {
                allowance_px: DEFAULT_OVERFLOW_ALLOWANCE_PX,
            },
        )
        .on_pages(&home),
        CheckSpec::new(
            "skip_link_anchor",
            CheckKind::Exists {
                selectors: vec!["#main-content".to_string()],
            },
        )
        .on_pages(&home),
        CheckSpec::new(
            "semantic_structure",
            CheckKind::Exists {
                selectors: ["header", "main", "footer", "nav"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        )
        .on_pages(&home),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_bounds_are_inclusive() {
        let desktop_only = ViewportGate::at_least(992);
        assert!(!desktop_only.admits(&Viewport::new("mobile", 375, 667)));
        assert!(!desktop_only.admits(&Viewport::new("tablet", 768, 1024)));
        assert!(desktop_only.admits(&Viewport::new("edge", 992, 700)));
        assert!(desktop_only.admits(&Viewport::new("desktop", 1440, 900)));

        let mobile_only = ViewportGate::at_most(639);
        assert!(mobile_only.admits(&Viewport::new("mobile", 375, 667)));
        assert!(!mobile_only.admits(&Viewport::new("edge", 640, 480)));

        assert!(ViewportGate::default().admits(&Viewport::new("any", 1, 1)));
    }

    #[test]
    fn test_default_catalogue_names_are_unique() {
        let catalogue = default_catalogue();
        let mut names: Vec<&str> = catalogue.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), catalogue.len());
    }

    #[test]
    fn test_page_scope() {
        let check = CheckSpec::new("fonts_detected", CheckKind::FontsDetected).on_pages(&["index.html"]);
        assert!(check.applies_to_page(&PageTarget::new("index.html")));
        assert!(!check.applies_to_page(&PageTarget::new("talks/index.html")));

        let everywhere = CheckSpec::new("fonts_detected", CheckKind::FontsDetected);
        assert!(everywhere.applies_to_page(&PageTarget::new("talks/index.html")));
    }

    #[test]
    fn test_check_spec_from_toml() {
        let toml_src = r#"
            name = "header_background_color"
            kind = "property_equals"
            selector = "header"
            property = "background_color"
            expected = "rgb(18, 18, 18)"
            targets = "both"
            pages = ["index.html"]

            [gate]
            min_width = 992
        "#;

        let check: CheckSpec = toml::from_str(toml_src).unwrap();
        assert_eq!(check.targets, Targets::Both);
        assert_eq!(check.gate.min_width, Some(992));
        assert!(check.hard);
        assert_eq!(check.when_absent, WhenAbsent::Fail);
        match check.kind {
            CheckKind::PropertyEquals { property, expected, .. } => {
                assert_eq!(property, StyleProperty::BackgroundColor);
                assert_eq!(expected, "rgb(18, 18, 18)");
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_targets_origins() {
        assert_eq!(Targets::Both.origins().len(), 2);
        assert_eq!(Targets::default().origins(), &[Origin::Candidate]);
    }
}
