//! Core type definitions for Parity comparisons

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Named rendering size simulating a device class
///
/// Identity is the name: two viewports with the same name are the same
/// viewport regardless of size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Built-in viewport catalogue
    pub fn default_catalogue() -> Vec<Viewport> {
        vec![
            Viewport::new("mobile", 375, 667),
            Viewport::new("tablet", 768, 1024),
            Viewport::new("desktop", 1440, 900),
            Viewport::new("wide", 1920, 1080),
        ]
    }
}

impl PartialEq for Viewport {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Viewport {}

impl Hash for Viewport {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// Relative path of one page of the site under test
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageTarget(String);

impl PageTarget {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_start_matches('/').to_string())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe name, e.g. `publications/index.html` -> `publications_index`
    pub fn slug(&self) -> String {
        let stem = self.0.strip_suffix(".html").unwrap_or(&self.0);
        let slug: String = stem
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        if slug.is_empty() {
            "root".to_string()
        } else {
            slug
        }
    }

    /// Built-in page catalogue
    pub fn default_catalogue() -> Vec<PageTarget> {
        [
            "index.html",
            "publications/index.html",
            "research/index.html",
            "software/index.html",
            "students/index.html",
            "teaching/index.html",
            "short-courses/index.html",
            "talks/index.html",
            "service/index.html",
        ]
        .into_iter()
        .map(PageTarget::new)
        .collect()
    }
}

impl std::fmt::Display for PageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageTarget {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Which rendering a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Reference,
    Candidate,
}

impl Origin {
    pub const BOTH: [Origin; 2] = [Origin::Reference, Origin::Candidate];
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Candidate => write!(f, "candidate"),
        }
    }
}

/// Key of one matrix cell: a page rendered at a viewport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub page: PageTarget,
    pub viewport: String,
}

impl CellKey {
    pub fn new(page: &PageTarget, viewport: &Viewport) -> Self {
        Self {
            page: page.clone(),
            viewport: viewport.name.clone(),
        }
    }
}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.page
            .cmp(&other.page)
            .then_with(|| self.viewport.cmp(&other.viewport))
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.page, self.viewport)
    }
}

/// Computed style properties captured per element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleProperty {
    FontFamily,
    FontSize,
    FontWeight,
    Color,
    BackgroundColor,
    Display,
    Position,
    Width,
    Height,
    MarginTop,
    MarginBottom,
    PaddingTop,
    PaddingBottom,
    TextAlign,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 14] = [
        Self::FontFamily,
        Self::FontSize,
        Self::FontWeight,
        Self::Color,
        Self::BackgroundColor,
        Self::Display,
        Self::Position,
        Self::Width,
        Self::Height,
        Self::MarginTop,
        Self::MarginBottom,
        Self::PaddingTop,
        Self::PaddingBottom,
        Self::TextAlign,
    ];

    /// CSS property name
    pub fn css_name(&self) -> &'static str {
        match self {
            Self::FontFamily => "font-family",
            Self::FontSize => "font-size",
            Self::FontWeight => "font-weight",
            Self::Color => "color",
            Self::BackgroundColor => "background-color",
            Self::Display => "display",
            Self::Position => "position",
            Self::Width => "width",
            Self::Height => "height",
            Self::MarginTop => "margin-top",
            Self::MarginBottom => "margin-bottom",
            Self::PaddingTop => "padding-top",
            Self::PaddingBottom => "padding-bottom",
            Self::TextAlign => "text-align",
        }
    }
}

impl std::fmt::Display for StyleProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.css_name())
    }
}

impl std::str::FromStr for StyleProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|p| p.css_name() == normalized)
            .ok_or_else(|| format!("Unknown style property: {}", s))
    }
}

/// Cascade-resolved style of one element in one rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyleSnapshot {
    pub font_family: String,
    pub font_size: String,
    pub font_weight: String,
    pub color: String,
    pub background_color: String,
    pub display: String,
    pub position: String,
    pub width: String,
    pub height: String,
    pub margin_top: String,
    pub margin_bottom: String,
    pub padding_top: String,
    pub padding_bottom: String,
    pub text_align: String,
}

impl ComputedStyleSnapshot {
    pub fn get(&self, property: StyleProperty) -> &str {
        match property {
            StyleProperty::FontFamily => &self.font_family,
            StyleProperty::FontSize => &self.font_size,
            StyleProperty::FontWeight => &self.font_weight,
            StyleProperty::Color => &self.color,
            StyleProperty::BackgroundColor => &self.background_color,
            StyleProperty::Display => &self.display,
            StyleProperty::Position => &self.position,
            StyleProperty::Width => &self.width,
            StyleProperty::Height => &self.height,
            StyleProperty::MarginTop => &self.margin_top,
            StyleProperty::MarginBottom => &self.margin_bottom,
            StyleProperty::PaddingTop => &self.padding_top,
            StyleProperty::PaddingBottom => &self.padding_bottom,
            StyleProperty::TextAlign => &self.text_align,
        }
    }

    /// Builder-style setter, mostly useful for fixtures
    pub fn with(mut self, property: StyleProperty, value: impl Into<String>) -> Self {
        let value = value.into();
        let slot = match property {
            StyleProperty::FontFamily => &mut self.font_family,
            StyleProperty::FontSize => &mut self.font_size,
            StyleProperty::FontWeight => &mut self.font_weight,
            StyleProperty::Color => &mut self.color,
            StyleProperty::BackgroundColor => &mut self.background_color,
            StyleProperty::Display => &mut self.display,
            StyleProperty::Position => &mut self.position,
            StyleProperty::Width => &mut self.width,
            StyleProperty::Height => &mut self.height,
            StyleProperty::MarginTop => &mut self.margin_top,
            StyleProperty::MarginBottom => &mut self.margin_bottom,
            StyleProperty::PaddingTop => &mut self.padding_top,
            StyleProperty::PaddingBottom => &mut self.padding_bottom,
            StyleProperty::TextAlign => &mut self.text_align,
        };
        *slot = value;
        self
    }
}

/// Bounding box of one element in one rendering, in device pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometrySnapshot {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
}

impl GeometrySnapshot {
    /// Box at (x, y) with the given size; edges derived from position and size
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            top: y,
            left: x,
            right: x + width,
            bottom: y + height,
        }
    }
}

/// Distinct computed font-family values in use across a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontInventory {
    pub fonts: BTreeSet<String>,
}

impl FontInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn insert(&mut self, font: impl Into<String>) {
        self.fonts.insert(font.into());
    }

    /// Fold another inventory into this one
    pub fn merge(&mut self, other: &FontInventory) {
        self.fonts.extend(other.fonts.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.fonts.iter()
    }
}

impl FromIterator<String> for FontInventory {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            fonts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_viewport_identity_is_name() {
        let a = Viewport::new("desktop", 1440, 900);
        let b = Viewport::new("desktop", 1280, 800);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_page_slug() {
        assert_eq!(PageTarget::new("index.html").slug(), "index");
        assert_eq!(
            PageTarget::new("publications/index.html").slug(),
            "publications_index"
        );
        assert_eq!(
            PageTarget::new("/short-courses/index.html").slug(),
            "short-courses_index"
        );
        assert_eq!(PageTarget::new("").slug(), "root");
    }

    #[test]
    fn test_cell_key_ordering() {
        let desktop = Viewport::new("desktop", 1440, 900);
        let mobile = Viewport::new("mobile", 375, 667);
        let index = PageTarget::new("index.html");
        let talks = PageTarget::new("talks/index.html");

        let mut keys = vec![
            CellKey::new(&talks, &desktop),
            CellKey::new(&index, &mobile),
            CellKey::new(&index, &desktop),
        ];
        keys.sort();

        assert_eq!(keys[0], CellKey::new(&index, &desktop));
        assert_eq!(keys[1], CellKey::new(&index, &mobile));
        assert_eq!(keys[2].to_string(), "talks/index.html @ desktop");
    }

    #[test]
    fn test_style_property_parsing() {
        assert_eq!(
            "background-color".parse::<StyleProperty>().unwrap(),
            StyleProperty::BackgroundColor
        );
        assert_eq!(
            "font_size".parse::<StyleProperty>().unwrap(),
            StyleProperty::FontSize
        );
        assert!("z-index".parse::<StyleProperty>().is_err());
    }

    #[test]
    fn test_style_snapshot_json_shape() {
        let snapshot = ComputedStyleSnapshot::default()
            .with(StyleProperty::BackgroundColor, "rgb(18, 18, 18)")
            .with(StyleProperty::Position, "fixed");

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["backgroundColor"], "rgb(18, 18, 18)");
        assert_eq!(json["position"], "fixed");

        let back: ComputedStyleSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.get(StyleProperty::BackgroundColor), "rgb(18, 18, 18)");
    }

    #[test]
    fn test_geometry_from_rect() {
        let rect = GeometrySnapshot::from_rect(300.0, 80.0, 800.0, 600.0);
        assert_eq!(rect.left, 300.0);
        assert_eq!(rect.right, 1100.0);
        assert_eq!(rect.bottom, 680.0);
    }

    #[test]
    fn test_font_inventory_collapses_duplicates() {
        let mut fonts: FontInventory = ["Georgia, serif", "Inter", "Georgia, serif"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(fonts.len(), 2);

        let other: FontInventory = ["Arial".to_string()].into_iter().collect();
        fonts.merge(&other);

        let ordered: Vec<&String> = fonts.iter().collect();
        assert_eq!(ordered, vec!["Arial", "Georgia, serif", "Inter"]);

        let json = serde_json::to_value(&fonts).unwrap();
        assert_eq!(json["fonts"][0], "Arial");
    }
}
