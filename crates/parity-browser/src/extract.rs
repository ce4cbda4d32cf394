//! Typed extraction from rendered pages
//!
//! Every query is turned into a page script that returns its result through
//! `JSON.stringify`, and the payload is validated into one of a closed set of
//! [`Extraction`] variants before anything else sees it. A selector that
//! matches nothing yields [`Extraction::Absent`], never an error.

use parity_core::{ComputedStyleSnapshot, FontInventory, GeometrySnapshot, ParityError, Result};
use serde_json::Value;
use tracing::debug;

use crate::provider::PageHandle;

/// Question asked of a rendered page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Computed style of the first element matching the selector
    Style(String),
    /// Bounding box of the first element matching the selector
    Geometry(String),
    /// Distinct computed font families across the document
    Fonts,
    /// Number of elements matching the selector
    Count(String),
    /// Whether the first element matching the selector is visible
    Visible(String),
    /// Number of elements under `scope` whose text contains `text`
    TextWithin { scope: String, text: String },
    /// Scroll width of the document body
    ScrollWidth,
}

/// Validated answer to a [`Query`]
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Style(ComputedStyleSnapshot),
    Geometry(GeometrySnapshot),
    Fonts(FontInventory),
    Count(u32),
    Visible(bool),
    ScrollWidth(f64),
    /// No element matched the selector
    Absent,
}

const STYLE_BODY: &str = r#"
    const s = window.getComputedStyle(el);
    return JSON.stringify({
        fontFamily: s.fontFamily,
        fontSize: s.fontSize,
        fontWeight: s.fontWeight,
        color: s.color,
        backgroundColor: s.backgroundColor,
        display: s.display,
        position: s.position,
        width: s.width,
        height: s.height,
        marginTop: s.marginTop,
        marginBottom: s.marginBottom,
        paddingTop: s.paddingTop,
        paddingBottom: s.paddingBottom,
        textAlign: s.textAlign,
    });"#;

const GEOMETRY_BODY: &str = r#"
    const r = el.getBoundingClientRect();
    return JSON.stringify({
        x: r.x, y: r.y, width: r.width, height: r.height,
        top: r.top, left: r.left, right: r.right, bottom: r.bottom,
    });"#;

const VISIBLE_BODY: &str = r#"
    const s = window.getComputedStyle(el);
    const r = el.getBoundingClientRect();
    return JSON.stringify(
        s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0
    );"#;

const FONTS_SCRIPT: &str = r#"(() => {
    const fonts = new Set();
    document.querySelectorAll('*').forEach(el => {
        fonts.add(window.getComputedStyle(el).fontFamily);
    });
    return JSON.stringify(Array.from(fonts));
})()"#;

const SCROLL_WIDTH_SCRIPT: &str = "(() => JSON.stringify(document.body.scrollWidth))()";

impl Query {
    pub fn style(selector: impl Into<String>) -> Self {
        Self::Style(selector.into())
    }

    pub fn geometry(selector: impl Into<String>) -> Self {
        Self::Geometry(selector.into())
    }

    pub fn count(selector: impl Into<String>) -> Self {
        Self::Count(selector.into())
    }

    pub fn visible(selector: impl Into<String>) -> Self {
        Self::Visible(selector.into())
    }

    pub fn text_within(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Self::TextWithin {
            scope: scope.into(),
            text: text.into(),
        }
    }

    /// Page script answering this query
    ///
    /// Selectors and texts are embedded as JSON string literals, never spliced raw.
    pub fn script(&self) -> String {
        match self {
            Self::Style(selector) => first_match(selector, STYLE_BODY),
            Self::Geometry(selector) => first_match(selector, GEOMETRY_BODY),
            Self::Visible(selector) => first_match(selector, VISIBLE_BODY),
            Self::Count(selector) => format!(
                "(() => JSON.stringify(document.querySelectorAll({}).length))()",
                js_string(selector)
            ),
            Self::TextWithin { scope, text } => format!(
                r#"(() => {{
    const text = {};
    const matches = Array.from(document.querySelectorAll({} + ' *'))
        .filter(el => (el.textContent || '').includes(text));
    return JSON.stringify(matches.length);
}})()"#,
                js_string(text),
                js_string(scope)
            ),
            Self::Fonts => FONTS_SCRIPT.to_string(),
            Self::ScrollWidth => SCROLL_WIDTH_SCRIPT.to_string(),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Style(selector) => write!(f, "style of '{}'", selector),
            Self::Geometry(selector) => write!(f, "geometry of '{}'", selector),
            Self::Fonts => write!(f, "font inventory"),
            Self::Count(selector) => write!(f, "count of '{}'", selector),
            Self::Visible(selector) => write!(f, "visibility of '{}'", selector),
            Self::TextWithin { scope, text } => write!(f, "text '{}' within '{}'", text, scope),
            Self::ScrollWidth => write!(f, "body scroll width"),
        }
    }
}

fn first_match(selector: &str, body: &str) -> String {
    format!(
        "(() => {{\n    const el = document.querySelector({});\n    if (!el) return JSON.stringify(null);{}\n}})()",
        js_string(selector),
        body
    )
}

fn js_string(value: &str) -> String {
    // JSON string literals are valid JavaScript string literals
    Value::String(value.to_string()).to_string()
}

/// Validate a raw script result into the variant expected for `query`
pub fn validate(query: &Query, raw: Value) -> Result<Extraction> {
    // Page scripts return JSON text; structured values are accepted as-is
    let payload = match raw {
        Value::String(text) => serde_json::from_str(&text).map_err(|e| {
            ParityError::Extraction(format!("{}: result is not JSON: {}", query, e))
        })?,
        other => other,
    };

    let unexpected = |payload: &Value| {
        ParityError::Extraction(format!("{}: unexpected payload {}", query, payload))
    };

    match query {
        Query::Style(_) => match payload {
            Value::Null => Ok(Extraction::Absent),
            Value::Object(_) => serde_json::from_value(payload)
                .map(Extraction::Style)
                .map_err(|e| ParityError::Extraction(format!("{}: {}", query, e))),
            other => Err(unexpected(&other)),
        },
        Query::Geometry(_) => match payload {
            Value::Null => Ok(Extraction::Absent),
            Value::Object(_) => serde_json::from_value(payload)
                .map(Extraction::Geometry)
                .map_err(|e| ParityError::Extraction(format!("{}: {}", query, e))),
            other => Err(unexpected(&other)),
        },
        Query::Visible(_) => match payload {
            Value::Null => Ok(Extraction::Absent),
            Value::Bool(visible) => Ok(Extraction::Visible(visible)),
            other => Err(unexpected(&other)),
        },
        Query::Count(_) | Query::TextWithin { .. } => payload
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Extraction::Count)
            .ok_or_else(|| unexpected(&payload)),
        Query::ScrollWidth => payload
            .as_f64()
            .map(Extraction::ScrollWidth)
            .ok_or_else(|| unexpected(&payload)),
        Query::Fonts => match payload {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(font) => Ok(font),
                    other => Err(unexpected(&other)),
                })
                .collect::<Result<FontInventory>>()
                .map(Extraction::Fonts),
            other => Err(unexpected(&other)),
        },
    }
}

/// Run a query against a page
pub async fn extract(page: &dyn PageHandle, query: &Query) -> Result<Extraction> {
    debug!("Extracting {}", query);
    let raw = page.evaluate(&query.script()).await?;
    validate(query, raw)
}

/// Computed style of the first element matching `selector`, `None` when absent
pub async fn computed_style(
    page: &dyn PageHandle,
    selector: &str,
) -> Result<Option<ComputedStyleSnapshot>> {
    let query = Query::style(selector);
    match extract(page, &query).await? {
        Extraction::Style(style) => Ok(Some(style)),
        Extraction::Absent => Ok(None),
        other => Err(mismatch(&query, &other)),
    }
}

/// Bounding box of the first element matching `selector`, `None` when absent
pub async fn geometry(page: &dyn PageHandle, selector: &str) -> Result<Option<GeometrySnapshot>> {
    let query = Query::geometry(selector);
    match extract(page, &query).await? {
        Extraction::Geometry(rect) => Ok(Some(rect)),
        Extraction::Absent => Ok(None),
        other => Err(mismatch(&query, &other)),
    }
}

/// Visibility of the first element matching `selector`, `None` when absent
pub async fn visibility(page: &dyn PageHandle, selector: &str) -> Result<Option<bool>> {
    let query = Query::visible(selector);
    match extract(page, &query).await? {
        Extraction::Visible(visible) => Ok(Some(visible)),
        Extraction::Absent => Ok(None),
        other => Err(mismatch(&query, &other)),
    }
}

/// Number of elements matching `selector`
pub async fn count(page: &dyn PageHandle, selector: &str) -> Result<u32> {
    let query = Query::count(selector);
    expect_count(page, &query).await
}

/// Number of elements under `scope` whose text contains `text`
pub async fn text_matches(page: &dyn PageHandle, scope: &str, text: &str) -> Result<u32> {
    let query = Query::text_within(scope, text);
    expect_count(page, &query).await
}

/// Distinct computed font families in use across the document
pub async fn font_inventory(page: &dyn PageHandle) -> Result<FontInventory> {
    match extract(page, &Query::Fonts).await? {
        Extraction::Fonts(fonts) => Ok(fonts),
        other => Err(mismatch(&Query::Fonts, &other)),
    }
}

/// Scroll width of the document body in CSS pixels
pub async fn scroll_width(page: &dyn PageHandle) -> Result<f64> {
    match extract(page, &Query::ScrollWidth).await? {
        Extraction::ScrollWidth(width) => Ok(width),
        other => Err(mismatch(&Query::ScrollWidth, &other)),
    }
}

async fn expect_count(page: &dyn PageHandle, query: &Query) -> Result<u32> {
    match extract(page, query).await? {
        Extraction::Count(n) => Ok(n),
        other => Err(mismatch(query, &other)),
    }
}

fn mismatch(query: &Query, extraction: &Extraction) -> ParityError {
    ParityError::Extraction(format!("{}: unexpected extraction {:?}", query, extraction))
}
