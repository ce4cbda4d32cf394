//! Pure assertion functions
//!
//! Each function judges already-extracted values and returns an [`Outcome`].
//! `None` stands for an element that does not exist in the rendering; every
//! assertion that needs the element fails with "element not found" instead.

use parity_core::{ComputedStyleSnapshot, FontInventory, GeometrySnapshot, StyleProperty};

use crate::verdict::Outcome;

/// At least one element matches `selector`
pub fn element_present(selector: &str, count: u32) -> Outcome {
    if count == 0 {
        Outcome::element_not_found(selector)
    } else {
        Outcome::pass(format!("'{}' present ({} found)", selector, count))
    }
}

/// Computed `property` equals `expected` exactly
pub fn property_equals(
    selector: &str,
    property: StyleProperty,
    expected: &str,
    style: Option<&ComputedStyleSnapshot>,
) -> Outcome {
    let Some(style) = style else {
        return Outcome::element_not_found(selector);
    };

    let observed = style.get(property);
    if observed == expected {
        Outcome::pass(format!("{} of '{}' is {}", property, selector, observed))
    } else {
        Outcome::mismatch(format!("{} of '{}'", property, selector), expected, observed)
    }
}

/// Computed `property` is anything but `forbidden`
pub fn property_differs(
    selector: &str,
    property: StyleProperty,
    forbidden: &str,
    style: Option<&ComputedStyleSnapshot>,
) -> Outcome {
    let Some(style) = style else {
        return Outcome::element_not_found(selector);
    };

    let observed = style.get(property);
    if observed != forbidden {
        Outcome::pass(format!("{} of '{}' is {}", property, selector, observed))
    } else {
        Outcome::mismatch(
            format!("{} of '{}' must not be {}", property, selector, forbidden),
            format!("not {}", forbidden),
            observed,
        )
    }
}

/// Parse a CSS pixel length such as `32px` or `17.5px`
pub fn parse_px(value: &str) -> Option<f64> {
    let number = value.trim().strip_suffix("px")?.trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Reference and candidate pixel values of `property` differ by at most `tolerance`
pub fn within_tolerance(
    selector: &str,
    property: StyleProperty,
    tolerance: f64,
    reference: Option<&ComputedStyleSnapshot>,
    candidate: Option<&ComputedStyleSnapshot>,
) -> Outcome {
    let (Some(reference), Some(candidate)) = (reference, candidate) else {
        return Outcome::element_not_found(selector);
    };

    let ref_raw = reference.get(property);
    let cand_raw = candidate.get(property);
    let (Some(ref_px), Some(cand_px)) = (parse_px(ref_raw), parse_px(cand_raw)) else {
        return Outcome::mismatch(
            format!("{} of '{}' is not a pixel length", property, selector),
            ref_raw,
            cand_raw,
        );
    };

    let delta = (ref_px - cand_px).abs();
    if delta <= tolerance {
        Outcome::pass(format!(
            "{} of '{}' {} vs {} (within {}px)",
            property, selector, ref_raw, cand_raw, tolerance
        ))
    } else {
        Outcome::mismatch(
            format!(
                "{} of '{}' differs by {}px (tolerance {}px)",
                property, selector, delta, tolerance
            ),
            ref_raw,
            cand_raw,
        )
    }
}

/// `left`'s left edge is strictly less than `right`'s
pub fn left_of(
    left_selector: &str,
    right_selector: &str,
    left: Option<&GeometrySnapshot>,
    right: Option<&GeometrySnapshot>,
) -> Outcome {
    let Some(left) = left else {
        return Outcome::element_not_found(left_selector);
    };
    let Some(right) = right else {
        return Outcome::element_not_found(right_selector);
    };

    if left.left < right.left {
        Outcome::pass(format!(
            "'{}' at left={} is left of '{}' at left={}",
            left_selector, left.left, right_selector, right.left
        ))
    } else {
        Outcome::mismatch(
            format!("'{}' is not left of '{}'", left_selector, right_selector),
            format!("left < {}", right.left),
            format!("left = {}", left.left),
        )
    }
}

/// The first element matching `selector` is visible
pub fn visible(selector: &str, visibility: Option<bool>) -> Outcome {
    match visibility {
        None => Outcome::element_not_found(selector),
        Some(true) => Outcome::pass(format!("'{}' visible", selector)),
        Some(false) => Outcome::mismatch(format!("'{}' is hidden", selector), "visible", "hidden"),
    }
}

/// Some element under `scope` contains `text`
pub fn text_present(scope: &str, text: &str, matches: u32) -> Outcome {
    if matches > 0 {
        Outcome::pass(format!("'{}' found under '{}'", text, scope))
    } else {
        Outcome::mismatch(
            format!("'{}' not found under '{}'", text, scope),
            text,
            "no match",
        )
    }
}

/// Document width does not exceed the viewport by more than `allowance`
pub fn fits_viewport(scroll_width: f64, viewport_width: u32, allowance: f64) -> Outcome {
    let limit = f64::from(viewport_width) + allowance;
    if scroll_width <= limit {
        Outcome::pass(format!(
            "scroll width {} within {}px viewport (+{}px)",
            scroll_width, viewport_width, allowance
        ))
    } else {
        Outcome::mismatch(
            format!("content overflows {}px viewport", viewport_width),
            format!("<= {}", limit),
            scroll_width.to_string(),
        )
    }
}

/// At least one font family is in use
pub fn fonts_detected(fonts: &FontInventory) -> Outcome {
    if fonts.is_empty() {
        Outcome::mismatch("no fonts detected", ">= 1 font family", "0")
    } else {
        Outcome::pass(format!("{} font families in use", fonts.len()))
    }
}

/// Combine outcomes: the first failure wins, otherwise all details are joined
pub fn all_of(outcomes: impl IntoIterator<Item = Outcome>) -> Outcome {
    let mut details = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Passed { detail } => details.push(detail),
            other => return other,
        }
    }
    Outcome::pass(details.join("; "))
}
