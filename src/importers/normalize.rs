//! Field extraction shared by the source adapters. Every helper has an
//! explicit fallback for missing or malformed upstream values.

use scraper::{ElementRef, Selector};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::ImportError;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const NOT_AVAILABLE: &str = "NA";

/// Parses the numeric prefix of `raw` ("6", " 12.5 points", "6CP").
pub fn leading_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let mut seen_dot = false;
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| match c {
            '0'..='9' => false,
            '-' => i > 0,
            '.' if i > 0 && !seen_dot => {
                seen_dot = true;
                false
            }
            _ => true,
        })
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Accepts JSON numbers and numeric strings alike.
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => leading_number(s),
        _ => None,
    }
}

pub fn credit_points_or(value: Option<&Value>, default: f64) -> f64 {
    value.and_then(number_from_value).unwrap_or(default)
}

pub fn str_from_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn label_or(raw: Option<&str>, fallback: &str) -> String {
    raw.and_then(non_empty).unwrap_or_else(|| fallback.to_string())
}

/// Deserializes each row of a bulk response separately. A row of the wrong
/// shape is logged and dropped; the rest still come back.
pub fn typed_rows<T: DeserializeOwned>(rows: Vec<Value>, source: &str) -> Vec<T> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(source, index, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect()
}

pub fn selector(css: &str) -> Result<Selector, ImportError> {
    Selector::parse(css).map_err(|e| ImportError::Parse(format!("bad selector {}: {}", css, e)))
}

/// Visible text of an element with runs of whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn first_text(root: ElementRef<'_>, selector: &Selector) -> String {
    root.select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}
