//! Scalar cell values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal value held by one table cell.
///
/// Empty cells are represented as empty text, the same way the store reports
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Text(String::new())
    }
}

impl CellValue {
    /// The empty cell.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A text cell.
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Convert a JSON scalar into a cell.
    ///
    /// `null` becomes the empty cell; arrays and objects are kept as their
    /// JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::empty(),
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }

    /// True for empty or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }

    /// Numeric value, if this is a number cell.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text value, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the cell as an integer identifier.
    ///
    /// Accepts integral numbers and text that parses as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// True if this is text that starts a formula.
    pub fn is_formula_text(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.starts_with('='))
    }
}

/// Parse text the way a spreadsheet coerces a typed-in literal to a number.
///
/// Only plain decimal notation is accepted: optional sign, digits, and an
/// optional fractional part.
pub fn parse_numeric_literal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (digits, None),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let valid = all_digits(whole)
        && fraction.map_or(true, all_digits)
        && (!whole.is_empty() || fraction.is_some_and(|f| !f.is_empty()));

    if valid {
        trimmed.parse().ok()
    } else {
        None
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_scalars() {
        assert_eq!(CellValue::from_json(&json!(null)), CellValue::empty());
        assert_eq!(CellValue::from_json(&json!(true)), CellValue::Bool(true));
        assert_eq!(CellValue::from_json(&json!(12.5)), CellValue::Number(12.5));
        assert_eq!(CellValue::from_json(&json!("x")), CellValue::text("x"));
        assert_eq!(
            CellValue::from_json(&json!(["a", 1])),
            CellValue::text("[\"a\",1]")
        );
    }

    #[test]
    fn blank_detection() {
        assert!(CellValue::empty().is_blank());
        assert!(CellValue::text("  \t").is_blank());
        assert!(!CellValue::text("x").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
        assert!(!CellValue::Bool(false).is_blank());
    }

    #[test]
    fn integer_interpretation() {
        assert_eq!(CellValue::Number(42.0).as_integer(), Some(42));
        assert_eq!(CellValue::text(" 42 ").as_integer(), Some(42));
        assert_eq!(CellValue::Number(4.2).as_integer(), None);
        assert_eq!(CellValue::text("4x").as_integer(), None);
        assert_eq!(CellValue::Bool(true).as_integer(), None);
    }

    #[test]
    fn numeric_literal_parsing() {
        assert_eq!(parse_numeric_literal("42"), Some(42.0));
        assert_eq!(parse_numeric_literal(" -10.50 "), Some(-10.5));
        assert_eq!(parse_numeric_literal(".5"), Some(0.5));
        assert_eq!(parse_numeric_literal("7."), Some(7.0));
        assert_eq!(parse_numeric_literal(""), None);
        assert_eq!(parse_numeric_literal("."), None);
        assert_eq!(parse_numeric_literal("1e5"), None);
        assert_eq!(parse_numeric_literal("inf"), None);
        assert_eq!(parse_numeric_literal("2024-01-05"), None);
    }

    #[test]
    fn display_formats_integral_numbers_without_fraction() {
        assert_eq!(CellValue::Number(10.0).to_string(), "10");
        assert_eq!(CellValue::Number(10.25).to_string(), "10.25");
        assert_eq!(CellValue::Bool(true).to_string(), "TRUE");
        assert_eq!(CellValue::text("=A1").to_string(), "=A1");
    }

    #[test]
    fn serde_is_untagged() {
        let cells = vec![CellValue::Number(1.5), CellValue::text("a"), CellValue::Bool(false)];
        let json = serde_json::to_value(&cells).unwrap();
        assert_eq!(json, json!([1.5, "a", false]));
        let parsed: Vec<CellValue> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, cells);
    }
}
