use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing numbers read from different tables.
///
/// Both tables go through the same CSV parser, so values that are "the same"
/// differ at most by float formatting noise.
pub const NUMERIC_EPSILON: f64 = 1e-9;

/// A single cell as seen by the reconciliation stages.
///
/// Columns arrive with whatever dtype the loader inferred, and corrupted
/// numeric columns are frequently inferred as text. Stages therefore work on
/// this loosely typed view and coerce when a rule asks for a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Missing,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Build a text cell, mapping blank strings to `Missing`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Self::Missing
        } else {
            Self::Text(value)
        }
    }

    /// Build a numeric cell, mapping NaN to `Missing`.
    pub fn number(value: f64) -> Self {
        if value.is_nan() {
            Self::Missing
        } else {
            Self::Number(value)
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Number(v) => v.is_nan(),
            Self::Text(s) => s.trim().is_empty(),
        }
    }

    /// Numeric view of the cell. Text is parsed after trimming.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Missing => None,
            Self::Number(v) if v.is_nan() => None,
            Self::Number(v) => Some(*v),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse::<f64>().ok()
                }
            }
        }
    }

    /// Text view of the cell. Numbers are formatted without trailing zeros.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Number(v) if v.is_nan() => None,
            Self::Number(v) => Some(format_number(*v)),
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s.clone()),
        }
    }

    /// Equality that tolerates `Text("0.6")` vs `Number(0.6)`.
    ///
    /// Two missing cells are equal; a missing cell never equals a present one.
    pub fn loosely_eq(&self, other: &Self) -> bool {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return true,
            (true, false) | (false, true) => return false,
            (false, false) => {}
        }
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.trim() == b.trim(),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() <= NUMERIC_EPSILON,
                _ => false,
            },
        }
    }

    /// Total order used for deterministic tie-breaks (mode selection).
    ///
    /// Missing sorts first, then numbers ascending, then text ascending.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(cell: &CellValue) -> u8 {
            match cell {
                CellValue::Missing => 0,
                CellValue::Number(_) => 1,
                CellValue::Text(_) => 2,
            }
        }
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "<missing>"),
            Self::Number(v) => write!(f, "{}", format_number(*v)),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::number)
    }
}

/// Formats a floating-point number without trailing zeros.
pub fn format_number(v: f64) -> String {
    let s = format!("{v}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_missing() {
        assert_eq!(CellValue::text("   "), CellValue::Missing);
        assert!(CellValue::Text(String::new()).is_missing());
    }

    #[test]
    fn format_number_keeps_integers() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(0.50), "0.5");
        assert_eq!(format_number(120.0), "120");
    }
}
