//! Text cleaning and numeric coercion.
//!
//! Every string column is trimmed and loses a trailing corruption suffix such
//! as `_???6689`. Columns whose rule is numeric then have their parseable text
//! cells turned into numbers so later stages compare like with like.

use std::collections::BTreeMap;

use claims_model::{AuditEntry, AuditLog, CellValue, Decision, Stage};
use claims_validate::FieldValidator;
use polars::prelude::DataType;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::ClaimsFrame;

/// Per-column counts from [`clean_text`] and [`coerce_numeric`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextSummary {
    /// Cells changed by trimming or suffix removal.
    pub cleaned: BTreeMap<String, usize>,
    /// Cells that lost a corruption suffix.
    pub suffixes_stripped: usize,
    /// Text cells converted to numbers.
    pub coerced: BTreeMap<String, usize>,
}

impl TextSummary {
    pub fn cleaned_total(&self) -> usize {
        self.cleaned.values().sum()
    }

    pub fn merge(&mut self, other: TextSummary) {
        for (column, count) in other.cleaned {
            *self.cleaned.entry(column).or_insert(0) += count;
        }
        for (column, count) in other.coerced {
            *self.coerced.entry(column).or_insert(0) += count;
        }
        self.suffixes_stripped += other.suffixes_stripped;
    }
}

/// Compiles the corruption suffix pattern, anchored at the end of the value.
///
/// An invalid pattern disables suffix stripping with a warning.
pub fn compile_suffix(pattern: &str) -> Option<Regex> {
    let anchored = if pattern.ends_with('$') {
        pattern.to_string()
    } else {
        format!("{pattern}$")
    };
    match Regex::new(&anchored) {
        Ok(regex) => Some(regex),
        Err(err) => {
            warn!(pattern, "invalid suffix pattern, suffix stripping disabled: {err}");
            None
        }
    }
}

/// Trims `value` and removes a trailing match of `suffix`.
///
/// Returns the cleaned text and whether a suffix was removed.
pub fn strip_suffix(value: &str, suffix: Option<&Regex>) -> (String, bool) {
    let trimmed = value.trim();
    match suffix.and_then(|re| re.find(trimmed)) {
        Some(found) if found.start() > 0 => (trimmed[..found.start()].trim_end().to_string(), true),
        _ => (trimmed.to_string(), false),
    }
}

/// Trims every string column of `frame` and strips corruption suffixes.
pub fn clean_text(
    frame: &ClaimsFrame,
    suffix: Option<&Regex>,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, TextSummary)> {
    let mut out = frame.clone();
    let mut summary = TextSummary::default();
    let names: Vec<String> = frame
        .data
        .get_column_names_owned()
        .iter()
        .map(ToString::to_string)
        .collect();

    for name in names {
        if frame.data.column(&name)?.dtype() != &DataType::String {
            continue;
        }
        let mut cells = frame.cells(&name)?;
        let mut changed = 0;
        for (row, cell) in cells.iter_mut().enumerate() {
            let CellValue::Text(original) = cell else {
                continue;
            };
            let (cleaned, stripped) = strip_suffix(original, suffix);
            if cleaned == *original {
                continue;
            }
            changed += 1;
            let next = CellValue::text(cleaned);
            if stripped {
                summary.suffixes_stripped += 1;
                audit.push(
                    AuditEntry::new(Stage::TextCleaning, frame.table, &name, Decision::SuffixStripped)
                        .with_row(row)
                        .with_candidates(vec![cell.clone()])
                        .with_chosen(next.clone()),
                );
            }
            *cell = next;
        }
        if changed > 0 {
            debug!(table = %frame.table, column = %name, changed, "cleaned text cells");
            out = out.with_cells(&name, &cells)?;
            summary.cleaned.insert(name, changed);
        }
    }
    Ok((out, summary))
}

/// Turns parseable text into numbers in `columns` whose rule is numeric.
///
/// Columns named in `always` are coerced even without a rule (amounts and
/// caps). Unparseable text is left alone for the validator to reject.
pub fn coerce_numeric(
    frame: &ClaimsFrame,
    validator: &FieldValidator,
    always: &[&str],
) -> Result<(ClaimsFrame, BTreeMap<String, usize>)> {
    let mut out = frame.clone();
    let mut coerced = BTreeMap::new();
    let mut targets: Vec<&str> = validator
        .columns()
        .filter(|name| validator.rule(name).is_some_and(|rule| rule.is_numeric()))
        .collect();
    for name in always {
        if !targets.contains(name) {
            targets.push(name);
        }
    }

    for name in targets {
        if !frame.has_column(name) {
            continue;
        }
        let mut cells = frame.cells(name)?;
        let mut count = 0;
        for cell in &mut cells {
            if let CellValue::Text(_) = cell
                && let Some(value) = cell.as_f64()
            {
                *cell = CellValue::number(value);
                count += 1;
            }
        }
        if count > 0 {
            out = out.with_cells(name, &cells)?;
            coerced.insert(name.to_string(), count);
        }
    }
    Ok((out, coerced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims_model::DEFAULT_SUFFIX_PATTERN;

    #[test]
    fn strips_suffix_after_trimming() {
        let re = compile_suffix(DEFAULT_SUFFIX_PATTERN);
        assert_eq!(
            strip_suffix("  BI-021624_XXX6689 ", re.as_ref()),
            ("BI-021624".to_string(), true)
        );
        assert_eq!(
            strip_suffix("gold_???12", re.as_ref()),
            ("gold".to_string(), true)
        );
        assert_eq!(strip_suffix(" gold ", re.as_ref()), ("gold".to_string(), false));
    }

    #[test]
    fn whole_value_matching_suffix_is_kept() {
        let re = compile_suffix(DEFAULT_SUFFIX_PATTERN);
        assert_eq!(strip_suffix("_XXX1", re.as_ref()), ("_XXX1".to_string(), false));
    }

    #[test]
    fn invalid_pattern_disables_stripping() {
        assert!(compile_suffix("_[").is_none());
        assert_eq!(strip_suffix("a_XXX1", None), ("a_XXX1".to_string(), false));
    }
}
