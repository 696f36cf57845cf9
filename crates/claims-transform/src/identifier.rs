//! Fixed-format identifier normalization.
//!
//! Identifiers are corrupted by appending, so an over-long value is cut back
//! to its declared length. Sequentially generated identifiers can also be
//! recovered from the row above. Values that already have the declared length
//! are never rewritten.

use std::collections::BTreeMap;
use std::fmt;

use claims_model::{AuditEntry, AuditLog, CellValue, Decision, LineSchema, Stage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::ClaimsFrame;

/// Why an identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "length", rename_all = "snake_case")]
pub enum IdentifierIssue {
    Missing,
    IncorrectLength(usize),
}

impl fmt::Display for IdentifierIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierIssue::Missing => write!(f, "missing"),
            IdentifierIssue::IncorrectLength(n) => write!(f, "incorrect length ({n})"),
        }
    }
}

/// Result of sequential recovery over one column.
#[derive(Debug, Clone, PartialEq)]
pub struct SequentialRecovery {
    pub values: Vec<CellValue>,
    /// Rows filled from their predecessor, with the recovered value.
    pub recovered: Vec<(usize, String)>,
    /// Missing rows with no usable predecessor.
    pub unresolved: Vec<usize>,
}

/// Per-column outcome of [`normalize_identifiers`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentifierSummary {
    pub truncated: BTreeMap<String, usize>,
    pub recovered: BTreeMap<String, usize>,
    /// Remaining `(row, issue)` pairs per column after normalization.
    pub issues: BTreeMap<String, Vec<(usize, IdentifierIssue)>>,
}

impl IdentifierSummary {
    pub fn truncated_total(&self) -> usize {
        self.truncated.values().sum()
    }

    pub fn recovered_total(&self) -> usize {
        self.recovered.values().sum()
    }

    pub fn issue_total(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Cuts every text value longer than `length` down to `length` characters.
///
/// Returns the new values and the rows that changed.
pub fn truncate_identifiers(values: &[CellValue], length: usize) -> (Vec<CellValue>, Vec<usize>) {
    let mut out = values.to_vec();
    let mut changed = Vec::new();
    for (row, cell) in out.iter_mut().enumerate() {
        let Some(text) = cell.as_text() else {
            continue;
        };
        let text = text.trim();
        if char_len(text) > length {
            *cell = CellValue::text(text.chars().take(length).collect::<String>());
            changed.push(row);
        }
    }
    (out, changed)
}

/// Adds one to the last run of ASCII digits in `value`, keeping its width.
///
/// A carry out of the run widens it (`"A-99"` becomes `"A-100"`). Returns
/// `None` when `value` contains no digit.
pub fn increment_identifier(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |pos| pos + 1);

    let mut digits: Vec<u8> = bytes[start..end].to_vec();
    let mut carry = true;
    for digit in digits.iter_mut().rev() {
        if !carry {
            break;
        }
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            carry = false;
        }
    }
    let mut run = String::with_capacity(digits.len() + 1);
    if carry {
        run.push('1');
    }
    run.extend(digits.iter().map(|&b| char::from(b)));
    Some(format!("{}{}{}", &value[..start], run, &value[end..]))
}

/// Fills missing entries by incrementing the previous row's identifier.
///
/// A predecessor must be present and exactly `length` characters long; a
/// recovered value counts as a valid predecessor for the next row.
pub fn recover_sequential(values: &[CellValue], length: usize) -> SequentialRecovery {
    let mut out = values.to_vec();
    let mut recovered = Vec::new();
    let mut unresolved = Vec::new();
    for row in 0..out.len() {
        if !out[row].is_missing() {
            continue;
        }
        let next = row
            .checked_sub(1)
            .and_then(|prev| out[prev].as_text())
            .filter(|prev| char_len(prev) == length)
            .and_then(|prev| increment_identifier(&prev));
        match next {
            Some(value) => {
                out[row] = CellValue::Text(value.clone());
                recovered.push((row, value));
            }
            None => unresolved.push(row),
        }
    }
    SequentialRecovery {
        values: out,
        recovered,
        unresolved,
    }
}

/// `(row, issue)` for every value that is missing or not `length` long.
///
/// An empty list means the column is fully valid.
pub fn validate_identifiers(values: &[CellValue], length: usize) -> Vec<(usize, IdentifierIssue)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(row, cell)| match cell.as_text() {
            None => Some((row, IdentifierIssue::Missing)),
            Some(text) => {
                let n = char_len(text.trim());
                (n != length).then_some((row, IdentifierIssue::IncorrectLength(n)))
            }
        })
        .collect()
}

/// Applies every identifier spec declared for `frame`'s table.
///
/// Specs naming a column the frame lacks are skipped with a warning.
pub fn normalize_identifiers(
    frame: &ClaimsFrame,
    schema: &LineSchema,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, IdentifierSummary)> {
    let mut out = frame.clone();
    let mut summary = IdentifierSummary::default();

    for spec in schema.identifiers_for(frame.table) {
        if !frame.has_column(&spec.column) {
            warn!(table = %frame.table, column = %spec.column, "identifier column absent, skipped");
            continue;
        }
        if spec.length == 0 {
            continue;
        }
        let original = out.cells(&spec.column)?;
        let (mut values, truncated) = truncate_identifiers(&original, spec.length);
        for &row in &truncated {
            audit.push(
                AuditEntry::new(Stage::Identifier, frame.table, &spec.column, Decision::Truncated)
                    .with_row(row)
                    .with_candidates(vec![original[row].clone()])
                    .with_chosen(values[row].clone()),
            );
        }

        let mut recovered_count = 0;
        if spec.sequential {
            let recovery = recover_sequential(&values, spec.length);
            for (row, value) in &recovery.recovered {
                audit.push(
                    AuditEntry::new(
                        Stage::Identifier,
                        frame.table,
                        &spec.column,
                        Decision::SequentialRecovery,
                    )
                    .with_row(*row)
                    .with_candidates(vec![recovery.values[row - 1].clone()])
                    .with_chosen(CellValue::Text(value.clone())),
                );
            }
            for &row in &recovery.unresolved {
                audit.push(
                    AuditEntry::new(Stage::Identifier, frame.table, &spec.column, Decision::Unresolved)
                        .with_row(row),
                );
            }
            recovered_count = recovery.recovered.len();
            values = recovery.values;
        }

        let issues = validate_identifiers(&values, spec.length);
        if !issues.is_empty() {
            warn!(
                table = %frame.table,
                column = %spec.column,
                issues = issues.len(),
                "identifiers still invalid after normalization"
            );
        }
        debug!(
            table = %frame.table,
            column = %spec.column,
            truncated = truncated.len(),
            recovered = recovered_count,
            "normalized identifiers"
        );

        if !truncated.is_empty() || recovered_count > 0 {
            out = out.with_cells(&spec.column, &values)?;
        }
        summary.truncated.insert(spec.column.clone(), truncated.len());
        summary.recovered.insert(spec.column.clone(), recovered_count);
        summary.issues.insert(spec.column.clone(), issues);
    }
    Ok((out, summary))
}
