//! Sign and scale repair for numeric columns.
//!
//! Corrupted magnitudes are either negated or multiplied by ten. The repair is
//! shallow: one `abs()`, then at most one division by ten when
//! the value still exceeds the column's upper bound. Anything left out of
//! range is handed to the residual imputer. Discrete score columns that still
//! hold a value outside their allowed set take the group mode.

use std::collections::BTreeMap;

use claims_model::{
    AuditEntry, AuditLog, CellValue, ColumnSpec, Decision, LineSchema, MagnitudeMode, Stage,
};
use claims_validate::FieldValidator;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::frame::ClaimsFrame;
use crate::stats::mode;

/// Counts from [`correct_magnitudes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MagnitudeSummary {
    pub sign_flipped: usize,
    pub scale_shifted: usize,
    pub mode_fallbacks: usize,
}

impl MagnitudeSummary {
    pub fn total(&self) -> usize {
        self.sign_flipped + self.scale_shifted + self.mode_fallbacks
    }

    pub fn merge(&mut self, other: MagnitudeSummary) {
        self.sign_flipped += other.sign_flipped;
        self.scale_shifted += other.scale_shifted;
        self.mode_fallbacks += other.mode_fallbacks;
    }
}

/// Outcome of repairing a single value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repair {
    pub value: f64,
    pub sign_flipped: bool,
    pub scale_shifted: bool,
}

/// `abs()`, then one ÷10 when above `upper`.
pub fn repair_magnitude(value: f64, upper: Option<f64>) -> Repair {
    let sign_flipped = value < 0.0;
    let mut repaired = value.abs();
    let scale_shifted = upper.is_some_and(|hi| repaired > hi);
    if scale_shifted {
        repaired /= 10.0;
    }
    Repair {
        value: repaired,
        sign_flipped,
        scale_shifted,
    }
}

/// Repairs every column of `frame`'s table declared with a magnitude mode.
pub fn correct_magnitudes(
    frame: &ClaimsFrame,
    schema: &LineSchema,
    validator: &FieldValidator,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, MagnitudeSummary)> {
    let mut out = frame.clone();
    let mut summary = MagnitudeSummary::default();

    for spec in schema.columns_for(frame.table) {
        if spec.magnitude == MagnitudeMode::Off || !frame.has_column(&spec.name) {
            continue;
        }
        let upper = validator
            .rule(&spec.name)
            .and_then(|rule| rule.upper_bound())
            .or_else(|| spec.rule.upper_bound());
        let mut cells = out.cells(&spec.name)?;
        let mut changed = false;

        for (row, cell) in cells.iter_mut().enumerate() {
            let Some(value) = cell.as_f64() else {
                continue;
            };
            let repair = repair_magnitude(value, upper);
            if !repair.sign_flipped && !repair.scale_shifted {
                continue;
            }
            let decision = if repair.scale_shifted {
                summary.scale_shifted += 1;
                Decision::ScaleShifted
            } else {
                Decision::SignFlipped
            };
            if repair.sign_flipped {
                summary.sign_flipped += 1;
            }
            let next = CellValue::number(repair.value);
            audit.push(
                AuditEntry::new(Stage::Magnitude, frame.table, &spec.name, decision)
                    .with_row(row)
                    .with_candidates(vec![cell.clone()])
                    .with_chosen(next.clone()),
            );
            *cell = next;
            changed = true;
        }

        if spec.magnitude == MagnitudeMode::Discrete {
            let fallbacks = discrete_fallback(&out, schema, spec, validator, &mut cells, audit)?;
            summary.mode_fallbacks += fallbacks;
            changed |= fallbacks > 0;
        }

        if changed {
            out = out.with_cells(&spec.name, &cells)?;
        }
    }

    debug!(
        table = %frame.table,
        sign_flipped = summary.sign_flipped,
        scale_shifted = summary.scale_shifted,
        mode_fallbacks = summary.mode_fallbacks,
        "corrected magnitudes"
    );
    Ok((out, summary))
}

/// Replaces present-but-invalid discrete values with the group mode.
///
/// Groups come from the schema grouping column; a group with no valid value
/// uses the global mode. Missing cells are left for the imputer.
fn discrete_fallback(
    frame: &ClaimsFrame,
    schema: &LineSchema,
    spec: &ColumnSpec,
    validator: &FieldValidator,
    cells: &mut [CellValue],
    audit: &mut AuditLog,
) -> Result<usize> {
    let Some(rule) = validator.rule(&spec.name) else {
        return Ok(0);
    };
    let groups = frame.group_labels(schema, spec, validator)?;

    let mut valid_by_group: BTreeMap<&str, Vec<CellValue>> = BTreeMap::new();
    let mut valid_all = Vec::new();
    for (cell, group) in cells.iter().zip(&groups) {
        if rule.accepts(cell) {
            valid_all.push(cell.clone());
            if let Some(group) = group {
                valid_by_group
                    .entry(group.as_str())
                    .or_default()
                    .push(cell.clone());
            }
        }
    }
    let global = mode(&valid_all);
    let group_modes: BTreeMap<&str, Option<CellValue>> = valid_by_group
        .iter()
        .map(|(group, values)| (*group, mode(values)))
        .collect();

    let mut count = 0;
    for (row, (cell, group)) in cells.iter_mut().zip(&groups).enumerate() {
        if cell.is_missing() || rule.accepts(cell) {
            continue;
        }
        let replacement = group
            .as_deref()
            .and_then(|g| group_modes.get(g).cloned().flatten())
            .or_else(|| global.clone());
        let Some(replacement) = replacement else {
            continue;
        };
        audit.push(
            AuditEntry::new(
                Stage::Magnitude,
                frame.table,
                &spec.name,
                Decision::GroupModeFallback,
            )
            .with_row(row)
            .with_candidates(vec![cell.clone()])
            .with_chosen(replacement.clone()),
        );
        *cell = replacement;
        count += 1;
    }
    Ok(count)
}
