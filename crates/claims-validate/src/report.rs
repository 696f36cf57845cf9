//! Table-level validity report.

use claims_common::{column_cells, has_column};
use claims_model::{LineSchema, TableKind};
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::error::Result;
use crate::validator::FieldValidator;

const MAX_SAMPLES: usize = 5;

/// Validation issue - each variant carries only its needed data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// A declared column is absent from the table. Reported, never failing.
    ColumnMissing { column: String },
    /// Some values fail the column's rule.
    InvalidValues {
        column: String,
        invalid_count: usize,
        samples: Vec<String>,
        /// Column declares no fill, so invalid values are expected to survive.
        exempt: bool,
    },
}

impl Issue {
    pub fn column(&self) -> &str {
        match self {
            Issue::ColumnMissing { column } => column,
            Issue::InvalidValues { column, .. } => column,
        }
    }

    pub fn is_exempt(&self) -> bool {
        matches!(
            self,
            Issue::ColumnMissing { .. } | Issue::InvalidValues { exempt: true, .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: TableKind,
    pub rows: usize,
    pub checked_columns: usize,
    pub issues: Vec<Issue>,
}

impl TableReport {
    /// True when every present, non-exempt declared column is fully valid.
    pub fn is_clean(&self) -> bool {
        self.issues.iter().all(Issue::is_exempt)
    }

    pub fn invalid_count(&self) -> usize {
        self.issues
            .iter()
            .map(|issue| match issue {
                Issue::InvalidValues { invalid_count, .. } => *invalid_count,
                Issue::ColumnMissing { .. } => 0,
            })
            .sum()
    }
}

/// Check every declared column of `table` present in `df`.
///
/// Columns whose rule did not compile are not checked.
pub fn validate_table(
    validator: &FieldValidator,
    schema: &LineSchema,
    df: &DataFrame,
    table: TableKind,
) -> Result<TableReport> {
    let mut issues = Vec::new();
    let mut checked = 0;
    for spec in schema.columns_for(table) {
        let Some(rule) = validator.rule(&spec.name) else {
            continue;
        };
        if !has_column(df, &spec.name) {
            issues.push(Issue::ColumnMissing {
                column: spec.name.clone(),
            });
            continue;
        }
        checked += 1;
        let cells = column_cells(df, &spec.name)?;
        let mut invalid_count = 0;
        let mut samples = Vec::new();
        for cell in &cells {
            if rule.accepts(cell) {
                continue;
            }
            invalid_count += 1;
            let text = cell.to_string();
            if samples.len() < MAX_SAMPLES && !samples.contains(&text) {
                samples.push(text);
            }
        }
        if invalid_count > 0 {
            issues.push(Issue::InvalidValues {
                column: spec.name.clone(),
                invalid_count,
                samples,
                exempt: spec.fill.is_none() && spec.fallback.is_none(),
            });
        }
    }
    Ok(TableReport {
        table,
        rows: df.height(),
        checked_columns: checked,
        issues,
    })
}
