//! Table frame type passed between cleaning stages.
//!
//! A [`ClaimsFrame`] is a Polars `DataFrame` tagged with the table it holds.
//! Stages take a frame by reference and return a new one; cloning a
//! `DataFrame` shares column buffers, so the input snapshot stays intact at
//! little cost.

use claims_common::{column_cells, has_column, write_cells};
use claims_model::{CellValue, ColumnSpec, LineSchema, TableKind};
use claims_validate::FieldValidator;
use polars::prelude::DataFrame;

use crate::error::{Result, TransformError};

/// A policy or claim table.
#[derive(Debug, Clone)]
pub struct ClaimsFrame {
    /// Which table this is.
    pub table: TableKind,
    /// The table contents.
    pub data: DataFrame,
}

impl ClaimsFrame {
    pub fn new(table: TableKind, data: DataFrame) -> Self {
        Self { table, data }
    }

    pub fn policies(data: DataFrame) -> Self {
        Self::new(TableKind::Policy, data)
    }

    pub fn claims(data: DataFrame) -> Self {
        Self::new(TableKind::Claim, data)
    }

    /// Returns the number of records in the frame.
    pub fn record_count(&self) -> usize {
        self.data.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        has_column(&self.data, name)
    }

    /// Fails with [`TransformError::MissingKeyColumn`] when `name` is absent.
    pub fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(TransformError::MissingKeyColumn {
                table: self.table,
                column: name.to_string(),
            })
        }
    }

    pub fn cells(&self, name: &str) -> Result<Vec<CellValue>> {
        Ok(column_cells(&self.data, name)?)
    }

    /// Normalized key per row; `None` where the key is missing.
    pub fn keys(&self, name: &str) -> Result<Vec<Option<String>>> {
        Ok(self.cells(name)?.iter().map(key_of).collect())
    }

    /// Copy of this frame with column `name` replaced by `cells`.
    pub fn with_cells(&self, name: &str, cells: &[CellValue]) -> Result<Self> {
        let mut data = self.data.clone();
        write_cells(&mut data, name, cells)?;
        Ok(Self::new(self.table, data))
    }

    pub fn into_inner(self) -> DataFrame {
        self.data
    }

    /// Group label per row for the group-wise statistics of `spec`.
    ///
    /// A row whose grouping value is missing or invalid has no group. Without
    /// a usable grouping column every row is ungrouped.
    pub fn group_labels(
        &self,
        schema: &LineSchema,
        spec: &ColumnSpec,
        validator: &FieldValidator,
    ) -> Result<Vec<Option<String>>> {
        match schema.group_column_for(spec) {
            Some(group) if group != spec.name && self.has_column(group) => Ok(self
                .cells(group)?
                .iter()
                .map(|cell| {
                    if validator.is_valid(group, cell) {
                        key_of(cell)
                    } else {
                        None
                    }
                })
                .collect()),
            _ => Ok(vec![None; self.record_count()]),
        }
    }
}

/// Join-key view of a cell: trimmed text, `None` when missing.
pub fn key_of(cell: &CellValue) -> Option<String> {
    cell.as_text()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
