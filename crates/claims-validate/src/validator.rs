use std::collections::BTreeMap;

use claims_common::column_cells;
use claims_model::{CellValue, LineSchema};
use claims_standards::SchemaWarning;
use polars::prelude::DataFrame;
use tracing::warn;

use crate::error::{Result, ValidateError};
use crate::rule::CompiledRule;

/// Per-column validity predicates for one schema.
#[derive(Debug, Clone, Default)]
pub struct FieldValidator {
    rules: BTreeMap<String, CompiledRule>,
    warnings: Vec<SchemaWarning>,
}

impl FieldValidator {
    /// Compile every column rule in `schema`.
    ///
    /// Malformed rules are skipped with a warning; the first declaration of a
    /// column wins over later duplicates.
    pub fn from_schema(schema: &LineSchema) -> Self {
        let mut rules = BTreeMap::new();
        let mut warnings = Vec::new();
        for column in &schema.columns {
            if rules.contains_key(&column.name) {
                continue;
            }
            match CompiledRule::compile(&column.rule) {
                Ok(rule) => {
                    rules.insert(column.name.clone(), rule);
                }
                Err(reason) => {
                    warn!(
                        schema = %schema.name,
                        column = %column.name,
                        rule = column.rule.kind_name(),
                        "skipping column: {reason}"
                    );
                    warnings.push(SchemaWarning::new(
                        &schema.name,
                        Some(&column.name),
                        format!("{reason}; column skipped"),
                    ));
                }
            }
        }
        Self { rules, warnings }
    }

    /// Whether `value` satisfies the rule declared for `column`.
    pub fn validate(&self, column: &str, value: &CellValue) -> Result<bool> {
        self.rules
            .get(column)
            .map(|rule| rule.accepts(value))
            .ok_or_else(|| ValidateError::UnknownColumn {
                column: column.to_string(),
            })
    }

    /// Like [`validate`](Self::validate), treating unknown columns as valid.
    pub fn is_valid(&self, column: &str, value: &CellValue) -> bool {
        self.rules.get(column).is_none_or(|rule| rule.accepts(value))
    }

    pub fn knows(&self, column: &str) -> bool {
        self.rules.contains_key(column)
    }

    pub fn rule(&self, column: &str) -> Option<&CompiledRule> {
        self.rules.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Rules that failed to compile.
    pub fn warnings(&self) -> &[SchemaWarning] {
        &self.warnings
    }

    /// Validity of every row of `column` in `df`.
    pub fn column_mask(&self, df: &DataFrame, column: &str) -> Result<Vec<bool>> {
        let rule = self
            .rules
            .get(column)
            .ok_or_else(|| ValidateError::UnknownColumn {
                column: column.to_string(),
            })?;
        let cells = column_cells(df, column)?;
        Ok(cells.iter().map(|cell| rule.accepts(cell)).collect())
    }
}
