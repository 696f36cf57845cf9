//! Structural checks on a loaded schema.
//!
//! Nothing here is fatal. The pipeline skips or degrades the affected
//! column and carries these warnings into its report.

use std::collections::BTreeSet;
use std::fmt;

use claims_model::{LineSchema, MagnitudeMode, RuleSpec, TableScope};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaWarning {
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
}

impl SchemaWarning {
    pub fn new(schema: &str, column: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            schema: schema.to_string(),
            column: column.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}: {}", self.schema, column, self.message),
            None => write!(f, "{}: {}", self.schema, self.message),
        }
    }
}

pub fn lint_schema(schema: &LineSchema) -> Vec<SchemaWarning> {
    let name = schema.name.as_str();
    let mut warnings = Vec::new();
    let mut seen = BTreeSet::new();

    for column in &schema.columns {
        let col = Some(column.name.as_str());
        if !seen.insert(column.name.as_str()) {
            warnings.push(SchemaWarning::new(
                name,
                col,
                "declared more than once; first declaration wins",
            ));
        }
        if column.shared && column.tables != TableScope::Both {
            warnings.push(SchemaWarning::new(
                name,
                col,
                "shared column restricted to one table; not reconciled",
            ));
        }
        match &column.rule {
            RuleSpec::Range { lo: Some(lo), hi: Some(hi) } if lo > hi => {
                warnings.push(SchemaWarning::new(
                    name,
                    col,
                    format!("range lower bound {lo} exceeds upper bound {hi}"),
                ));
            }
            RuleSpec::Isin { values } if values.is_empty() => {
                warnings.push(SchemaWarning::new(name, col, "isin rule has no allowed values"));
            }
            _ => {}
        }
        match column.magnitude {
            MagnitudeMode::Off => {}
            MagnitudeMode::Scale if column.rule.upper_bound().is_none() => {
                warnings.push(SchemaWarning::new(
                    name,
                    col,
                    "scale correction without an upper bound only flips signs",
                ));
            }
            MagnitudeMode::Discrete if !matches!(column.rule, RuleSpec::Isin { .. }) => {
                warnings.push(SchemaWarning::new(
                    name,
                    col,
                    "discrete correction needs an isin rule",
                ));
            }
            _ => {}
        }
    }

    for identifier in &schema.identifiers {
        if identifier.length == 0 {
            warnings.push(SchemaWarning::new(
                name,
                Some(&identifier.column),
                "identifier length must be positive; normalization skipped",
            ));
        }
    }

    if let Some(recovery) = &schema.recovery {
        if recovery.match_on.is_empty() {
            warnings.push(SchemaWarning::new(
                name,
                None,
                "recovery has no match columns; key recovery disabled",
            ));
        }
        if recovery.max_iterations == 0 {
            warnings.push(SchemaWarning::new(
                name,
                None,
                "recovery iteration cap is zero; key recovery disabled",
            ));
        }
    }

    for warning in &warnings {
        warn!(schema = %warning.schema, column = ?warning.column, "{}", warning.message);
    }
    warnings
}
