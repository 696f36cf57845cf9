//! Line-of-business schema definitions.
//!
//! A [`LineSchema`] describes one pair of frequency (policy) and severity
//! (claim) tables: where the keys live, which identifiers have a fixed
//! format, which columns are duplicated across the two tables, the validity
//! rule for each column and how each column is corrected or imputed.
//!
//! Schemas are configuration data. They are deserialized from TOML by
//! `claims-standards` and never hard-coded per caller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::error::ModelError;

/// Default corruption suffix appended to text values (e.g. `_???6689`).
pub const DEFAULT_SUFFIX_PATTERN: &str = r"_[A-Za-z?]{3}\d+$";

/// Default cap on bidirectional key recovery passes.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Which of the two tables a row or column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// One row per policy (frequency table).
    Policy,
    /// One row per claim (severity table).
    Claim,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Policy => "policy",
            TableKind::Claim => "claim",
        }
    }

    /// The other table.
    pub fn other(&self) -> TableKind {
        match self {
            TableKind::Policy => TableKind::Claim,
            TableKind::Claim => TableKind::Policy,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TableKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "policy" | "freq" | "frequency" => Ok(TableKind::Policy),
            "claim" | "sev" | "severity" => Ok(TableKind::Claim),
            _ => Err(ModelError::UnknownTable(s.to_string())),
        }
    }
}

/// Tables a column spec applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableScope {
    Policy,
    Claim,
    #[default]
    Both,
}

impl TableScope {
    pub fn includes(&self, table: TableKind) -> bool {
        match self {
            TableScope::Both => true,
            TableScope::Policy => table == TableKind::Policy,
            TableScope::Claim => table == TableKind::Claim,
        }
    }
}

/// A literal allowed value in an `isin` rule or a fallback constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainValue {
    Number(f64),
    Text(String),
}

impl DomainValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DomainValue::Number(v) => Some(*v),
            DomainValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn to_cell(&self) -> CellValue {
        match self {
            DomainValue::Number(v) => CellValue::number(*v),
            DomainValue::Text(s) => CellValue::text(s.clone()),
        }
    }
}

/// Validity rule declared for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Value must be present.
    NotNull,
    /// Value must coerce to a number within `[lo, hi]`; a missing bound is open.
    Range {
        #[serde(default)]
        lo: Option<f64>,
        #[serde(default)]
        hi: Option<f64>,
    },
    /// Value must be one of the listed values.
    Isin { values: Vec<DomainValue> },
    /// Trimmed text must fully match the regular expression.
    Pattern { regex: String },
}

impl RuleSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuleSpec::NotNull => "not_null",
            RuleSpec::Range { .. } => "range",
            RuleSpec::Isin { .. } => "isin",
            RuleSpec::Pattern { .. } => "pattern",
        }
    }

    /// Upper bound used by the magnitude corrector.
    ///
    /// For `isin` rules over numbers this is the largest allowed value.
    pub fn upper_bound(&self) -> Option<f64> {
        match self {
            RuleSpec::Range { hi, .. } => *hi,
            RuleSpec::Isin { values } => values
                .iter()
                .filter_map(DomainValue::as_f64)
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))),
            _ => None,
        }
    }
}

/// Statistic used to fill invalid values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMethod {
    Mode,
    Median,
    Mean,
    /// Uniform draw from observed valid values; needs an explicit seed.
    Sample,
}

impl FillMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMethod::Mode => "mode",
            FillMethod::Median => "median",
            FillMethod::Mean => "mean",
            FillMethod::Sample => "sample",
        }
    }
}

/// Numeric repair applied by the magnitude corrector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeMode {
    #[default]
    Off,
    /// `abs()`, then one ÷10 when above the upper bound.
    Scale,
    /// As `Scale`, then group mode when the result is not an allowed integer.
    Discrete,
}

/// Which source wins a cross-table disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Claim value if valid, else policy value.
    #[default]
    Claim,
    /// Policy value if valid, else claim value if valid, else policy value.
    Policy,
}

/// Validation, correction and imputation settings for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub rule: RuleSpec,
    #[serde(default)]
    pub tables: TableScope,
    /// Duplicated in both tables and subject to reconciliation.
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub priority: SourcePriority,
    #[serde(default)]
    pub magnitude: MagnitudeMode,
    /// Residual imputation statistic; `None` exempts the column.
    #[serde(default)]
    pub fill: Option<FillMethod>,
    /// Last-resort constant when no valid value exists anywhere.
    #[serde(default)]
    pub fallback: Option<DomainValue>,
    /// Overrides the schema-level grouping column.
    #[serde(default)]
    pub group_by: Option<String>,
}

impl ColumnSpec {
    pub fn applies_to(&self, table: TableKind) -> bool {
        self.tables.includes(table)
    }
}

/// Where the structural columns live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumns {
    /// Join key present in both tables.
    pub policy_id: String,
    pub claim_id: String,
    pub claim_seq: String,
    pub claim_count: String,
    pub claim_amount: String,
}

impl Default for KeyColumns {
    fn default() -> Self {
        Self {
            policy_id: "policy_id".to_string(),
            claim_id: "claim_id".to_string(),
            claim_seq: "claim_seq".to_string(),
            claim_count: "claim_count".to_string(),
            claim_amount: "claim_amount".to_string(),
        }
    }
}

/// A fixed-format identifier column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSpec {
    pub table: TableKind,
    pub column: String,
    /// Declared fixed length; longer values are truncated.
    pub length: usize,
    /// Consecutive rows are generated by incrementing a trailing number.
    #[serde(default)]
    pub sequential: bool,
}

/// Secondary composite key used to recover missing policy keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySpec {
    pub match_on: Vec<String>,
    /// Decimal places numeric components are rounded to before matching.
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_precision() -> u32 {
    4
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// Synthetic identifier format for policies with no recoverable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderSpec {
    pub prefix: String,
    #[serde(default = "default_width")]
    pub width: usize,
}

fn default_width() -> usize {
    4
}

impl Default for PlaceholderSpec {
    fn default() -> Self {
        Self {
            prefix: "MI-".to_string(),
            width: default_width(),
        }
    }
}

impl PlaceholderSpec {
    pub fn format(&self, counter: u64) -> String {
        format!("{}{:0width$}", self.prefix, counter, width = self.width)
    }

    /// Counter encoded in `value` when it carries this prefix.
    pub fn counter_of(&self, value: &str) -> Option<u64> {
        let rest = value.strip_prefix(&self.prefix)?;
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()
    }
}

/// Claim amounts may not exceed the insured value held in `limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountCap {
    pub amount: String,
    pub limit: String,
}

/// Complete schema for one line of business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSchema {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub keys: KeyColumns,
    /// Default grouping column for group-wise statistics.
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default = "default_suffix_pattern")]
    pub suffix_pattern: String,
    #[serde(default)]
    pub identifiers: Vec<IdentifierSpec>,
    #[serde(default)]
    pub recovery: Option<RecoverySpec>,
    #[serde(default)]
    pub placeholder: PlaceholderSpec,
    #[serde(default)]
    pub cap: Option<AmountCap>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

fn default_suffix_pattern() -> String {
    DEFAULT_SUFFIX_PATTERN.to_string()
}

impl LineSchema {
    /// Minimal schema with default key names and no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            keys: KeyColumns::default(),
            group_by: None,
            suffix_pattern: default_suffix_pattern(),
            identifiers: Vec::new(),
            recovery: None,
            placeholder: PlaceholderSpec::default(),
            cap: None,
            columns: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns declared for `table`, in declaration order.
    pub fn columns_for(&self, table: TableKind) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(move |c| c.applies_to(table))
    }

    /// Columns duplicated across both tables, in declaration order.
    pub fn shared_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| c.shared && c.tables == TableScope::Both)
    }

    pub fn identifiers_for(&self, table: TableKind) -> impl Iterator<Item = &IdentifierSpec> {
        self.identifiers.iter().filter(move |i| i.table == table)
    }

    /// Grouping column for `spec`, falling back to the schema default.
    pub fn group_column_for<'a>(&'a self, spec: &'a ColumnSpec) -> Option<&'a str> {
        spec.group_by.as_deref().or(self.group_by.as_deref())
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}
