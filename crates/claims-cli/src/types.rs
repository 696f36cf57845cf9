use std::collections::BTreeMap;
use std::path::PathBuf;

use claims_model::{Decision, Stage, TableKind};
use claims_standards::SchemaWarning;
use claims_transform::PipelineReport;
use claims_validate::TableReport;

#[derive(Debug)]
pub struct RunResult {
    pub schema: String,
    pub output_dir: PathBuf,
    pub written: Vec<PathBuf>,
    pub report: PipelineReport,
    pub audit_summary: BTreeMap<(Stage, Decision), usize>,
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct ValidateResult {
    pub schema: String,
    pub warnings: Vec<SchemaWarning>,
    pub tables: Vec<TableReport>,
    pub identifiers: Vec<IdentifierCheck>,
}

impl ValidateResult {
    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(TableReport::is_clean)
            && self.identifiers.iter().all(|check| check.invalid == 0)
    }
}

/// Identifier validation of one column of a raw table.
#[derive(Debug)]
pub struct IdentifierCheck {
    pub table: TableKind,
    pub column: String,
    pub length: usize,
    pub missing: usize,
    pub invalid: usize,
}
