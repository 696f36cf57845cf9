//! Structured audit log.
//!
//! Every correction, reconciliation, recovery and imputation decision is
//! recorded as an [`AuditEntry`] so an operator can review exactly how the
//! output deviates from the raw input. Entries are appended in processing
//! order, which is deterministic for a given input.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::schema::TableKind;

/// Pipeline stage that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TextCleaning,
    Identifier,
    Magnitude,
    Sequence,
    Recovery,
    ReconcileInternal,
    ReconcileCross,
    Impute,
    Merge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TextCleaning => "text_cleaning",
            Stage::Identifier => "identifier",
            Stage::Magnitude => "magnitude",
            Stage::Sequence => "sequence",
            Stage::Recovery => "recovery",
            Stage::ReconcileInternal => "reconcile_internal",
            Stage::ReconcileCross => "reconcile_cross",
            Stage::Impute => "impute",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What was decided, and which source the chosen value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    // Text and identifiers
    SuffixStripped,
    Truncated,
    SequentialRecovery,
    Unresolved,

    // Magnitude
    SignFlipped,
    ScaleShifted,
    GroupModeFallback,

    // Derived counts
    Resequenced,
    Recounted,

    // Internal reconciliation
    FirstValid,
    FirstRowFallback,

    // Cross reconciliation
    ClaimTable,
    PolicyTable,
    PolicyFallback,

    // Key recovery
    KeyRecovered,
    AmbiguousSkipped,
    Placeholder,

    // Residual imputation
    GroupStatistic,
    GlobalStatistic,
    Constant,
    Sampled,
    NoFill,

    // Merge
    AmountCapped,
    ClaimDropped,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::SuffixStripped => "suffix-stripped",
            Decision::Truncated => "truncated",
            Decision::SequentialRecovery => "sequential-recovery",
            Decision::Unresolved => "unresolved",
            Decision::SignFlipped => "sign-flipped",
            Decision::ScaleShifted => "scale-shifted",
            Decision::GroupModeFallback => "group-mode-fallback",
            Decision::Resequenced => "resequenced",
            Decision::Recounted => "recounted",
            Decision::FirstValid => "first-valid",
            Decision::FirstRowFallback => "first-row-fallback",
            Decision::ClaimTable => "claim-table",
            Decision::PolicyTable => "policy-table",
            Decision::PolicyFallback => "policy-fallback",
            Decision::KeyRecovered => "key-recovered",
            Decision::AmbiguousSkipped => "ambiguous-skipped",
            Decision::Placeholder => "placeholder",
            Decision::GroupStatistic => "group-statistic",
            Decision::GlobalStatistic => "global-statistic",
            Decision::Constant => "constant",
            Decision::Sampled => "sampled",
            Decision::NoFill => "no-fill",
            Decision::AmountCapped => "amount-capped",
            Decision::ClaimDropped => "claim-dropped",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One logged decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub stage: Stage,
    pub table: TableKind,
    /// Row index in the table as it was when the decision was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// Policy key the decision applies to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub column: String,
    /// Values considered, in the order they were considered.
    pub candidates: Vec<CellValue>,
    pub chosen: CellValue,
    pub decision: Decision,
}

impl AuditEntry {
    pub fn new(stage: Stage, table: TableKind, column: impl Into<String>, decision: Decision) -> Self {
        Self {
            stage,
            table,
            row: None,
            key: None,
            column: column.into(),
            candidates: Vec::new(),
            chosen: CellValue::Missing,
            decision,
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<CellValue>) -> Self {
        self.candidates = candidates;
        self
    }

    #[must_use]
    pub fn with_chosen(mut self, chosen: CellValue) -> Self {
        self.chosen = chosen;
        self
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.table)?;
        if let Some(row) = self.row {
            write!(f, " row={row}")?;
        }
        if let Some(key) = &self.key {
            write!(f, " key={key}")?;
        }
        let candidates: Vec<String> = self.candidates.iter().map(ToString::to_string).collect();
        write!(
            f,
            " column={} candidates=[{}] chosen={} source={}",
            self.column,
            candidates.join(", "),
            self.chosen,
            self.decision
        )
    }
}

/// Append-only collection of audit entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, other: AuditLog) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn by_stage(&self, stage: Stage) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.entries.iter().filter(|e| e.decision == decision).count()
    }

    /// Entry counts per (stage, decision), ordered.
    pub fn summary(&self) -> BTreeMap<(Stage, Decision), usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry((entry.stage, entry.decision)).or_insert(0) += 1;
        }
        counts
    }
}

impl IntoIterator for AuditLog {
    type Item = AuditEntry;
    type IntoIter = std::vec::IntoIter<AuditEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
