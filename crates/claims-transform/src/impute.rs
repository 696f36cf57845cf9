//! Residual imputation.
//!
//! Whatever is still invalid after correction and reconciliation is filled in
//! three tiers: the column statistic over valid values in the row's group,
//! the same statistic over the whole column, then the declared constant.
//! Columns that declare neither a fill method nor a constant are exempt and
//! keep their invalid values.

use std::collections::BTreeMap;

use claims_model::{
    AuditEntry, AuditLog, CellValue, ColumnSpec, Decision, FillMethod, LineSchema, Stage,
    TableKind,
};
use claims_validate::{CompiledRule, FieldValidator};
use rand::Rng;
use rand_pcg::Pcg64;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::frame::ClaimsFrame;
use crate::reconcile::typed;
use crate::stats::{mean, median, mode};

/// Filled cells per tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputeSummary {
    pub group: usize,
    pub global: usize,
    pub constant: usize,
    pub sampled: usize,
    /// Invalid cells nothing could fill, per column.
    pub unfilled: BTreeMap<String, usize>,
    /// `sample` columns imputed with the mode because no seed was given.
    pub sample_fallbacks: Vec<String>,
}

impl ImputeSummary {
    pub fn filled(&self) -> usize {
        self.group + self.global + self.constant + self.sampled
    }

    pub fn merge(&mut self, other: ImputeSummary) {
        self.group += other.group;
        self.global += other.global;
        self.constant += other.constant;
        self.sampled += other.sampled;
        for (column, count) in other.unfilled {
            *self.unfilled.entry(column).or_insert(0) += count;
        }
        self.sample_fallbacks.extend(other.sample_fallbacks);
    }
}

/// Column statistic over `values`. Sampling is handled by the caller.
pub fn statistic(method: FillMethod, values: &[CellValue]) -> Option<CellValue> {
    match method {
        FillMethod::Mode | FillMethod::Sample => mode(values),
        FillMethod::Median => median(values),
        FillMethod::Mean => mean(values),
    }
}

/// Imputes every declared column of `frame`'s table.
///
/// Grouping columns are imputed first so later columns group on clean
/// labels. `rng` enables `sample` fills; without it they use the mode.
pub fn impute_residuals(
    frame: &ClaimsFrame,
    schema: &LineSchema,
    validator: &FieldValidator,
    mut rng: Option<&mut Pcg64>,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, ImputeSummary)> {
    let mut out = frame.clone();
    let mut summary = ImputeSummary::default();

    let group_columns: Vec<&str> = schema
        .columns_for(frame.table)
        .filter_map(|spec| schema.group_column_for(spec))
        .collect();
    let mut specs: Vec<&ColumnSpec> = schema.columns_for(frame.table).collect();
    specs.sort_by_key(|spec| !group_columns.contains(&spec.name.as_str()));

    for spec in specs {
        if spec.fill.is_none() && spec.fallback.is_none() {
            continue;
        }
        let Some(rule) = validator.rule(&spec.name) else {
            continue;
        };
        if !out.has_column(&spec.name) {
            continue;
        }
        let mut cells = out.cells(&spec.name)?;
        if cells.iter().all(|cell| rule.accepts(cell)) {
            continue;
        }

        let method = match (spec.fill, rng.is_some()) {
            (Some(FillMethod::Sample), false) => {
                warn!(column = %spec.name, "sample fill without a seed, using mode");
                summary.sample_fallbacks.push(spec.name.clone());
                Some(FillMethod::Mode)
            }
            (fill, _) => fill,
        };
        let groups = out.group_labels(schema, spec, validator)?;
        let filled = impute_column(
            &mut ColumnJob {
                table: frame.table,
                spec,
                rule,
                method,
                cells: &mut cells,
                groups: &groups,
            },
            rng.as_deref_mut(),
            &mut summary,
            audit,
        );
        if filled > 0 {
            out = out.with_cells(&spec.name, &cells)?;
        }
    }

    info!(
        table = %frame.table,
        group = summary.group,
        global = summary.global,
        constant = summary.constant,
        sampled = summary.sampled,
        unfilled = summary.unfilled.values().sum::<usize>(),
        "residual imputation"
    );
    Ok((out, summary))
}

struct ColumnJob<'a> {
    table: TableKind,
    spec: &'a ColumnSpec,
    rule: &'a CompiledRule,
    method: Option<FillMethod>,
    cells: &'a mut [CellValue],
    groups: &'a [Option<String>],
}

fn impute_column(
    job: &mut ColumnJob<'_>,
    mut rng: Option<&mut Pcg64>,
    summary: &mut ImputeSummary,
    audit: &mut AuditLog,
) -> usize {
    let rule = job.rule;
    let mut valid_by_group: BTreeMap<String, Vec<CellValue>> = BTreeMap::new();
    let mut valid_all = Vec::new();
    for (cell, group) in job.cells.iter().zip(job.groups) {
        if rule.accepts(cell) {
            valid_all.push(cell.clone());
            if let Some(group) = group {
                valid_by_group
                    .entry(group.clone())
                    .or_default()
                    .push(cell.clone());
            }
        }
    }

    let accepted = |value: Option<CellValue>| value.filter(|v| rule.accepts(v));
    let global = job.method.and_then(|m| accepted(statistic(m, &valid_all)));
    let mut group_stats: BTreeMap<String, Option<CellValue>> = BTreeMap::new();
    let constant = job
        .spec
        .fallback
        .as_ref()
        .map(|value| typed(Some(rule), value.to_cell()))
        .filter(|value| rule.accepts(value));
    let sampling = job.method == Some(FillMethod::Sample);

    let mut filled = 0;
    let mut unfilled = 0;
    for row in 0..job.cells.len() {
        if rule.accepts(&job.cells[row]) {
            continue;
        }
        let group = job.groups[row].as_deref();
        let group_values = group.and_then(|g| valid_by_group.get(g));

        let choice = if sampling {
            let pool = group_values
                .filter(|values| !values.is_empty())
                .unwrap_or(&valid_all);
            match rng.as_deref_mut() {
                Some(rng) if !pool.is_empty() => {
                    Some((pool[rng.gen_range(0..pool.len())].clone(), Decision::Sampled))
                }
                _ => None,
            }
        } else {
            let from_group = match (job.method, group, group_values) {
                (Some(method), Some(g), Some(values)) => group_stats
                    .entry(g.to_string())
                    .or_insert_with(|| accepted(statistic(method, values)))
                    .clone(),
                _ => None,
            };
            from_group
                .map(|v| (v, Decision::GroupStatistic))
                .or_else(|| global.clone().map(|v| (v, Decision::GlobalStatistic)))
        };
        let choice = choice.or_else(|| constant.clone().map(|v| (v, Decision::Constant)));

        let original = job.cells[row].clone();
        let Some((value, decision)) = choice else {
            unfilled += 1;
            audit.push(
                AuditEntry::new(Stage::Impute, job.table, &job.spec.name, Decision::NoFill)
                    .with_row(row)
                    .with_candidates(vec![original]),
            );
            continue;
        };
        match decision {
            Decision::GroupStatistic => summary.group += 1,
            Decision::GlobalStatistic => summary.global += 1,
            Decision::Constant => summary.constant += 1,
            Decision::Sampled => summary.sampled += 1,
            _ => {}
        }
        audit.push(
            AuditEntry::new(Stage::Impute, job.table, &job.spec.name, decision)
                .with_row(row)
                .with_candidates(vec![original])
                .with_chosen(value.clone()),
        );
        job.cells[row] = value;
        filled += 1;
    }

    if unfilled > 0 {
        warn!(table = %job.table, column = %job.spec.name, unfilled, "invalid values left unfilled");
        *summary.unfilled.entry(job.spec.name.clone()).or_insert(0) += unfilled;
    }
    debug!(table = %job.table, column = %job.spec.name, filled, "imputed column");
    filled
}
