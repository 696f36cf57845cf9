//! Reconciliation of attributes duplicated across the two tables.
//!
//! Internal reconciliation makes every row sharing a policy key agree within
//! one table. Cross reconciliation then makes the policy row and its claim
//! rows agree, choosing between the two sources by the column's priority.
//! Running either step twice changes nothing the second time.

use std::collections::BTreeMap;

use claims_model::{
    AuditEntry, AuditLog, CellValue, ColumnSpec, Decision, LineSchema, SourcePriority, Stage,
};
use claims_validate::{CompiledRule, FieldValidator};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::frame::ClaimsFrame;

/// Cells rewritten per decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub first_valid: usize,
    pub first_row_fallback: usize,
    pub claim_table: usize,
    pub policy_table: usize,
    pub policy_fallback: usize,
}

impl ReconcileSummary {
    pub fn internal_total(&self) -> usize {
        self.first_valid + self.first_row_fallback
    }

    pub fn cross_total(&self) -> usize {
        self.claim_table + self.policy_table + self.policy_fallback
    }

    pub fn merge(&mut self, other: ReconcileSummary) {
        self.first_valid += other.first_valid;
        self.first_row_fallback += other.first_row_fallback;
        self.claim_table += other.claim_table;
        self.policy_table += other.policy_table;
        self.policy_fallback += other.policy_fallback;
    }

    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::FirstValid => self.first_valid += 1,
            Decision::FirstRowFallback => self.first_row_fallback += 1,
            Decision::ClaimTable => self.claim_table += 1,
            Decision::PolicyTable => self.policy_table += 1,
            Decision::PolicyFallback => self.policy_fallback += 1,
            _ => {}
        }
    }
}

/// Value for a group of rows sharing a key.
///
/// `None` when all values already agree. Otherwise the first value accepted
/// by `is_valid`, or the first row's value when none is.
pub fn resolve_group(
    values: &[CellValue],
    is_valid: impl Fn(&CellValue) -> bool,
) -> Option<(CellValue, Decision)> {
    let first = values.first()?;
    if values.iter().all(|v| v.loosely_eq(first)) {
        return None;
    }
    Some(match values.iter().find(|v| is_valid(*v)) {
        Some(valid) => (valid.clone(), Decision::FirstValid),
        None => (first.clone(), Decision::FirstRowFallback),
    })
}

/// Chooses between a policy value and a claim value that disagree.
///
/// When neither is valid the policy value is kept.
pub fn resolve_pair(
    policy: &CellValue,
    claim: &CellValue,
    policy_valid: bool,
    claim_valid: bool,
    priority: SourcePriority,
) -> (CellValue, Decision) {
    match priority {
        SourcePriority::Claim if claim_valid => (claim.clone(), Decision::ClaimTable),
        SourcePriority::Policy if policy_valid => (policy.clone(), Decision::PolicyTable),
        _ if claim_valid => (claim.clone(), Decision::ClaimTable),
        _ if policy_valid => (policy.clone(), Decision::PolicyTable),
        _ => (policy.clone(), Decision::PolicyFallback),
    }
}

/// Numeric text becomes a number in columns whose rule is numeric.
pub(crate) fn typed(rule: Option<&CompiledRule>, cell: CellValue) -> CellValue {
    match (&cell, rule) {
        (CellValue::Text(_), Some(rule)) if rule.is_numeric() => match cell.as_f64() {
            Some(value) => CellValue::number(value),
            None => cell,
        },
        _ => cell,
    }
}

fn shared_columns<'a>(
    schema: &'a LineSchema,
    validator: &FieldValidator,
    frames: &[&ClaimsFrame],
) -> Vec<&'a ColumnSpec> {
    schema
        .shared_columns()
        .filter(|spec| validator.knows(&spec.name))
        .filter(|spec| frames.iter().all(|frame| frame.has_column(&spec.name)))
        .collect()
}

fn key_groups(keys: &[Option<String>]) -> BTreeMap<&str, Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            groups.entry(key.as_str()).or_default().push(row);
        }
    }
    groups
}

/// Makes rows sharing a policy key agree on every shared column.
pub fn reconcile_internal(
    frame: &ClaimsFrame,
    schema: &LineSchema,
    validator: &FieldValidator,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, ReconcileSummary)> {
    frame.require_column(&schema.keys.policy_id)?;
    let keys = frame.keys(&schema.keys.policy_id)?;
    let groups = key_groups(&keys);
    let mut out = frame.clone();
    let mut summary = ReconcileSummary::default();

    for spec in shared_columns(schema, validator, &[frame]) {
        let rule = validator.rule(&spec.name);
        let mut cells = out.cells(&spec.name)?;
        let mut changed = false;
        for (key, rows) in &groups {
            if rows.len() < 2 {
                continue;
            }
            let values: Vec<CellValue> = rows.iter().map(|&row| cells[row].clone()).collect();
            let Some((chosen, decision)) =
                resolve_group(&values, |v| validator.is_valid(&spec.name, v))
            else {
                continue;
            };
            let chosen = typed(rule, chosen);
            debug!(table = %frame.table, key = %key, column = %spec.name, %chosen, %decision, "internal conflict");
            audit.push(
                AuditEntry::new(Stage::ReconcileInternal, frame.table, &spec.name, decision)
                    .with_key(*key)
                    .with_candidates(values)
                    .with_chosen(chosen.clone()),
            );
            summary.record(decision);
            for &row in rows {
                cells[row] = chosen.clone();
            }
            changed = true;
        }
        if changed {
            out = out.with_cells(&spec.name, &cells)?;
        }
    }
    info!(
        table = %frame.table,
        first_valid = summary.first_valid,
        first_row_fallback = summary.first_row_fallback,
        "internal reconciliation"
    );
    Ok((out, summary))
}

/// Makes each policy row and its claim rows agree on every shared column.
///
/// The claim side is represented by its first row per key; the chosen value
/// is written to the policy row and to every claim row with that key.
pub fn reconcile_cross(
    policies: &ClaimsFrame,
    claims: &ClaimsFrame,
    schema: &LineSchema,
    validator: &FieldValidator,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, ClaimsFrame, ReconcileSummary)> {
    let key_column = &schema.keys.policy_id;
    policies.require_column(key_column)?;
    claims.require_column(key_column)?;
    let policy_keys = policies.keys(key_column)?;
    let claim_keys = claims.keys(key_column)?;
    let claim_groups = key_groups(&claim_keys);

    let mut out_policies = policies.clone();
    let mut out_claims = claims.clone();
    let mut summary = ReconcileSummary::default();

    for spec in shared_columns(schema, validator, &[policies, claims]) {
        let rule = validator.rule(&spec.name);
        let mut policy_cells = out_policies.cells(&spec.name)?;
        let mut claim_cells = out_claims.cells(&spec.name)?;
        let mut policies_changed = false;
        let mut claims_changed = false;

        for (row, key) in policy_keys.iter().enumerate() {
            let Some(key) = key else {
                continue;
            };
            let Some(rows) = claim_groups.get(key.as_str()) else {
                continue;
            };
            let policy_value = &policy_cells[row];
            let claim_value = &claim_cells[rows[0]];
            if policy_value.loosely_eq(claim_value) {
                continue;
            }
            let (chosen, decision) = resolve_pair(
                policy_value,
                claim_value,
                validator.is_valid(&spec.name, policy_value),
                validator.is_valid(&spec.name, claim_value),
                spec.priority,
            );
            let chosen = typed(rule, chosen);
            debug!(key = %key, column = %spec.name, %chosen, %decision, "cross-table conflict");
            audit.push(
                AuditEntry::new(Stage::ReconcileCross, policies.table, &spec.name, decision)
                    .with_key(key.clone())
                    .with_candidates(vec![policy_value.clone(), claim_value.clone()])
                    .with_chosen(chosen.clone()),
            );
            summary.record(decision);

            if policy_cells[row] != chosen {
                policy_cells[row] = chosen.clone();
                policies_changed = true;
            }
            for &claim_row in rows {
                if claim_cells[claim_row] != chosen {
                    claim_cells[claim_row] = chosen.clone();
                    claims_changed = true;
                }
            }
        }
        if policies_changed {
            out_policies = out_policies.with_cells(&spec.name, &policy_cells)?;
        }
        if claims_changed {
            out_claims = out_claims.with_cells(&spec.name, &claim_cells)?;
        }
    }
    info!(
        claim_table = summary.claim_table,
        policy_table = summary.policy_table,
        policy_fallback = summary.policy_fallback,
        "cross-table reconciliation"
    );
    Ok((out_policies, out_claims, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_prefers_first_valid_value() {
        let values = vec![CellValue::Number(-2.0), CellValue::Number(3.0), CellValue::Number(4.0)];
        let resolved = resolve_group(&values, |v| v.as_f64().is_some_and(|x| x > 0.0));
        assert_eq!(resolved, Some((CellValue::Number(3.0), Decision::FirstValid)));
    }

    #[test]
    fn group_falls_back_to_first_row() {
        let values = vec![CellValue::Number(-2.0), CellValue::Number(-3.0)];
        let resolved = resolve_group(&values, |_| false);
        assert_eq!(resolved, Some((CellValue::Number(-2.0), Decision::FirstRowFallback)));
    }

    #[test]
    fn agreeing_group_is_left_alone() {
        let values = vec![CellValue::from("0.6"), CellValue::Number(0.6)];
        assert_eq!(resolve_group(&values, |_| true), None);
    }

    #[test]
    fn pair_priority() {
        let a = CellValue::Number(1.0);
        let b = CellValue::Number(2.0);
        assert_eq!(
            resolve_pair(&a, &b, true, true, SourcePriority::Claim).1,
            Decision::ClaimTable
        );
        assert_eq!(
            resolve_pair(&a, &b, true, true, SourcePriority::Policy).1,
            Decision::PolicyTable
        );
        assert_eq!(
            resolve_pair(&a, &b, false, true, SourcePriority::Policy).1,
            Decision::ClaimTable
        );
        assert_eq!(
            resolve_pair(&a, &b, true, false, SourcePriority::Claim).1,
            Decision::PolicyTable
        );
        assert_eq!(
            resolve_pair(&a, &b, false, false, SourcePriority::Claim),
            (a.clone(), Decision::PolicyFallback)
        );
    }
}
