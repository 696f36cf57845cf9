//! Claim amount capping, amount filtering and the policy-level merge.

use std::collections::BTreeMap;

use claims_common::filter_rows;
use claims_model::{
    AmountCap, AuditEntry, AuditLog, CellValue, Decision, KeyColumns, NUMERIC_EPSILON, Stage,
};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::frame::ClaimsFrame;

/// Claim amount totals before and after the merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MergeTotals {
    /// Sum of every remaining claim amount.
    pub claim_total: f64,
    /// Sum of the per-policy amounts in the modeling table.
    pub merged_total: f64,
    /// Amount held by claims whose key matches no policy row.
    pub unlinked_total: f64,
    pub unlinked_claims: usize,
    /// Policy keys that appear on more than one policy row.
    pub duplicate_policy_keys: usize,
}

impl MergeTotals {
    /// True when every linked claim amount lands exactly once in the merge.
    pub fn is_consistent(&self) -> bool {
        if self.duplicate_policy_keys > 0 {
            return false;
        }
        let expected = self.claim_total - self.unlinked_total;
        let scale = expected.abs().max(1.0);
        (expected - self.merged_total).abs() <= NUMERIC_EPSILON * scale * 1e3
    }
}

/// Caps each claim amount at its insured value.
///
/// Rows where either value is not a number are left alone. Returns the
/// number of capped rows.
pub fn cap_amounts(
    claims: &ClaimsFrame,
    cap: &AmountCap,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, usize)> {
    if !claims.has_column(&cap.amount) || !claims.has_column(&cap.limit) {
        warn!(amount = %cap.amount, limit = %cap.limit, "cap columns absent, amounts not capped");
        return Ok((claims.clone(), 0));
    }
    let mut amounts = claims.cells(&cap.amount)?;
    let limits = claims.cells(&cap.limit)?;
    let mut capped = 0;
    for (row, (amount, limit)) in amounts.iter_mut().zip(&limits).enumerate() {
        let (Some(value), Some(ceiling)) = (amount.as_f64(), limit.as_f64()) else {
            continue;
        };
        if value <= ceiling {
            continue;
        }
        let next = CellValue::number(ceiling);
        audit.push(
            AuditEntry::new(Stage::Merge, claims.table, &cap.amount, Decision::AmountCapped)
                .with_row(row)
                .with_candidates(vec![amount.clone(), limit.clone()])
                .with_chosen(next.clone()),
        );
        *amount = next;
        capped += 1;
    }
    if capped == 0 {
        return Ok((claims.clone(), 0));
    }
    info!(capped, "capped claim amounts at insured value");
    Ok((claims.with_cells(&cap.amount, &amounts)?, capped))
}

/// Removes claims whose amount is missing, non-numeric or not positive.
///
/// Returns the filtered table and the removed row count.
pub fn filter_amounts(
    claims: &ClaimsFrame,
    keys: &KeyColumns,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, usize)> {
    claims.require_column(&keys.claim_amount)?;
    let amounts = claims.cells(&keys.claim_amount)?;
    let policy_keys = if claims.has_column(&keys.policy_id) {
        claims.keys(&keys.policy_id)?
    } else {
        vec![None; claims.record_count()]
    };

    let mut keep = Vec::with_capacity(amounts.len());
    for (row, amount) in amounts.iter().enumerate() {
        let positive = amount.as_f64().is_some_and(|v| v.is_finite() && v > 0.0);
        keep.push(positive);
        if !positive {
            let mut entry =
                AuditEntry::new(Stage::Merge, claims.table, &keys.claim_amount, Decision::ClaimDropped)
                    .with_row(row)
                    .with_candidates(vec![amount.clone()]);
            if let Some(key) = &policy_keys[row] {
                entry = entry.with_key(key.clone());
            }
            audit.push(entry);
        }
    }
    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped == 0 {
        return Ok((claims.clone(), 0));
    }
    info!(dropped, "removed claims with zero or invalid amounts");
    let data = filter_rows(&claims.data, &keep)?;
    Ok((ClaimsFrame::new(claims.table, data), dropped))
}

/// Left-joins claim count and summed amount onto every policy row.
///
/// Policies without claims get a count of 0 and an amount of 0.
pub fn merge_tables(
    policies: &ClaimsFrame,
    claims: &ClaimsFrame,
    keys: &KeyColumns,
) -> Result<(DataFrame, MergeTotals)> {
    policies.require_column(&keys.policy_id)?;
    claims.require_column(&keys.policy_id)?;
    claims.require_column(&keys.claim_amount)?;

    let claim_keys = claims.keys(&keys.policy_id)?;
    let amounts = claims.cells(&keys.claim_amount)?;
    let mut aggregates: BTreeMap<String, (u32, f64)> = BTreeMap::new();
    let mut totals = MergeTotals::default();
    for (key, amount) in claim_keys.iter().zip(&amounts) {
        let value = amount.as_f64().unwrap_or(0.0);
        totals.claim_total += value;
        if let Some(key) = key {
            let entry = aggregates.entry(key.clone()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += value;
        }
    }

    let policy_keys = policies.keys(&keys.policy_id)?;
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut counts = Vec::with_capacity(policy_keys.len());
    let mut sums = Vec::with_capacity(policy_keys.len());
    for key in &policy_keys {
        let (count, sum) = key
            .as_ref()
            .and_then(|k| aggregates.get(k))
            .copied()
            .unwrap_or((0, 0.0));
        if let Some(key) = key {
            *seen.entry(key.as_str()).or_insert(0) += 1;
        }
        totals.merged_total += sum;
        counts.push(CellValue::Number(f64::from(count)));
        sums.push(CellValue::Number(sum));
    }
    totals.duplicate_policy_keys = seen.values().filter(|&&n| n > 1).count();

    for (key, amount) in claim_keys.iter().zip(&amounts) {
        let linked = key.as_deref().is_some_and(|k| seen.contains_key(k));
        if !linked {
            totals.unlinked_claims += 1;
            totals.unlinked_total += amount.as_f64().unwrap_or(0.0);
        }
    }

    let merged = policies
        .with_cells(&keys.claim_count, &counts)?
        .with_cells(&keys.claim_amount, &sums)?;
    if !totals.is_consistent() {
        warn!(
            claim_total = totals.claim_total,
            merged_total = totals.merged_total,
            unlinked_total = totals.unlinked_total,
            duplicate_policy_keys = totals.duplicate_policy_keys,
            "merged claim totals do not reconcile"
        );
    }
    info!(
        policies = merged.record_count(),
        claims = claims.record_count(),
        unlinked = totals.unlinked_claims,
        "merged claims onto policies"
    );
    Ok((merged.into_inner(), totals))
}

