//! Claim sequence numbers and policy claim counts.
//!
//! Both are derived fields: stored values are ignored and recomputed from the
//! claim rows as they currently stand.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use claims_model::{AuditEntry, AuditLog, CellValue, Decision, KeyColumns, Stage};
use tracing::debug;

use crate::error::Result;
use crate::frame::ClaimsFrame;

/// Sort key of a claim identifier: numeric ids first (by value), then text
/// ids (lexically), then missing ones.
#[derive(Debug)]
enum ClaimIdKey {
    Number(f64),
    Text(String),
    Missing,
}

impl ClaimIdKey {
    fn of(value: &CellValue) -> Self {
        match (value.as_f64(), value.as_text()) {
            (Some(number), _) => Self::Number(number),
            (None, Some(text)) => Self::Text(text),
            (None, None) => Self::Missing,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Missing => 2,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(x), Self::Number(y)) => x.total_cmp(y),
            (Self::Text(x), Self::Text(y)) => x.cmp(y),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// 1-based rank of each claim within its policy, by claim identifier.
///
/// The sort is stable, so equal identifiers keep row order. Rows without a
/// policy key get `None`.
pub fn claim_sequence(keys: &[Option<String>], claim_ids: &[CellValue]) -> Vec<Option<u32>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            groups.entry(key.as_str()).or_default().push(row);
        }
    }

    let order: Vec<ClaimIdKey> = claim_ids.iter().map(ClaimIdKey::of).collect();
    let mut seq = vec![None; keys.len()];
    for rows in groups.values_mut() {
        rows.sort_by(|&a, &b| order[a].total_cmp(&order[b]));
        for (rank, &row) in rows.iter().enumerate() {
            seq[row] = u32::try_from(rank + 1).ok();
        }
    }
    seq
}

/// Number of claim rows per policy key.
pub fn claim_counts(claim_keys: &[Option<String>]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for key in claim_keys.iter().flatten() {
        *counts.entry(key.clone()).or_insert(0) += 1;
    }
    counts
}

/// Rewrites the claim sequence column. Returns the number of changed rows.
pub fn resequence_claims(
    claims: &ClaimsFrame,
    keys: &KeyColumns,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, usize)> {
    claims.require_column(&keys.policy_id)?;
    let policy_keys = claims.keys(&keys.policy_id)?;
    let claim_ids = if claims.has_column(&keys.claim_id) {
        claims.cells(&keys.claim_id)?
    } else {
        vec![CellValue::Missing; claims.record_count()]
    };
    let stored = if claims.has_column(&keys.claim_seq) {
        claims.cells(&keys.claim_seq)?
    } else {
        vec![CellValue::Missing; claims.record_count()]
    };

    let seq = claim_sequence(&policy_keys, &claim_ids);
    let cells: Vec<CellValue> = seq
        .iter()
        .map(|s| s.map_or(CellValue::Missing, |n| CellValue::Number(f64::from(n))))
        .collect();

    let mut changed = 0;
    for (row, (old, new)) in stored.iter().zip(&cells).enumerate() {
        if old.loosely_eq(new) {
            continue;
        }
        changed += 1;
        let mut entry = AuditEntry::new(Stage::Sequence, claims.table, &keys.claim_seq, Decision::Resequenced)
            .with_row(row)
            .with_candidates(vec![old.clone()])
            .with_chosen(new.clone());
        if let Some(key) = &policy_keys[row] {
            entry = entry.with_key(key.clone());
        }
        audit.push(entry);
    }
    debug!(changed, "recomputed claim sequence numbers");
    Ok((claims.with_cells(&keys.claim_seq, &cells)?, changed))
}

/// Rewrites the policy claim count column from the claim rows.
///
/// Policies with no claims get 0. Returns the number of changed rows.
pub fn recount_policies(
    policies: &ClaimsFrame,
    claims: &ClaimsFrame,
    keys: &KeyColumns,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, usize)> {
    policies.require_column(&keys.policy_id)?;
    claims.require_column(&keys.policy_id)?;
    let counts = claim_counts(&claims.keys(&keys.policy_id)?);
    let policy_keys = policies.keys(&keys.policy_id)?;
    let stored = if policies.has_column(&keys.claim_count) {
        policies.cells(&keys.claim_count)?
    } else {
        vec![CellValue::Missing; policies.record_count()]
    };

    let mut cells = Vec::with_capacity(policy_keys.len());
    let mut changed = 0;
    for (row, key) in policy_keys.iter().enumerate() {
        let count = key
            .as_ref()
            .and_then(|k| counts.get(k))
            .copied()
            .unwrap_or(0);
        let new = CellValue::Number(f64::from(count));
        if !stored[row].loosely_eq(&new) {
            changed += 1;
            let mut entry = AuditEntry::new(
                Stage::Sequence,
                policies.table,
                &keys.claim_count,
                Decision::Recounted,
            )
            .with_row(row)
            .with_candidates(vec![stored[row].clone()])
            .with_chosen(new.clone());
            if let Some(key) = key {
                entry = entry.with_key(key.clone());
            }
            audit.push(entry);
        }
        cells.push(new);
    }
    debug!(changed, "recomputed policy claim counts");
    Ok((policies.with_cells(&keys.claim_count, &cells)?, changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn sequence_ranks_by_claim_id_within_policy() {
        let keys = vec![key("P1"), key("P2"), key("P1"), None, key("P1")];
        let ids = vec![
            CellValue::from("C-3"),
            CellValue::from("C-9"),
            CellValue::from("C-1"),
            CellValue::from("C-4"),
            CellValue::from("C-3"),
        ];
        assert_eq!(
            claim_sequence(&keys, &ids),
            vec![Some(2), Some(1), Some(1), None, Some(3)]
        );
    }

    #[test]
    fn numeric_claim_ids_sort_numerically() {
        let keys = vec![key("P"), key("P"), key("P")];
        let ids = vec![CellValue::Number(10.0), CellValue::Number(9.0), CellValue::Missing];
        assert_eq!(claim_sequence(&keys, &ids), vec![Some(2), Some(1), Some(3)]);
    }

    #[test]
    fn mixed_claim_ids_rank_numbers_before_text() {
        let keys = vec![key("P"); 4];
        let ids = vec![
            CellValue::from("1a"),
            CellValue::from("10"),
            CellValue::Missing,
            CellValue::Number(9.0),
        ];
        assert_eq!(
            claim_sequence(&keys, &ids),
            vec![Some(3), Some(2), Some(4), Some(1)]
        );
    }

    #[test]
    fn many_mixed_claim_ids_give_contiguous_sequence() {
        let mut ids = Vec::new();
        for v in 0..70_u32 {
            ids.push(CellValue::Number(f64::from(v)));
            ids.push(CellValue::Text(format!("{v}a")));
            ids.push(CellValue::Text(format!("{}", v * 3)));
        }
        let keys = vec![key("P"); ids.len()];
        let mut seq: Vec<u32> = claim_sequence(&keys, &ids).into_iter().flatten().collect();
        seq.sort_unstable();
        let expected: Vec<u32> = (1..=210).collect();
        assert_eq!(seq, expected);
    }
}
