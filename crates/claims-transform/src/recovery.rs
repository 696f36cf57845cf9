//! Cross-table recovery of missing policy keys.
//!
//! A row that lost its policy key can often be matched to the other table on
//! a secondary composite key (shipment id plus exposure, station plus solar
//! system, ...). Matching is exact after rounding numeric components, and a
//! composite value that maps to more than one policy key is never used.
//!
//! Recovery alternates policy ← claim and claim ← policy until a pass
//! recovers nothing or the iteration cap is hit. Policy rows that still have
//! no key receive a placeholder; claim rows stay unresolved.

use std::collections::{BTreeMap, BTreeSet};

use claims_model::{
    AuditEntry, AuditLog, CellValue, Decision, LineSchema, PlaceholderSpec, RecoverySpec, Stage,
    TableKind,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::frame::{ClaimsFrame, key_of};

/// Normalized secondary key, one component per match column.
pub type CompositeKey = Vec<String>;

/// Composite key → policy key, restricted to unambiguous composites.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyLookup {
    pub unique: BTreeMap<CompositeKey, String>,
    /// Composites seen with more than one policy key, and those keys.
    pub ambiguous: BTreeMap<CompositeKey, BTreeSet<String>>,
}

impl KeyLookup {
    pub fn get(&self, composite: &CompositeKey) -> Option<&str> {
        self.unique.get(composite).map(String::as_str)
    }
}

/// Recovered keys per direction for one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryPass {
    pub policies_recovered: usize,
    pub claims_recovered: usize,
}

/// A row left without a key because its composite was ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousMatch {
    pub table: TableKind,
    pub row: usize,
    pub composite: CompositeKey,
    pub candidates: Vec<String>,
}

/// Outcome of [`recover_keys`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoverySummary {
    pub passes: Vec<RecoveryPass>,
    /// False when the iteration cap stopped recovery.
    pub converged: bool,
    pub ambiguous: Vec<AmbiguousMatch>,
    /// Claim rows still without a policy key.
    pub unresolved_claims: Vec<usize>,
    /// Placeholder keys assigned to policy rows, in row order.
    pub placeholders: Vec<(usize, String)>,
}

impl RecoverySummary {
    pub fn policies_recovered(&self) -> usize {
        self.passes.iter().map(|p| p.policies_recovered).sum()
    }

    pub fn claims_recovered(&self) -> usize {
        self.passes.iter().map(|p| p.claims_recovered).sum()
    }
}

/// Rounds numeric components to `precision` decimals; trims text.
///
/// Returns `None` when any component is missing.
pub fn composite_key(cells: &[&CellValue], precision: u32) -> Option<CompositeKey> {
    let digits = precision as usize;
    cells
        .iter()
        .map(|cell| {
            if cell.is_missing() {
                return None;
            }
            match cell.as_f64() {
                Some(value) => {
                    let rounded = format!("{value:.digits$}");
                    // -0.0000 and 0.0000 must match
                    Some(if rounded.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
                        format!("{:.digits$}", 0.0)
                    } else {
                        rounded
                    })
                }
                None => key_of(cell),
            }
        })
        .collect()
}

/// Composite key per row of `frame`, or `None` when a component is missing.
fn composites(frame: &ClaimsFrame, spec: &RecoverySpec) -> Result<Vec<Option<CompositeKey>>> {
    let columns = spec
        .match_on
        .iter()
        .map(|name| frame.cells(name))
        .collect::<Result<Vec<_>>>()?;
    Ok((0..frame.record_count())
        .map(|row| {
            let cells: Vec<&CellValue> = columns.iter().map(|column| &column[row]).collect();
            composite_key(&cells, spec.precision)
        })
        .collect())
}

/// Builds the composite → key lookup from rows whose key is known.
pub fn build_lookup(keys: &[Option<String>], composites: &[Option<CompositeKey>]) -> KeyLookup {
    let mut seen: BTreeMap<CompositeKey, BTreeSet<String>> = BTreeMap::new();
    for (key, composite) in keys.iter().zip(composites) {
        if let (Some(key), Some(composite)) = (key, composite) {
            seen.entry(composite.clone()).or_default().insert(key.clone());
        }
    }
    let mut lookup = KeyLookup::default();
    for (composite, keys) in seen {
        if keys.len() == 1 {
            if let Some(key) = keys.into_iter().next() {
                lookup.unique.insert(composite, key);
            }
        } else {
            lookup.ambiguous.insert(composite, keys);
        }
    }
    lookup
}

/// Fills missing target keys from `lookup`. Returns the new key column and
/// the recovered `(row, key)` pairs.
fn recover_direction(
    target_keys: &[Option<String>],
    target_composites: &[Option<CompositeKey>],
    lookup: &KeyLookup,
) -> (Vec<Option<String>>, Vec<(usize, String)>) {
    let mut keys = target_keys.to_vec();
    let mut recovered = Vec::new();
    for (row, key) in keys.iter_mut().enumerate() {
        if key.is_some() {
            continue;
        }
        if let Some(found) = target_composites[row].as_ref().and_then(|c| lookup.get(c)) {
            *key = Some(found.to_string());
            recovered.push((row, found.to_string()));
        }
    }
    (keys, recovered)
}

fn key_cells(keys: &[Option<String>]) -> Vec<CellValue> {
    keys.iter()
        .map(|key| key.clone().map_or(CellValue::Missing, CellValue::Text))
        .collect()
}

fn log_recovered(
    audit: &mut AuditLog,
    table: TableKind,
    column: &str,
    composites: &[Option<CompositeKey>],
    recovered: &[(usize, String)],
) {
    for (row, key) in recovered {
        let candidates = composites[*row]
            .iter()
            .flatten()
            .map(|part| CellValue::Text(part.clone()))
            .collect();
        audit.push(
            AuditEntry::new(Stage::Recovery, table, column, Decision::KeyRecovered)
                .with_row(*row)
                .with_key(key.clone())
                .with_candidates(candidates)
                .with_chosen(CellValue::Text(key.clone())),
        );
    }
}

/// Bidirectional key recovery followed by placeholder assignment.
///
/// Without a recovery spec, or when a match column is absent from either
/// table, only placeholders are assigned.
pub fn recover_keys(
    policies: &ClaimsFrame,
    claims: &ClaimsFrame,
    schema: &LineSchema,
    max_iterations: Option<usize>,
    audit: &mut AuditLog,
) -> Result<(ClaimsFrame, ClaimsFrame, RecoverySummary)> {
    let key_column = schema.keys.policy_id.as_str();
    policies.require_column(key_column)?;
    claims.require_column(key_column)?;

    let mut summary = RecoverySummary {
        converged: true,
        ..RecoverySummary::default()
    };
    let mut policy_keys = policies.keys(key_column)?;
    let mut claim_keys = claims.keys(key_column)?;
    let mut policies_changed = false;
    let mut claims_changed = false;

    let spec = schema.recovery.as_ref().filter(|spec| {
        let absent: Vec<&String> = spec
            .match_on
            .iter()
            .filter(|name| !policies.has_column(name) || !claims.has_column(name))
            .collect();
        if spec.match_on.is_empty() || !absent.is_empty() {
            warn!(schema = %schema.name, ?absent, "recovery columns unavailable, key recovery skipped");
            return false;
        }
        true
    });

    if let Some(spec) = spec {
        let policy_composites = composites(policies, spec)?;
        let claim_composites = composites(claims, spec)?;
        let cap = max_iterations.unwrap_or(spec.max_iterations);
        summary.converged = false;

        for iteration in 1..=cap {
            let lookup = build_lookup(&claim_keys, &claim_composites);
            let (next, from_claims) = recover_direction(&policy_keys, &policy_composites, &lookup);
            policy_keys = next;
            log_recovered(audit, TableKind::Policy, key_column, &policy_composites, &from_claims);

            let lookup = build_lookup(&policy_keys, &policy_composites);
            let (next, from_policies) = recover_direction(&claim_keys, &claim_composites, &lookup);
            claim_keys = next;
            log_recovered(audit, TableKind::Claim, key_column, &claim_composites, &from_policies);

            let pass = RecoveryPass {
                policies_recovered: from_claims.len(),
                claims_recovered: from_policies.len(),
            };
            debug!(
                iteration,
                policies = pass.policies_recovered,
                claims = pass.claims_recovered,
                "key recovery pass"
            );
            summary.passes.push(pass);
            policies_changed |= pass.policies_recovered > 0;
            claims_changed |= pass.claims_recovered > 0;
            if pass.policies_recovered == 0 && pass.claims_recovered == 0 {
                summary.converged = true;
                break;
            }
        }
        if !summary.converged {
            warn!(cap, "key recovery stopped at the iteration cap");
        }

        let policy_lookup = build_lookup(&claim_keys, &claim_composites);
        let claim_lookup = build_lookup(&policy_keys, &policy_composites);
        for (table, keys, row_composites, lookup) in [
            (TableKind::Policy, &policy_keys, &policy_composites, &policy_lookup),
            (TableKind::Claim, &claim_keys, &claim_composites, &claim_lookup),
        ] {
            for (row, key) in keys.iter().enumerate() {
                if key.is_some() {
                    continue;
                }
                let Some(composite) = &row_composites[row] else {
                    continue;
                };
                let Some(candidates) = lookup.ambiguous.get(composite) else {
                    continue;
                };
                let candidates: Vec<String> = candidates.iter().cloned().collect();
                warn!(%table, row, ?composite, ?candidates, "ambiguous composite key, row skipped");
                audit.push(
                    AuditEntry::new(Stage::Recovery, table, key_column, Decision::AmbiguousSkipped)
                        .with_row(row)
                        .with_candidates(candidates.iter().cloned().map(CellValue::Text).collect()),
                );
                summary.ambiguous.push(AmbiguousMatch {
                    table,
                    row,
                    composite: composite.clone(),
                    candidates,
                });
            }
        }
    }

    for (row, key) in claim_keys.iter().enumerate() {
        if key.is_none() {
            summary.unresolved_claims.push(row);
            audit.push(
                AuditEntry::new(Stage::Recovery, TableKind::Claim, key_column, Decision::Unresolved)
                    .with_row(row),
            );
        }
    }
    if !summary.unresolved_claims.is_empty() {
        warn!(
            rows = summary.unresolved_claims.len(),
            "claims left without a policy key"
        );
    }

    let placeholders = assign_placeholders(&mut policy_keys, &schema.placeholder);
    for (row, key) in &placeholders {
        audit.push(
            AuditEntry::new(Stage::Recovery, TableKind::Policy, key_column, Decision::Placeholder)
                .with_row(*row)
                .with_key(key.clone())
                .with_chosen(CellValue::Text(key.clone())),
        );
    }
    policies_changed |= !placeholders.is_empty();
    summary.placeholders = placeholders;

    info!(
        policies = summary.policies_recovered(),
        claims = summary.claims_recovered(),
        passes = summary.passes.len(),
        ambiguous = summary.ambiguous.len(),
        placeholders = summary.placeholders.len(),
        "recovered policy keys"
    );

    let policies = if policies_changed {
        policies.with_cells(key_column, &key_cells(&policy_keys))?
    } else {
        policies.clone()
    };
    let claims = if claims_changed {
        claims.with_cells(key_column, &key_cells(&claim_keys))?
    } else {
        claims.clone()
    };
    Ok((policies, claims, summary))
}

/// Gives every missing key a placeholder, in row order.
///
/// Counters continue after the largest one already present for the prefix.
pub fn assign_placeholders(
    keys: &mut [Option<String>],
    spec: &PlaceholderSpec,
) -> Vec<(usize, String)> {
    let mut counter = keys
        .iter()
        .flatten()
        .filter_map(|key| spec.counter_of(key))
        .max()
        .unwrap_or(0);
    let mut assigned = Vec::new();
    for (row, key) in keys.iter_mut().enumerate() {
        if key.is_none() {
            counter += 1;
            let placeholder = spec.format(counter);
            *key = Some(placeholder.clone());
            assigned.push((row, placeholder));
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_rounds_numbers_and_trims_text() {
        let shipment = CellValue::from(" S-01234 ");
        let exposure = CellValue::Number(0.812_34);
        assert_eq!(
            composite_key(&[&shipment, &exposure], 4),
            Some(vec!["S-01234".to_string(), "0.8123".to_string()])
        );
        let negative_zero = CellValue::Number(-0.000_01);
        assert_eq!(
            composite_key(&[&negative_zero], 4),
            Some(vec!["0.0000".to_string()])
        );
        assert_eq!(composite_key(&[&shipment, &CellValue::Missing], 4), None);
    }

    #[test]
    fn placeholders_continue_existing_counters() {
        let spec = PlaceholderSpec::default();
        let mut keys = vec![Some("MI-0003".to_string()), None, Some("P1".to_string()), None];
        let assigned = assign_placeholders(&mut keys, &spec);
        assert_eq!(
            assigned,
            vec![(1, "MI-0004".to_string()), (3, "MI-0005".to_string())]
        );
        assert!(keys.iter().all(Option::is_some));
    }
}
