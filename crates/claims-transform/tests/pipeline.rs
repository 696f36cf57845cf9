//! End-to-end tests for the cleaning pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use claims_common::column_cells;
use claims_ingest::{IngestError, TableLoader};
use claims_model::{AuditLog, CellValue, Decision, LineSchema};
use claims_transform::reconcile::{reconcile_cross, reconcile_internal};
use claims_transform::{ClaimsFrame, CleaningPipeline, PipelineOptions, TransformError};
use polars::prelude::*;
use proptest::prelude::*;

const SCHEMA: &str = r#"
name = "cargo_test"
group_by = "cargo_type"

[[identifiers]]
table = "policy"
column = "policy_id"
length = 9
sequential = true

[[identifiers]]
table = "claim"
column = "policy_id"
length = 9

[recovery]
match_on = ["shipment_id", "exposure"]
precision = 4

[cap]
amount = "claim_amount"
limit = "cargo_value"

[[columns]]
name = "cargo_type"
rule = { kind = "isin", values = ["gold", "silver", "cobalt"] }
shared = true
fill = "mode"
fallback = "gold"

[[columns]]
name = "route_risk"
rule = { kind = "isin", values = [1, 2, 3, 4, 5] }
shared = true
magnitude = "discrete"
fill = "mode"
fallback = 3

[[columns]]
name = "exposure"
rule = { kind = "range", lo = 0.0, hi = 1.0 }
shared = true
priority = "policy"
magnitude = "scale"
fill = "median"
fallback = 0.5

[[columns]]
name = "cargo_value"
rule = { kind = "range", lo = 0.0 }
"#;

const CARGO_TYPES: [&str; 3] = ["gold", "silver", "cobalt"];

fn schema() -> LineSchema {
    toml::from_str(SCHEMA).unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Clean,
    Negative,
    Scaled,
    Missing,
}

impl Fault {
    fn apply(self, value: f64) -> Option<f64> {
        match self {
            Fault::Clean => Some(value),
            Fault::Negative => Some(-value),
            Fault::Scaled => Some(value * 10.0),
            Fault::Missing => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ClaimCase {
    amount: u32,
    drop_key: bool,
    drop_shipment: bool,
    risk: Fault,
}

#[derive(Debug, Clone)]
struct PolicyCase {
    cargo_type: usize,
    suffixed: bool,
    route_risk: u8,
    exposure: u32,
    cargo_value: u32,
    risk: Fault,
    exposure_fault: Fault,
    drop_key: bool,
    claims: Vec<ClaimCase>,
}

fn fault() -> impl Strategy<Value = Fault> {
    prop_oneof![
        6 => Just(Fault::Clean),
        1 => Just(Fault::Negative),
        1 => Just(Fault::Scaled),
        1 => Just(Fault::Missing),
    ]
}

fn claim_case() -> impl Strategy<Value = ClaimCase> {
    (
        prop_oneof![1 => Just(0u32), 6 => 1u32..6000],
        prop::bool::weighted(0.2),
        prop::bool::weighted(0.1),
        fault(),
    )
        .prop_map(|(amount, drop_key, drop_shipment, risk)| ClaimCase {
            amount,
            drop_key,
            drop_shipment,
            risk,
        })
}

fn policy_case() -> impl Strategy<Value = PolicyCase> {
    (
        (0usize..3, prop::bool::weighted(0.2), 1u8..=5),
        (1001u32..=9000, 1000u32..=5000),
        (fault(), fault(), prop::bool::weighted(0.2)),
        prop::collection::vec(claim_case(), 0..4),
    )
        .prop_map(
            |(
                (cargo_type, suffixed, route_risk),
                (exposure, cargo_value),
                (risk, exposure_fault, drop_key),
                claims,
            )| PolicyCase {
                cargo_type,
                suffixed,
                route_risk,
                exposure,
                cargo_value,
                risk,
                exposure_fault,
                drop_key,
                claims,
            },
        )
}

fn policy_key(idx: usize) -> String {
    format!("CL-{:06}", idx + 1)
}

fn build_tables(cases: &[PolicyCase]) -> (DataFrame, DataFrame) {
    let mut p_keys = Vec::new();
    let mut p_shipments = Vec::new();
    let mut p_types = Vec::new();
    let mut p_risks = Vec::new();
    let mut p_exposures = Vec::new();
    let mut p_values = Vec::new();
    let mut p_counts = Vec::new();

    let mut c_keys = Vec::new();
    let mut c_ids = Vec::new();
    let mut c_seqs = Vec::new();
    let mut c_shipments = Vec::new();
    let mut c_types = Vec::new();
    let mut c_risks = Vec::new();
    let mut c_exposures = Vec::new();
    let mut c_values = Vec::new();
    let mut c_amounts = Vec::new();

    for (idx, case) in cases.iter().enumerate() {
        let key = policy_key(idx);
        let shipment = format!("S-{:05}", idx + 1);
        let exposure = f64::from(case.exposure) / 10_000.0;
        let risk = f64::from(case.route_risk);
        let cargo_type = CARGO_TYPES[case.cargo_type];

        p_keys.push((!case.drop_key).then(|| key.clone()));
        p_shipments.push(Some(shipment.clone()));
        p_types.push(Some(if case.suffixed {
            format!("{cargo_type}_XXX{}", idx + 10)
        } else {
            cargo_type.to_string()
        }));
        p_risks.push(case.risk.apply(risk));
        p_exposures.push(case.exposure_fault.apply(exposure));
        p_values.push(Some(f64::from(case.cargo_value)));
        p_counts.push(Some(7i64));

        for claim in &case.claims {
            let claim_no = c_ids.len() + 1;
            c_keys.push((!claim.drop_key).then(|| key.clone()));
            c_ids.push(Some(format!("C-{claim_no:05}")));
            c_seqs.push(Some(1i64));
            c_shipments.push((!claim.drop_shipment).then(|| shipment.clone()));
            c_types.push(Some(cargo_type.to_string()));
            c_risks.push(claim.risk.apply(risk));
            c_exposures.push(Some(exposure));
            c_values.push(Some(f64::from(case.cargo_value)));
            c_amounts.push(Some(f64::from(claim.amount)));
        }
    }

    let policies = DataFrame::new(vec![
        Column::new("policy_id".into(), p_keys),
        Column::new("shipment_id".into(), p_shipments),
        Column::new("cargo_type".into(), p_types),
        Column::new("route_risk".into(), p_risks),
        Column::new("exposure".into(), p_exposures),
        Column::new("cargo_value".into(), p_values),
        Column::new("claim_count".into(), p_counts),
    ])
    .unwrap();
    let claims = DataFrame::new(vec![
        Column::new("policy_id".into(), c_keys),
        Column::new("claim_id".into(), c_ids),
        Column::new("claim_seq".into(), c_seqs),
        Column::new("shipment_id".into(), c_shipments),
        Column::new("cargo_type".into(), c_types),
        Column::new("route_risk".into(), c_risks),
        Column::new("exposure".into(), c_exposures),
        Column::new("cargo_value".into(), c_values),
        Column::new("claim_amount".into(), c_amounts),
    ])
    .unwrap();
    (policies, claims)
}

fn keys(df: &DataFrame) -> Vec<Option<String>> {
    column_cells(df, "policy_id")
        .unwrap()
        .iter()
        .map(claims_transform::frame::key_of)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_pipeline_invariants(cases in prop::collection::vec(policy_case(), 1..12)) {
        let schema = schema();
        let pipeline = CleaningPipeline::new(&schema, PipelineOptions::new().with_seed(11));
        let (policies, claims) = build_tables(&cases);
        let claims_in = claims.height();
        let out = pipeline.run(policies, claims).unwrap();
        let report = &out.report;

        // row counts
        prop_assert_eq!(out.policies.height(), cases.len());
        prop_assert_eq!(out.modeling.height(), cases.len());
        prop_assert_eq!(report.claim_rows_in, claims_in);
        prop_assert_eq!(out.claims.height(), claims_in - report.dropped_claims);

        // every policy has a key and the keys are unique
        let policy_keys = keys(&out.policies);
        prop_assert!(policy_keys.iter().all(Option::is_some));
        let mut distinct = policy_keys.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(distinct.len(), policy_keys.len());

        // claim counts match the claim rows
        let claim_keys = keys(&out.claims);
        let mut per_key: BTreeMap<String, usize> = BTreeMap::new();
        for key in claim_keys.iter().flatten() {
            *per_key.entry(key.clone()).or_insert(0) += 1;
        }
        let counts = column_cells(&out.policies, "claim_count").unwrap();
        for (key, count) in policy_keys.iter().zip(&counts) {
            let expected = key.as_ref().and_then(|k| per_key.get(k)).copied().unwrap_or(0);
            prop_assert_eq!(count.as_f64(), Some(expected as f64));
        }

        // sequence numbers run 1..=n within each key; no key, no number
        let seqs = column_cells(&out.claims, "claim_seq").unwrap();
        let mut seen: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (key, seq) in claim_keys.iter().zip(&seqs) {
            match key {
                Some(key) => seen.entry(key.clone()).or_default().push(seq.as_f64().unwrap()),
                None => {
                    prop_assert!(seq.is_missing());
                }
            }
        }
        for mut numbers in seen.into_values() {
            numbers.sort_by(f64::total_cmp);
            let expected: Vec<f64> = (1..=numbers.len()).map(|n| n as f64).collect();
            prop_assert_eq!(numbers, expected);
        }

        // amounts are positive and capped
        let amounts = column_cells(&out.claims, "claim_amount").unwrap();
        let limits = column_cells(&out.claims, "cargo_value").unwrap();
        for (amount, limit) in amounts.iter().zip(&limits) {
            let amount = amount.as_f64().unwrap();
            prop_assert!(amount > 0.0);
            prop_assert!(amount <= limit.as_f64().unwrap());
        }

        prop_assert!(report.totals.is_consistent());
        prop_assert!(report.is_valid(), "validity: {:?}", report.validity);

        // a second cross-table pass has nothing left to change
        let mut audit = AuditLog::new();
        let (_, _, again) = reconcile_cross(
            &ClaimsFrame::policies(out.policies.clone()),
            &ClaimsFrame::claims(out.claims.clone()),
            &schema,
            pipeline.validator(),
            &mut audit,
        )
        .unwrap();
        prop_assert_eq!(again.cross_total(), 0);

        // every linked claim carries its policy's shared attributes
        let policy_row: BTreeMap<&str, usize> = policy_keys
            .iter()
            .enumerate()
            .filter_map(|(row, key)| key.as_deref().map(|k| (k, row)))
            .collect();
        for spec in schema.shared_columns() {
            let policy_values = column_cells(&out.policies, &spec.name).unwrap();
            let claim_values = column_cells(&out.claims, &spec.name).unwrap();
            for (key, value) in claim_keys.iter().zip(&claim_values) {
                let Some(&row) = key.as_deref().and_then(|k| policy_row.get(k)) else {
                    continue;
                };
                prop_assert!(
                    value.loosely_eq(&policy_values[row]),
                    "{} differs for {:?}: claim {:?}, policy {:?}",
                    spec.name,
                    key,
                    value,
                    policy_values[row]
                );
            }
        }

        // a second within-table pass has nothing left to change
        for frame in [
            ClaimsFrame::policies(out.policies.clone()),
            ClaimsFrame::claims(out.claims.clone()),
        ] {
            let (_, again) =
                reconcile_internal(&frame, &schema, pipeline.validator(), &mut audit).unwrap();
            prop_assert_eq!(again.internal_total(), 0);
        }
    }

    #[test]
    fn prop_seeded_runs_repeat(cases in prop::collection::vec(policy_case(), 1..8)) {
        let schema = schema();
        let pipeline = CleaningPipeline::new(&schema, PipelineOptions::new().with_seed(3));
        let (policies, claims) = build_tables(&cases);
        let first = pipeline.run(policies.clone(), claims.clone()).unwrap();
        let second = pipeline.run(policies, claims).unwrap();
        prop_assert!(first.policies.equals_missing(&second.policies));
        prop_assert!(first.claims.equals_missing(&second.claims));
        prop_assert_eq!(first.audit, second.audit);
        prop_assert_eq!(first.report, second.report);
    }
}

fn fixed_cases() -> Vec<PolicyCase> {
    let claim = |amount, drop_key| ClaimCase {
        amount,
        drop_key,
        drop_shipment: false,
        risk: Fault::Clean,
    };
    vec![
        PolicyCase {
            cargo_type: 0,
            suffixed: true,
            route_risk: 2,
            exposure: 8123,
            cargo_value: 1000,
            risk: Fault::Scaled,
            exposure_fault: Fault::Clean,
            drop_key: false,
            claims: vec![claim(500, false), claim(2500, true)],
        },
        PolicyCase {
            cargo_type: 1,
            suffixed: false,
            route_risk: 4,
            exposure: 5000,
            cargo_value: 3000,
            risk: Fault::Negative,
            exposure_fault: Fault::Scaled,
            drop_key: true,
            claims: vec![claim(0, false)],
        },
        PolicyCase {
            cargo_type: 2,
            suffixed: false,
            route_risk: 5,
            exposure: 2500,
            cargo_value: 2000,
            risk: Fault::Missing,
            exposure_fault: Fault::Missing,
            drop_key: false,
            claims: vec![],
        },
    ]
}

#[test]
fn test_fixed_dataset_report() {
    let schema = schema();
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::default());
    let (policies, claims) = build_tables(&fixed_cases());
    let out = pipeline.run(policies, claims).unwrap();
    let report = &out.report;

    assert_eq!(report.schema, "cargo_test");
    assert_eq!(report.text.suffixes_stripped, 1);
    // second policy key comes back from the row above
    assert_eq!(report.policy_identifiers.recovered_total(), 1);
    assert_eq!(report.recovery.claims_recovered(), 1);
    assert!(report.recovery.placeholders.is_empty());
    assert_eq!(report.capped_amounts, 1);
    assert_eq!(report.dropped_claims, 1);
    assert!(report.is_valid());

    assert_eq!(
        column_cells(&out.policies, "cargo_type").unwrap(),
        vec![
            CellValue::from("gold"),
            CellValue::from("silver"),
            CellValue::from("cobalt"),
        ]
    );
    // the cobalt group has no valid score, so the global mode applies
    assert_eq!(
        column_cells(&out.policies, "route_risk").unwrap(),
        vec![
            CellValue::Number(2.0),
            CellValue::Number(4.0),
            CellValue::Number(2.0),
        ]
    );
    assert_eq!(
        column_cells(&out.modeling, "claim_amount").unwrap(),
        vec![
            CellValue::Number(1500.0),
            CellValue::Number(0.0),
            CellValue::Number(0.0),
        ]
    );
    assert_eq!(
        column_cells(&out.modeling, "claim_count").unwrap(),
        vec![
            CellValue::Number(2.0),
            CellValue::Number(0.0),
            CellValue::Number(0.0),
        ]
    );
    assert_eq!(out.audit.count(Decision::AmountCapped), 1);
    assert_eq!(out.audit.count(Decision::ClaimDropped), 1);

    let json = serde_json::to_value(report).unwrap();
    assert_eq!(json["totals"]["claim_total"], 1500.0);
    assert_eq!(json["dropped_claims"], 1);
}

#[test]
fn test_audit_can_be_disabled() {
    let schema = schema();
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::new().without_audit());
    let (policies, claims) = build_tables(&fixed_cases());
    let out = pipeline.run(policies, claims).unwrap();
    assert!(out.audit.is_empty());
    assert_eq!(out.report.dropped_claims, 1);
}

#[test]
fn test_missing_claim_amount_is_structural_error() {
    let schema = schema();
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::default());
    let (policies, claims) = build_tables(&fixed_cases());
    let claims = claims.drop("claim_amount").unwrap();
    let err = pipeline.run(policies, claims).unwrap_err();
    assert!(matches!(
        err,
        TransformError::MissingKeyColumn { ref column, .. } if column == "claim_amount"
    ));
}

struct MemoryLoader(BTreeMap<String, DataFrame>);

impl TableLoader for MemoryLoader {
    fn load(&self, name: &str) -> claims_ingest::Result<DataFrame> {
        self.0.get(name).cloned().ok_or_else(|| IngestError::FileNotFound {
            path: PathBuf::from(format!("{name}.csv")),
        })
    }
}

#[test]
fn test_run_from_loader() {
    let schema = schema();
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::default());
    let (policies, claims) = build_tables(&fixed_cases());
    let loader = MemoryLoader(BTreeMap::from([
        ("cargo_freq".to_string(), policies),
        ("cargo_sev".to_string(), claims),
    ]));

    let out = pipeline.run_from(&loader, "cargo_freq", "cargo_sev").unwrap();
    assert_eq!(out.policies.height(), 3);

    let err = pipeline.run_from(&loader, "cargo_freq", "missing").unwrap_err();
    assert!(matches!(err, TransformError::Ingest(IngestError::FileNotFound { .. })));
}

#[test]
fn test_schema_warnings_surface_in_report() {
    let mut schema = schema();
    schema.columns.push(claims_model::ColumnSpec {
        name: "bad_range".to_string(),
        rule: claims_model::RuleSpec::Range {
            lo: Some(5.0),
            hi: Some(1.0),
        },
        tables: claims_model::TableScope::Both,
        shared: false,
        priority: claims_model::SourcePriority::Claim,
        magnitude: claims_model::MagnitudeMode::Off,
        fill: None,
        fallback: None,
        group_by: None,
    });
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::default());
    assert!(pipeline.warnings().iter().any(|w| w.column.as_deref() == Some("bad_range")));

    let (policies, claims) = build_tables(&fixed_cases());
    let out = pipeline.run(policies, claims).unwrap();
    assert!(
        out.report
            .schema_warnings
            .iter()
            .any(|w| w.column.as_deref() == Some("bad_range"))
    );
    assert!(out.report.is_valid());
}
