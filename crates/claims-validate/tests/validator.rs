use claims_model::{CellValue, LineSchema, TableKind};
use claims_validate::{FieldValidator, Issue, ValidateError, validate_table};
use polars::prelude::*;
use proptest::prelude::*;

const SCHEMA: &str = r#"
name = "business_interruption"

[[columns]]
name = "station_id"
rule = { kind = "pattern", regex = "[A-Z][0-9]" }
shared = true
fill = "mode"

[[columns]]
name = "solar_system"
rule = { kind = "isin", values = ["Helionis Cluster", "Epsilon", "Zeta"] }
shared = true
fill = "mode"

[[columns]]
name = "supply_chain_index"
rule = { kind = "range", lo = 0.0, hi = 1.0 }
shared = true
fill = "median"

[[columns]]
name = "broken"
rule = { kind = "pattern", regex = "([A-Z]" }

[[columns]]
name = "claim_amount"
rule = { kind = "range", lo = 0.0 }
tables = "claim"
"#;

fn schema() -> LineSchema {
    toml::from_str(SCHEMA).expect("schema")
}

#[test]
fn malformed_rule_is_reported_and_skipped() {
    let validator = FieldValidator::from_schema(&schema());
    assert!(!validator.knows("broken"));
    assert_eq!(validator.warnings().len(), 1);
    assert_eq!(validator.warnings()[0].column.as_deref(), Some("broken"));
    assert!(validator.knows("station_id"));
}

#[test]
fn unknown_columns_are_errors_for_validate() {
    let validator = FieldValidator::from_schema(&schema());
    let err = validator
        .validate("nope", &CellValue::Number(1.0))
        .expect_err("unknown column");
    assert!(matches!(err, ValidateError::UnknownColumn { .. }));
    assert!(validator.is_valid("nope", &CellValue::Missing));
}

#[test]
fn validates_supply_chain_scenario() {
    let validator = FieldValidator::from_schema(&schema());
    assert_eq!(
        validator
            .validate("supply_chain_index", &CellValue::Number(-1.3))
            .ok(),
        Some(false)
    );
    assert_eq!(
        validator
            .validate("supply_chain_index", &CellValue::Number(0.6))
            .ok(),
        Some(true)
    );
}

#[test]
fn missing_declared_column_does_not_fail_report() {
    let schema = schema();
    let validator = FieldValidator::from_schema(&schema);
    let policies = DataFrame::new(vec![
        Column::new("station_id".into(), vec!["A1", "G3"]),
        Column::new("solar_system".into(), vec!["Zeta", "Epsilon"]),
    ])
    .expect("frame");

    let report = validate_table(&validator, &schema, &policies, TableKind::Policy).expect("report");
    assert_eq!(
        report.issues,
        vec![Issue::ColumnMissing {
            column: "supply_chain_index".to_string()
        }]
    );
    assert!(report.issues[0].is_exempt());
    assert!(report.is_clean());
    assert_eq!(report.checked_columns, 2);
}

#[test]
fn table_report_separates_exempt_columns() {
    let schema = schema();
    let validator = FieldValidator::from_schema(&schema);
    let claims = DataFrame::new(vec![
        Column::new("station_id".into(), vec![Some("A1"), Some("bad"), None]),
        Column::new("solar_system".into(), vec!["Zeta", "Zeta", "Epsilon"]),
        Column::new("claim_amount".into(), vec![100.0, -5.0, -7.0]),
    ])
    .expect("frame");

    let report = validate_table(&validator, &schema, &claims, TableKind::Claim).expect("report");
    assert_eq!(report.rows, 3);
    assert!(!report.is_clean());
    assert_eq!(report.invalid_count(), 4);
    assert!(report.issues.contains(&Issue::ColumnMissing {
        column: "supply_chain_index".to_string()
    }));
    let amount = report
        .issues
        .iter()
        .find(|issue| issue.column() == "claim_amount")
        .expect("amount issue");
    assert!(amount.is_exempt());

    let mask = validator.column_mask(&claims, "station_id").expect("mask");
    assert_eq!(mask, vec![true, false, false]);
}

proptest! {
    #[test]
    fn range_accepts_exactly_values_within_bounds(v in -10.0f64..10.0) {
        let validator = FieldValidator::from_schema(&schema());
        let valid = validator.validate("supply_chain_index", &CellValue::Number(v)).ok();
        prop_assert_eq!(valid, Some((0.0..=1.0).contains(&v)));
        let as_text = validator
            .validate("supply_chain_index", &CellValue::Text(format!("{v}")))
            .ok();
        prop_assert_eq!(as_text, valid);
    }
}
