use std::fs;

use claims_model::{FillMethod, MagnitudeMode, RuleSpec, TableKind};
use claims_standards::{
    SchemaError, SchemaRegistry, lint_schema, load_schema, load_schema_file,
};

#[test]
fn loads_shipped_schemas() {
    let registry = SchemaRegistry::load_default().expect("load schemas");
    let names: Vec<&str> = registry.names().collect();
    assert_eq!(
        names,
        vec!["business_interruption", "cargo", "equipment_failure", "workers_comp"]
    );

    for schema in registry.iter() {
        assert!(
            lint_schema(schema).is_empty(),
            "shipped schema {} should lint clean",
            schema.name
        );
        assert!(schema.shared_columns().count() > 0);
    }
}

#[test]
fn cargo_schema_declares_cap_and_recovery() {
    let registry = SchemaRegistry::load_default().expect("load schemas");
    let cargo = registry.get("cargo").expect("cargo schema");
    let cap = cargo.cap.as_ref().expect("cargo caps claim amounts");
    assert_eq!(cap.limit, "cargo_value");
    let recovery = cargo.recovery.as_ref().expect("cargo recovers keys");
    assert_eq!(recovery.match_on, vec!["shipment_id", "exposure"]);
    assert_eq!(recovery.precision, 4);

    let route_risk = cargo.column("route_risk").expect("route_risk");
    assert_eq!(route_risk.magnitude, MagnitudeMode::Discrete);
    assert_eq!(cargo.identifiers_for(TableKind::Claim).count(), 2);
}

#[test]
fn business_station_id_uses_pattern_and_sampling() {
    let registry = SchemaRegistry::load_default().expect("load schemas");
    let business = registry.get("business_interruption").expect("business schema");
    let station = business.column("station_id").expect("station_id");
    assert_eq!(
        station.rule,
        RuleSpec::Pattern {
            regex: "[A-Z][0-9]".to_string()
        }
    );
    assert_eq!(station.fill, Some(FillMethod::Sample));
}

#[test]
fn missing_schema_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_schema(dir.path(), "marine").expect_err("no such schema");
    assert!(matches!(err, SchemaError::NotFound { ref name, .. } if name == "marine"));
}

#[test]
fn malformed_toml_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    fs::write(&path, "name = \"broken\"\n[[columns]]\nname = 3\n").expect("write");
    let err = load_schema_file(&path).expect_err("invalid schema");
    match err {
        SchemaError::Toml { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_schema_names_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("a.toml"), "name = \"same\"\n").expect("write");
    fs::write(dir.path().join("b.toml"), "name = \"same\"\n").expect("write");
    fs::write(dir.path().join("notes.txt"), "ignored").expect("write");
    let err = SchemaRegistry::load_dir(dir.path()).expect_err("duplicate");
    assert!(matches!(err, SchemaError::Duplicate { ref name, .. } if name == "same"));
}
