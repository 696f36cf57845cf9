//! Tests for writing the artifacts of a cleaning run.

use std::fs;
use std::path::Path;

use claims_cli::output::{OutputPaths, write_outputs};
use claims_ingest::{CsvFormat, CsvLoader, read_csv_frame};
use claims_standards::load_schema;
use claims_transform::{CleaningPipeline, PipelineOptions};

const SCHEMA: &str = r#"
name = "toy"
label = "Toy line"

[[columns]]
name = "region"
rule = { kind = "isin", values = ["north", "south"] }
shared = true
fill = "mode"
fallback = "north"

[[columns]]
name = "exposure"
rule = { kind = "range", lo = 0.0, hi = 1.0 }
shared = true
priority = "policy"
fill = "median"
fallback = 0.5
"#;

const POLICIES: &str = "\
policy_id,region,exposure,claim_count
P-0001,north,0.5,1
P-0002,south,0.25,0
P-0003,,0.75,0
";

const CLAIMS: &str = "\
policy_id,claim_id,claim_seq,region,exposure,claim_amount
P-0001,C-0001,1,north,0.5,120.5
";

fn write_fixture(dir: &Path) {
    fs::write(dir.join("toy.toml"), SCHEMA).unwrap();
    fs::write(dir.join("toy_claims_freq.csv"), POLICIES).unwrap();
    fs::write(dir.join("toy_claims_sev.csv"), CLAIMS).unwrap();
}

#[test]
fn test_output_paths_follow_table_names() {
    let paths = OutputPaths::new(
        Path::new("out"),
        "cargo",
        "cargo_claims_freq",
        "cargo_claims_sev",
        true,
    );
    assert_eq!(paths.policies, Path::new("out/cargo_claims_freq_clean.csv"));
    assert_eq!(paths.claims, Path::new("out/cargo_claims_sev_clean.csv"));
    assert_eq!(paths.modeling, Path::new("out/cargo_modeling.csv"));
    assert_eq!(paths.report, Path::new("out/cargo_report.json"));
    assert_eq!(paths.audit.as_deref(), Some(Path::new("out/cargo_audit.json")));
    assert_eq!(paths.all().len(), 5);
}

#[test]
fn test_output_paths_without_audit() {
    let paths = OutputPaths::new(Path::new("out"), "cargo", "a", "b", false);
    assert!(paths.audit.is_none());
    assert_eq!(paths.all().len(), 4);
}

#[test]
fn test_write_outputs_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let schema = load_schema(dir.path(), "toy").unwrap();
    let loader = CsvLoader::new(dir.path());
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::new());
    let mut output = pipeline
        .run_from(&loader, "toy_claims_freq", "toy_claims_sev")
        .unwrap();
    assert!(output.report.is_valid());

    let out_dir = dir.path().join("nested").join("output");
    let paths = OutputPaths::new(&out_dir, "toy", "toy_claims_freq", "toy_claims_sev", true);
    let format = CsvFormat::comma();
    let written = write_outputs(&mut output, &paths, &format).unwrap();

    assert_eq!(written.len(), 5);
    for path in &written {
        assert!(path.is_file(), "missing {}", path.display());
    }

    let policies = read_csv_frame(&paths.policies, &format).unwrap();
    assert_eq!(policies.height(), 3);
    let claims = read_csv_frame(&paths.claims, &format).unwrap();
    assert_eq!(claims.height(), 1);
    let modeling = read_csv_frame(&paths.modeling, &format).unwrap();
    assert_eq!(modeling.height(), 3);
    assert!(modeling.column("claim_amount").is_ok());

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.report).unwrap()).unwrap();
    assert_eq!(report["schema"], "toy");
    assert_eq!(report["totals"]["claim_total"], 120.5);
    assert_eq!(report["policy_rows_out"], 3);

    let audit: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(paths.audit.unwrap()).unwrap()).unwrap();
    let entries = audit.as_array().unwrap();
    // the blank region is filled from the mode
    assert!(
        entries
            .iter()
            .any(|entry| entry["column"] == "region" && entry["table"] == "policy")
    );
}

#[test]
fn test_write_outputs_semicolon_locale() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let schema = load_schema(dir.path(), "toy").unwrap();
    let pipeline = CleaningPipeline::new(&schema, PipelineOptions::new().without_audit());
    let mut output = pipeline
        .run_from(&CsvLoader::new(dir.path()), "toy_claims_freq", "toy_claims_sev")
        .unwrap();

    let paths = OutputPaths::new(dir.path(), "toy", "toy_claims_freq", "toy_claims_sev", false);
    let format = CsvFormat::semicolon();
    let written = write_outputs(&mut output, &paths, &format).unwrap();
    assert_eq!(written.len(), 4);

    let text = fs::read_to_string(&paths.claims).unwrap();
    assert!(text.starts_with("policy_id;"));
    assert!(text.contains("120,5"));
}
