use std::time::Instant;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use polars::prelude::DataFrame;
use tracing::{info, info_span};

use claims_common::column_cells;
use claims_ingest::{CachedLoader, CsvFormat, CsvLoader, TableLoader};
use claims_model::{LineSchema, TableKind};
use claims_standards::{SchemaRegistry, default_schemas_root, lint_schema, load_schema};
use claims_transform::identifier::{IdentifierIssue, validate_identifiers};
use claims_transform::{CleaningPipeline, PipelineOptions};
use claims_validate::{FieldValidator, validate_table};

use claims_cli::output::{OutputPaths, write_outputs};

use crate::cli::{CsvLocaleArg, RunArgs, SchemasArgs, TableArgs};
use crate::summary::{apply_table_style, dim_cell, header_cell};
use crate::types::{IdentifierCheck, RunResult, ValidateResult};

pub fn run_schemas(args: &SchemasArgs) -> Result<()> {
    let root = args.schemas_dir.clone().unwrap_or_else(default_schemas_root);
    let registry = SchemaRegistry::load_dir(&root)
        .with_context(|| format!("load schemas from {}", root.display()))?;
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Schema"),
        header_cell("Label"),
        header_cell("Columns"),
        header_cell("Shared"),
        header_cell("Identifiers"),
        header_cell("Recovery key"),
        header_cell("Cap"),
    ]);
    apply_table_style(&mut table);
    let mut warnings = Vec::new();
    for schema in registry.iter() {
        let recovery = schema
            .recovery
            .as_ref()
            .map(|spec| spec.match_on.join(" + "));
        let cap = schema
            .cap
            .as_ref()
            .map(|cap| format!("{} <= {}", cap.amount, cap.limit));
        table.add_row(vec![
            header_cell(&schema.name),
            Cell::new(schema.display_name()),
            Cell::new(schema.columns.len()),
            Cell::new(schema.shared_columns().count()),
            Cell::new(schema.identifiers.len()),
            recovery.map_or_else(|| dim_cell("-"), Cell::new),
            cap.map_or_else(|| dim_cell("-"), Cell::new),
        ]);
        warnings.extend(lint_schema(schema));
    }
    println!("Schemas: {}", registry.root().display());
    println!("{table}");
    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in warnings {
            println!("- {warning}");
        }
    }
    Ok(())
}

pub fn run_clean(args: &RunArgs) -> Result<RunResult> {
    let tables = &args.tables;
    let span = info_span!("run", schema = %tables.schema);
    let _guard = span.enter();

    let schema = load_line_schema(tables)?;
    let loader = CachedLoader::new(csv_loader(tables));
    let policy_table = tables.policy_table();
    let claim_table = tables.claim_table();

    let mut options = PipelineOptions::new();
    if let Some(seed) = args.seed {
        options = options.with_seed(seed);
    }
    if let Some(max_iterations) = args.max_iterations {
        options = options.with_max_iterations(max_iterations);
    }
    if args.no_audit {
        options = options.without_audit();
    }

    let start = Instant::now();
    let pipeline = CleaningPipeline::new(&schema, options);
    let mut output = pipeline
        .run_from(&loader, &policy_table, &claim_table)
        .with_context(|| format!("clean {policy_table} and {claim_table}"))?;
    info!(
        schema = %schema.name,
        duration_ms = start.elapsed().as_millis(),
        "cleaning complete"
    );

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| tables.data_dir.join("output"));
    let written = if args.dry_run {
        Vec::new()
    } else {
        let paths = OutputPaths::new(
            &output_dir,
            &schema.name,
            &policy_table,
            &claim_table,
            !args.no_audit,
        );
        write_outputs(&mut output, &paths, &csv_format(tables.csv))?
    };

    Ok(RunResult {
        schema: schema.display_name().to_string(),
        output_dir,
        written,
        audit_summary: output.audit.summary(),
        report: output.report,
        dry_run: args.dry_run,
    })
}

pub fn run_validate(args: &TableArgs) -> Result<ValidateResult> {
    let span = info_span!("validate", schema = %args.schema);
    let _guard = span.enter();

    let schema = load_line_schema(args)?;
    let loader = csv_loader(args);
    let policies = loader
        .load(&args.policy_table())
        .with_context(|| format!("load {}", args.policy_table()))?;
    let claims = loader
        .load(&args.claim_table())
        .with_context(|| format!("load {}", args.claim_table()))?;

    let validator = FieldValidator::from_schema(&schema);
    let mut warnings = lint_schema(&schema);
    for warning in validator.warnings() {
        if !warnings.iter().any(|w| w.column == warning.column) {
            warnings.push(warning.clone());
        }
    }
    let tables = vec![
        validate_table(&validator, &schema, &policies, TableKind::Policy)?,
        validate_table(&validator, &schema, &claims, TableKind::Claim)?,
    ];
    let mut identifiers = check_identifiers(&schema, &policies, TableKind::Policy)?;
    identifiers.extend(check_identifiers(&schema, &claims, TableKind::Claim)?);

    Ok(ValidateResult {
        schema: schema.display_name().to_string(),
        warnings,
        tables,
        identifiers,
    })
}

fn check_identifiers(
    schema: &LineSchema,
    df: &DataFrame,
    table: TableKind,
) -> Result<Vec<IdentifierCheck>> {
    let mut checks = Vec::new();
    for spec in schema.identifiers_for(table) {
        if df.column(&spec.column).is_err() {
            continue;
        }
        let cells = column_cells(df, &spec.column)
            .with_context(|| format!("read column {}", spec.column))?;
        let issues = validate_identifiers(&cells, spec.length);
        checks.push(IdentifierCheck {
            table,
            column: spec.column.clone(),
            length: spec.length,
            missing: issues
                .iter()
                .filter(|(_, issue)| *issue == IdentifierIssue::Missing)
                .count(),
            invalid: issues.len(),
        });
    }
    Ok(checks)
}

fn load_line_schema(args: &TableArgs) -> Result<LineSchema> {
    let root = args.schemas_dir.clone().unwrap_or_else(default_schemas_root);
    load_schema(&root, &args.schema)
        .with_context(|| format!("load schema {} from {}", args.schema, root.display()))
}

fn csv_loader(args: &TableArgs) -> CsvLoader {
    CsvLoader::new(args.data_dir.clone()).with_format(csv_format(args.csv))
}

fn csv_format(locale: CsvLocaleArg) -> CsvFormat {
    match locale {
        CsvLocaleArg::Comma => CsvFormat::comma(),
        CsvLocaleArg::Semicolon => CsvFormat::semicolon(),
    }
}
