use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};

use claims_transform::PipelineReport;
use claims_validate::{Issue, TableReport};

use crate::types::{RunResult, ValidateResult};

pub fn print_run_summary(result: &RunResult) {
    let report = &result.report;
    println!("Schema: {}", result.schema);
    if result.dry_run {
        println!("Dry run: no files written");
    } else {
        println!("Output: {}", result.output_dir.display());
        for path in &result.written {
            println!("  {}", path.display());
        }
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Rows in"),
        header_cell("Rows out"),
        header_cell("Removed"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    table.add_row(vec![
        table_cell("policy"),
        Cell::new(report.policy_rows_in),
        Cell::new(report.policy_rows_out),
        count_cell(report.policy_rows_in.saturating_sub(report.policy_rows_out), Color::Red),
    ]);
    table.add_row(vec![
        table_cell("claim"),
        Cell::new(report.claim_rows_in),
        Cell::new(report.claim_rows_out),
        count_cell(report.dropped_claims, Color::Yellow),
    ]);
    println!("{table}");

    print_stage_table(report);
    print_audit_table(result);
    print_validity(&report.validity);
    print_totals(report);

    if !report.schema_warnings.is_empty() {
        eprintln!("Schema warnings:");
        for warning in &report.schema_warnings {
            eprintln!("- {warning}");
        }
    }
}

fn print_stage_table(report: &PipelineReport) {
    let recovery = &report.recovery;
    let reconcile = &report.reconcile;
    let imputation = &report.imputation;
    let rows: Vec<(&str, &str, usize)> = vec![
        ("text", "cells cleaned", report.text.cleaned_total()),
        ("text", "suffixes stripped", report.text.suffixes_stripped),
        ("text", "coerced to numbers", report.text.coerced.values().sum()),
        (
            "identifier",
            "truncated",
            report.policy_identifiers.truncated_total() + report.claim_identifiers.truncated_total(),
        ),
        (
            "identifier",
            "sequential recoveries",
            report.policy_identifiers.recovered_total()
                + report.claim_identifiers.recovered_total(),
        ),
        (
            "identifier",
            "still invalid",
            report.policy_identifiers.issue_total() + report.claim_identifiers.issue_total(),
        ),
        ("magnitude", "sign flipped", report.magnitude.sign_flipped),
        ("magnitude", "scale shifted", report.magnitude.scale_shifted),
        ("magnitude", "group mode", report.magnitude.mode_fallbacks),
        ("sequence", "claim seq rewritten", report.resequenced),
        ("sequence", "claim counts rewritten", report.recounted),
        ("recovery", "policy keys recovered", recovery.policies_recovered()),
        ("recovery", "claim keys recovered", recovery.claims_recovered()),
        ("recovery", "ambiguous skipped", recovery.ambiguous.len()),
        ("recovery", "placeholders", recovery.placeholders.len()),
        ("recovery", "claims unresolved", recovery.unresolved_claims.len()),
        ("reconcile", "internal", reconcile.internal_total()),
        ("reconcile", "claim value kept", reconcile.claim_table),
        ("reconcile", "policy value kept", reconcile.policy_table),
        ("reconcile", "both invalid", reconcile.policy_fallback),
        ("impute", "group statistic", imputation.group),
        ("impute", "global statistic", imputation.global),
        ("impute", "constant", imputation.constant),
        ("impute", "sampled", imputation.sampled),
        ("impute", "left unfilled", imputation.unfilled.values().sum()),
        ("merge", "amounts capped", report.capped_amounts),
        ("merge", "claims dropped", report.dropped_claims),
    ];

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Outcome"),
        header_cell("Count"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for (stage, outcome, count) in rows {
        table.add_row(vec![
            Cell::new(stage).fg(Color::Blue),
            Cell::new(outcome),
            count_cell(count, Color::Yellow),
        ]);
    }
    println!();
    println!("Stages (recovery passes: {}, converged: {}):", recovery.passes.len(), recovery.converged);
    println!("{table}");
}

fn print_audit_table(result: &RunResult) {
    if result.audit_summary.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Stage"),
        header_cell("Decision"),
        header_cell("Entries"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for ((stage, decision), count) in &result.audit_summary {
        table.add_row(vec![
            Cell::new(stage).fg(Color::Blue),
            Cell::new(decision),
            Cell::new(count),
        ]);
    }
    println!();
    println!("Audit log:");
    println!("{table}");
}

fn print_totals(report: &PipelineReport) {
    let totals = &report.totals;
    println!();
    println!(
        "Claim amounts: total {:.2}, merged {:.2}, unlinked {:.2} ({} claims)",
        totals.claim_total, totals.merged_total, totals.unlinked_total, totals.unlinked_claims
    );
    if !totals.is_consistent() {
        eprintln!(
            "warning: merged totals do not reconcile ({} duplicate policy keys)",
            totals.duplicate_policy_keys
        );
    }
}

pub fn print_validate_summary(result: &ValidateResult) {
    println!("Schema: {}", result.schema);
    if !result.identifiers.is_empty() {
        let mut table = Table::new();
        table.set_header(vec![
            header_cell("Table"),
            header_cell("Identifier"),
            header_cell("Length"),
            header_cell("Missing"),
            header_cell("Invalid"),
        ]);
        apply_table_style(&mut table);
        align_column(&mut table, 2, CellAlignment::Right);
        align_column(&mut table, 3, CellAlignment::Right);
        align_column(&mut table, 4, CellAlignment::Right);
        for check in &result.identifiers {
            table.add_row(vec![
                table_cell(check.table.as_str()),
                Cell::new(&check.column),
                Cell::new(check.length),
                count_cell(check.missing, Color::Yellow),
                count_cell(check.invalid, Color::Red),
            ]);
        }
        println!("{table}");
    }
    print_validity(&result.tables);
    if !result.warnings.is_empty() {
        eprintln!("Schema warnings:");
        for warning in &result.warnings {
            eprintln!("- {warning}");
        }
    }
}

fn print_validity(reports: &[TableReport]) {
    let mut issues = Vec::new();
    for report in reports {
        for issue in &report.issues {
            issues.push((report.table, issue));
        }
    }
    println!();
    if issues.is_empty() {
        let checked: usize = reports.iter().map(|r| r.checked_columns).sum();
        println!("Validity: all {checked} checked columns valid");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Column"),
        header_cell("Status"),
        header_cell("Invalid"),
        header_cell("Examples"),
    ]);
    apply_issue_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    for (kind, issue) in issues {
        let (status, invalid, samples) = match issue {
            Issue::ColumnMissing { .. } => {
                (Cell::new("MISSING").fg(Color::Yellow), dim_cell("-"), dim_cell("-"))
            }
            Issue::InvalidValues {
                invalid_count,
                samples,
                exempt,
                ..
            } => (
                if *exempt {
                    Cell::new("EXEMPT").fg(Color::DarkGrey)
                } else {
                    Cell::new("INVALID").fg(Color::Red).add_attribute(Attribute::Bold)
                },
                Cell::new(invalid_count).fg(if *exempt { Color::DarkGrey } else { Color::Red }),
                Cell::new(samples.join(", ")),
            ),
        };
        table.add_row(vec![
            table_cell(kind.as_str()),
            Cell::new(issue.column()),
            status,
            invalid,
            samples,
        ]);
    }
    println!("Validity:");
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_issue_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(160);
    if table.column_count() >= 5 {
        table.set_constraints(vec![
            ColumnConstraint::UpperBoundary(Width::Fixed(8)),
            ColumnConstraint::UpperBoundary(Width::Percentage(30)),
            ColumnConstraint::LowerBoundary(Width::Fixed(9)),
            ColumnConstraint::LowerBoundary(Width::Fixed(8)),
            ColumnConstraint::UpperBoundary(Width::Percentage(45)),
        ]);
    }
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn table_cell(name: &str) -> Cell {
    Cell::new(name)
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold)
}

pub fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

pub fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
