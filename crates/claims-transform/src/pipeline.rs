//! Pipeline driver.
//!
//! [`CleaningPipeline`] runs every stage in order over one policy table and
//! one claim table:
//!
//! 1. text cleaning and numeric coercion
//! 2. identifier normalization
//! 3. magnitude correction
//! 4. claim sequence and claim count recompute
//! 5. cross-table key recovery and placeholders
//! 6. internal, then cross-table reconciliation
//! 7. policy imputation, claim re-sync, claim imputation
//! 8. amount cap, amount filter, final sequence and count recompute
//! 9. merge into the modeling table and the validity report
//!
//! Every stage returns new frames; the inputs are never modified.

use claims_ingest::TableLoader;
use claims_model::{AuditLog, LineSchema, TableKind};
use claims_standards::{SchemaWarning, lint_schema};
use claims_validate::{FieldValidator, TableReport, validate_table};
use polars::prelude::DataFrame;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::Serialize;
use tracing::{info, info_span};

use crate::error::Result;
use crate::frame::ClaimsFrame;
use crate::identifier::{IdentifierSummary, normalize_identifiers};
use crate::impute::{ImputeSummary, impute_residuals};
use crate::magnitude::{MagnitudeSummary, correct_magnitudes};
use crate::merge::{MergeTotals, cap_amounts, filter_amounts, merge_tables};
use crate::reconcile::{ReconcileSummary, reconcile_cross, reconcile_internal};
use crate::recovery::{RecoverySummary, recover_keys};
use crate::sequence::{recount_policies, resequence_claims};
use crate::text::{TextSummary, clean_text, coerce_numeric, compile_suffix};

/// Runtime options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Overrides the schema's key recovery iteration cap.
    pub max_iterations: Option<usize>,
    /// Seed for `sample` fills. Without one they fall back to the mode.
    pub seed: Option<u64>,
    /// Keep the audit log in the output.
    pub capture_audit: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_iterations: None,
            seed: None,
            capture_audit: true,
        }
    }
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn without_audit(mut self) -> Self {
        self.capture_audit = false;
        self
    }
}

/// Counts and findings from one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub schema: String,
    pub policy_rows_in: usize,
    pub policy_rows_out: usize,
    pub claim_rows_in: usize,
    pub claim_rows_out: usize,
    pub text: TextSummary,
    pub policy_identifiers: IdentifierSummary,
    pub claim_identifiers: IdentifierSummary,
    pub magnitude: MagnitudeSummary,
    pub resequenced: usize,
    pub recounted: usize,
    pub recovery: RecoverySummary,
    pub reconcile: ReconcileSummary,
    pub imputation: ImputeSummary,
    pub capped_amounts: usize,
    pub dropped_claims: usize,
    pub totals: MergeTotals,
    pub schema_warnings: Vec<SchemaWarning>,
    pub validity: Vec<TableReport>,
}

impl PipelineReport {
    /// True when every non-exempt declared column is valid in both tables.
    pub fn is_valid(&self) -> bool {
        self.validity.iter().all(TableReport::is_clean)
    }
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Corrected policy table, same row count as the input.
    pub policies: DataFrame,
    /// Corrected claim table, minus removed zero-amount claims.
    pub claims: DataFrame,
    /// One row per policy with claim count and summed amount.
    pub modeling: DataFrame,
    pub audit: AuditLog,
    pub report: PipelineReport,
}

/// Cleans one line of business.
#[derive(Debug, Clone)]
pub struct CleaningPipeline<'a> {
    schema: &'a LineSchema,
    validator: FieldValidator,
    options: PipelineOptions,
    warnings: Vec<SchemaWarning>,
}

impl<'a> CleaningPipeline<'a> {
    /// Compiles the schema's rules and collects its warnings.
    pub fn new(schema: &'a LineSchema, options: PipelineOptions) -> Self {
        let validator = FieldValidator::from_schema(schema);
        let mut warnings = lint_schema(schema);
        for warning in validator.warnings() {
            if !warnings.iter().any(|w| w.column == warning.column) {
                warnings.push(warning.clone());
            }
        }
        Self {
            schema,
            validator,
            options,
            warnings,
        }
    }

    pub fn schema(&self) -> &LineSchema {
        self.schema
    }

    pub fn validator(&self) -> &FieldValidator {
        &self.validator
    }

    pub fn warnings(&self) -> &[SchemaWarning] {
        &self.warnings
    }

    /// Loads `policy_table` and `claim_table` through `loader`, then runs.
    pub fn run_from<L: TableLoader>(
        &self,
        loader: &L,
        policy_table: &str,
        claim_table: &str,
    ) -> Result<PipelineOutput> {
        let policies = loader.load(policy_table)?;
        let claims = loader.load(claim_table)?;
        self.run(policies, claims)
    }

    /// Runs every stage.
    ///
    /// Fails only on structural problems: a missing policy key or claim
    /// amount column, or a DataFrame error.
    pub fn run(&self, policies: DataFrame, claims: DataFrame) -> Result<PipelineOutput> {
        let schema = self.schema;
        let keys = &schema.keys;
        let validator = &self.validator;
        let span = info_span!("pipeline", schema = %schema.name);
        let _guard = span.enter();

        let policies = ClaimsFrame::policies(policies);
        let claims = ClaimsFrame::claims(claims);
        policies.require_column(&keys.policy_id)?;
        claims.require_column(&keys.policy_id)?;
        claims.require_column(&keys.claim_amount)?;

        let mut audit = AuditLog::new();
        let mut report = PipelineReport {
            schema: schema.name.clone(),
            policy_rows_in: policies.record_count(),
            claim_rows_in: claims.record_count(),
            schema_warnings: self.warnings.clone(),
            ..PipelineReport::default()
        };

        let (policies, claims) = info_span!("text").in_scope(|| -> Result<_> {
            let suffix = compile_suffix(&schema.suffix_pattern);
            let mut always = vec![keys.claim_amount.as_str()];
            if let Some(cap) = &schema.cap {
                always.push(cap.limit.as_str());
            }
            let mut clean = |frame: &ClaimsFrame| -> Result<ClaimsFrame> {
                let (cleaned, mut summary) = clean_text(frame, suffix.as_ref(), &mut audit)?;
                let (coerced, counts) = coerce_numeric(&cleaned, validator, &always)?;
                summary.coerced = counts;
                report.text.merge(summary);
                Ok(coerced)
            };
            Ok((clean(&policies)?, clean(&claims)?))
        })?;

        let (policies, claims) = info_span!("identifiers").in_scope(|| -> Result<_> {
            let (policies, policy_summary) = normalize_identifiers(&policies, schema, &mut audit)?;
            let (claims, claim_summary) = normalize_identifiers(&claims, schema, &mut audit)?;
            report.policy_identifiers = policy_summary;
            report.claim_identifiers = claim_summary;
            Ok((policies, claims))
        })?;

        let (policies, claims) = info_span!("magnitude").in_scope(|| -> Result<_> {
            let (policies, policy_summary) =
                correct_magnitudes(&policies, schema, validator, &mut audit)?;
            let (claims, claim_summary) = correct_magnitudes(&claims, schema, validator, &mut audit)?;
            report.magnitude.merge(policy_summary);
            report.magnitude.merge(claim_summary);
            Ok((policies, claims))
        })?;

        let (policies, claims) = info_span!("sequence").in_scope(|| -> Result<_> {
            let (claims, resequenced) = resequence_claims(&claims, keys, &mut audit)?;
            let (policies, recounted) = recount_policies(&policies, &claims, keys, &mut audit)?;
            report.resequenced += resequenced;
            report.recounted += recounted;
            Ok((policies, claims))
        })?;

        let (policies, claims) = info_span!("recovery").in_scope(|| -> Result<_> {
            let (policies, claims, summary) =
                recover_keys(&policies, &claims, schema, self.options.max_iterations, &mut audit)?;
            report.recovery = summary;
            Ok((policies, claims))
        })?;

        let (policies, claims) = info_span!("reconcile").in_scope(|| -> Result<_> {
            let (claims, claim_summary) = reconcile_internal(&claims, schema, validator, &mut audit)?;
            let (policies, policy_summary) =
                reconcile_internal(&policies, schema, validator, &mut audit)?;
            let (policies, claims, cross) =
                reconcile_cross(&policies, &claims, schema, validator, &mut audit)?;
            report.reconcile.merge(claim_summary);
            report.reconcile.merge(policy_summary);
            report.reconcile.merge(cross);
            Ok((policies, claims))
        })?;

        let (policies, claims) = info_span!("impute").in_scope(|| -> Result<_> {
            let mut rng = self.options.seed.map(Pcg64::seed_from_u64);
            let (policies, policy_summary) =
                impute_residuals(&policies, schema, validator, rng.as_mut(), &mut audit)?;
            let (policies, claims, resync) =
                reconcile_cross(&policies, &claims, schema, validator, &mut audit)?;
            let (claims, claim_summary) =
                impute_residuals(&claims, schema, validator, rng.as_mut(), &mut audit)?;
            let (claims, regroup) = reconcile_internal(&claims, schema, validator, &mut audit)?;
            report.imputation.merge(policy_summary);
            report.imputation.merge(claim_summary);
            report.reconcile.merge(resync);
            report.reconcile.merge(regroup);
            Ok((policies, claims))
        })?;

        let (policies, claims, modeling) = info_span!("merge").in_scope(|| -> Result<_> {
            let claims = match &schema.cap {
                Some(cap) => {
                    let (capped, count) = cap_amounts(&claims, cap, &mut audit)?;
                    report.capped_amounts = count;
                    capped
                }
                None => claims,
            };
            let (claims, dropped) = filter_amounts(&claims, keys, &mut audit)?;
            report.dropped_claims = dropped;
            let (claims, resequenced) = resequence_claims(&claims, keys, &mut audit)?;
            let (policies, recounted) = recount_policies(&policies, &claims, keys, &mut audit)?;
            report.resequenced += resequenced;
            report.recounted += recounted;
            let (modeling, totals) = merge_tables(&policies, &claims, keys)?;
            report.totals = totals;
            Ok((policies, claims, modeling))
        })?;

        info_span!("validate").in_scope(|| -> Result<()> {
            report.validity = vec![
                validate_table(validator, schema, &policies.data, TableKind::Policy)?,
                validate_table(validator, schema, &claims.data, TableKind::Claim)?,
            ];
            Ok(())
        })?;

        report.policy_rows_out = policies.record_count();
        report.claim_rows_out = claims.record_count();
        info!(
            policies = report.policy_rows_out,
            claims = report.claim_rows_out,
            dropped = report.dropped_claims,
            audit_entries = audit.len(),
            valid = report.is_valid(),
            "pipeline complete"
        );

        Ok(PipelineOutput {
            policies: policies.into_inner(),
            claims: claims.into_inner(),
            modeling,
            audit: if self.options.capture_audit {
                audit
            } else {
                AuditLog::new()
            },
            report,
        })
    }
}
