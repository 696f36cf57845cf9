//! Output files of a cleaning run.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use claims_ingest::{CsvFormat, write_csv_frame};
use claims_transform::PipelineOutput;
use tracing::info;

/// Where each artifact of a run is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub policies: PathBuf,
    pub claims: PathBuf,
    pub modeling: PathBuf,
    pub report: PathBuf,
    /// `None` when audit capture is off.
    pub audit: Option<PathBuf>,
}

impl OutputPaths {
    /// Paths under `dir` named after the input tables and the schema.
    pub fn new(
        dir: &Path,
        schema: &str,
        policy_table: &str,
        claim_table: &str,
        with_audit: bool,
    ) -> Self {
        Self {
            policies: dir.join(format!("{policy_table}_clean.csv")),
            claims: dir.join(format!("{claim_table}_clean.csv")),
            modeling: dir.join(format!("{schema}_modeling.csv")),
            report: dir.join(format!("{schema}_report.json")),
            audit: with_audit.then(|| dir.join(format!("{schema}_audit.json"))),
        }
    }

    pub fn all(&self) -> Vec<&Path> {
        let mut paths = vec![
            self.policies.as_path(),
            self.claims.as_path(),
            self.modeling.as_path(),
            self.report.as_path(),
        ];
        if let Some(audit) = &self.audit {
            paths.push(audit);
        }
        paths
    }
}

/// Writes the three tables as CSV and the report and audit log as JSON.
///
/// Returns the written paths in write order.
pub fn write_outputs(
    output: &mut PipelineOutput,
    paths: &OutputPaths,
    format: &CsvFormat,
) -> Result<Vec<PathBuf>> {
    for path in paths.all() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
    }

    write_csv_frame(&paths.policies, &mut output.policies, format)
        .context("write policy table")?;
    write_csv_frame(&paths.claims, &mut output.claims, format).context("write claim table")?;
    write_csv_frame(&paths.modeling, &mut output.modeling, format)
        .context("write modeling table")?;
    write_json(&paths.report, &output.report).context("write report")?;
    let mut written = vec![
        paths.policies.clone(),
        paths.claims.clone(),
        paths.modeling.clone(),
        paths.report.clone(),
    ];
    if let Some(audit) = &paths.audit {
        write_json(audit, output.audit.entries()).context("write audit log")?;
        written.push(audit.clone());
    }
    info!(files = written.len(), audit_entries = output.audit.len(), "wrote outputs");
    Ok(written)
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("serialize {}", path.display()))?;
    Ok(())
}
