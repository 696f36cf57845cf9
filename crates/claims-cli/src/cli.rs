//! CLI argument definitions for the claims cleaner.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use claims_cli::logging::LogFormat;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "claims-clean",
    version,
    about = "Clean and reconcile linked policy and claim tables",
    long_about = "Clean and reconcile a policy (frequency) table and its claim (severity) table.\n\n\
                  Repairs corrupted identifiers and magnitudes, recovers lost policy keys,\n\
                  reconciles shared attributes, imputes what is left and merges claims\n\
                  onto policies. Every decision is written to an audit log."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Clean one line of business and write the corrected tables.
    Run(RunArgs),

    /// Check raw tables against a schema without changing them.
    Validate(TableArgs),

    /// List the available line-of-business schemas.
    Schemas(SchemasArgs),
}

/// Where the two input tables come from.
#[derive(Args, Clone)]
pub struct TableArgs {
    /// Folder holding `<table>.csv` files.
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Line-of-business schema name (e.g. cargo, business_interruption).
    #[arg(long = "schema", short = 's')]
    pub schema: String,

    /// Directory with schema TOML files (default: CLAIMS_SCHEMAS_DIR or ./schemas).
    #[arg(long = "schemas-dir", value_name = "DIR")]
    pub schemas_dir: Option<PathBuf>,

    /// Policy table name (default: <schema>_claims_freq).
    #[arg(long = "policy-table", value_name = "NAME")]
    pub policy_table: Option<String>,

    /// Claim table name (default: <schema>_claims_sev).
    #[arg(long = "claim-table", value_name = "NAME")]
    pub claim_table: Option<String>,

    /// CSV locale of the input and output files.
    #[arg(long = "csv", value_enum, default_value = "comma")]
    pub csv: CsvLocaleArg,
}

impl TableArgs {
    pub fn policy_table(&self) -> String {
        self.policy_table
            .clone()
            .unwrap_or_else(|| format!("{}_claims_freq", self.schema))
    }

    pub fn claim_table(&self) -> String {
        self.claim_table
            .clone()
            .unwrap_or_else(|| format!("{}_claims_sev", self.schema))
    }
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub tables: TableArgs,

    /// Output directory for cleaned tables (default: <DATA_DIR>/output).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Seed for `sample` fills; without it they use the mode.
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Cap on key recovery passes (overrides the schema).
    #[arg(long = "max-iterations", value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Clean and report without writing output files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Skip writing the audit log.
    #[arg(long = "no-audit")]
    pub no_audit: bool,

    /// Exit with status 0 even when declared columns remain invalid.
    #[arg(long = "allow-invalid")]
    pub allow_invalid: bool,
}

#[derive(Args)]
pub struct SchemasArgs {
    /// Directory with schema TOML files (default: CLAIMS_SCHEMAS_DIR or ./schemas).
    #[arg(long = "schemas-dir", value_name = "DIR")]
    pub schemas_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CsvLocaleArg {
    /// `,`-delimited, `.` decimals.
    Comma,
    /// `;`-delimited, `,` decimals.
    Semicolon,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
