//! Policy and claim table cleaner.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::{ColorChoice, Parser};
use claims_cli::logging::{LogConfig, init_logging};

mod cli;
mod commands;
mod summary;
mod types;

use crate::cli::{Cli, Command};
use crate::commands::{run_clean, run_schemas, run_validate};
use crate::summary::{print_run_summary, print_validate_summary};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    if let Err(error) = init_logging(&log_config(&cli)) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run(args) => {
            let result = run_clean(&args)?;
            print_run_summary(&result);
            let failed = !result.report.is_valid() && !args.allow_invalid;
            Ok(i32::from(failed))
        }
        Command::Validate(args) => {
            let result = run_validate(&args)?;
            print_validate_summary(&result);
            Ok(i32::from(!result.is_clean()))
        }
        Command::Schemas(args) => {
            run_schemas(&args)?;
            Ok(0)
        }
    }
}

/// `--log-level` beats `-v`/`-q`, and either disables `RUST_LOG`.
fn log_config(cli: &Cli) -> LogConfig {
    let explicit = cli.verbosity.is_present() || cli.log_level.is_some();
    let level = cli
        .log_level
        .map_or_else(|| cli.verbosity.tracing_level_filter(), Into::into);
    let ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    LogConfig {
        use_env_filter: !explicit,
        ..LogConfig::default()
    }
    .with_level(level)
    .with_format(cli.log_format.into())
    .with_ansi(ansi)
    .with_log_file(cli.log_file.clone())
}
