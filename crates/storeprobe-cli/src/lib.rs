//! storeprobe CLI Library
//!
//! Command-line front end for the storeprobe scenario runner: argument
//! parsing, worker scheduling, progress output and run reports.

#![warn(missing_docs)]
#![allow(clippy::format_push_string)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ConfigArgs, FormatArg, ListArgs, ReportArgs, RunArgs};
pub use config::{load_probe_config, CliConfig, ColorChoice, Verbosity, DEFAULT_OUTPUT_DIR};
pub use error::{CliError, CliResult};
pub use output::{render_catalogue, OutputFormat, ProgressReporter};
pub use runner::{select_scenarios, write_reports, SuiteRunner, REPORT_JSON, REPORT_JUNIT, SUITE_NAME};
