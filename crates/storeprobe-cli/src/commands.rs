//! CLI command definitions using clap

use crate::config::{ColorChoice, DEFAULT_OUTPUT_DIR};
use crate::output::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// storeprobe: resilient end-to-end checks for e-commerce storefronts
#[derive(Parser, Debug)]
#[command(name = "storeprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only failures)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "STOREPROBE_LOG_JSON")]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios against the storefront
    Run(RunArgs),

    /// List the scenario catalogue
    List(ListArgs),

    /// Summarize a previous run's report.json
    Report(ReportArgs),

    /// Show the effective run configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario ids to run, e.g. A1 B5 (default: all)
    pub scenarios: Vec<String>,

    /// Only run scenarios of one area (login, search, cart, checkout)
    #[arg(long)]
    pub area: Option<String>,

    /// Parallel browser contexts (0 = one per CPU)
    #[arg(short = 'w', long, default_value = "1", env = "STOREPROBE_WORKERS")]
    pub workers: usize,

    /// Stop starting scenarios after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// YAML suite file overriding test data, timeouts and retries
    #[arg(short, long, env = "STOREPROBE_SUITE")]
    pub suite: Option<PathBuf>,

    /// Output directory for report.json, junit.xml and attachments
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "STOREPROBE_OUTPUT")]
    pub output: PathBuf,

    /// Storefront origin (overrides BASE_URL and the suite)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Retries after a failed attempt (overrides the suite)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Launch Chromium without its sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Project name used in session ids
    #[arg(long, default_value = "chromium")]
    pub project: String,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list scenarios of one area
    #[arg(long)]
    pub area: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Path to a report.json written by `storeprobe run`
    #[arg(default_value = "target/storeprobe/report.json")]
    pub input: PathBuf,

    /// Also write JUnit XML to this path
    #[arg(long)]
    pub junit: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// YAML suite file to overlay
    #[arg(short, long, env = "STOREPROBE_SUITE")]
    pub suite: Option<PathBuf>,

    /// Print as JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Always => Self::Always,
            ColorArg::Auto => Self::Auto,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Listing format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum FormatArg {
    /// Aligned text rows
    #[default]
    Text,
    /// JSON array
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}
