//! storeprobe CLI: run storefront scenarios from the command line
//!
//! ## Usage
//!
//! ```bash
//! storeprobe run                        # Whole catalogue, one worker
//! storeprobe run A1 B5 --workers 2      # Selected scenarios in parallel
//! storeprobe run --area cart --headed   # One area with a visible browser
//! storeprobe list --format json         # Scenario catalogue
//! storeprobe report target/storeprobe/report.json --junit junit.xml
//! ```

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use storeprobe::{Observability, Reporter, ScenarioId, ScenarioRunner, SessionLauncher};
use storeprobe_cli::{
    load_probe_config, render_catalogue, select_scenarios, Cli, CliConfig, CliError, CliResult,
    ColorChoice, Commands, ConfigArgs, ListArgs, ProgressReporter, ReportArgs, RunArgs,
    SuiteRunner, Verbosity,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(&config);

    match cli.command {
        Commands::Run(args) => run_scenarios(config, &args),
        Commands::List(args) => run_list(&args),
        Commands::Report(args) => run_report(&config, &args),
        Commands::Config(args) => run_config(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_json(cli.log_json)
}

/// `RUST_LOG` wins over the verbosity flags
fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter_directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(config.color.should_color()).init();
    }
}

fn run_scenarios(config: CliConfig, args: &RunArgs) -> CliResult<()> {
    let scenarios = select_scenarios(&args.scenarios, args.area.as_deref())?;

    let mut probe = load_probe_config(args.suite.as_deref())?;
    if let Some(base_url) = &args.base_url {
        probe = probe.with_base_url(base_url.clone());
    }
    if let Some(retries) = args.retries {
        probe = probe.with_retries(retries);
    }
    if args.headed {
        probe = probe.with_headless(false);
    }

    let config = config
        .with_workers(args.workers)
        .with_fail_fast(args.fail_fast)
        .with_output_dir(args.output.clone());
    let launcher = build_launcher(args)?;
    let observability = Arc::new(Observability::from_config(&probe));
    let runner = ScenarioRunner::new(launcher, Arc::new(probe), observability)
        .with_output_dir(args.output.clone())
        .with_project(args.project.clone());

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("failed to start async runtime: {e}")))?;
    let mut suite = SuiteRunner::new(config);
    let report = rt.block_on(suite.run(&runner, &scenarios))?;

    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::ScenariosFailed {
            failed: report.failed_count(),
            total: report.total_count(),
        })
    }
}

#[cfg(feature = "browser")]
fn build_launcher(args: &RunArgs) -> CliResult<Arc<dyn SessionLauncher>> {
    let mut launcher = storeprobe::CdpLauncher::new();
    if let Some(path) = &args.chromium_path {
        launcher = launcher.with_chromium_path(path.clone());
    }
    if args.no_sandbox {
        launcher = launcher.with_no_sandbox();
    }
    Ok(Arc::new(launcher))
}

#[cfg(not(feature = "browser"))]
fn build_launcher(_args: &RunArgs) -> CliResult<Arc<dyn SessionLauncher>> {
    Err(CliError::config(
        "browser support not enabled. Rebuild with --features browser",
    ))
}

fn run_list(args: &ListArgs) -> CliResult<()> {
    let ids: Vec<ScenarioId> = select_scenarios(&[], args.area.as_deref())?;
    println!("{}", render_catalogue(&ids, args.format.into()));
    Ok(())
}

fn run_report(config: &CliConfig, args: &ReportArgs) -> CliResult<()> {
    let report = Reporter::read_json(&args.input)?;
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());

    reporter.header(&report.summary());
    for result in report.results() {
        reporter.scenario(result);
    }
    reporter.summary(
        report.passed_count(),
        report.failed_count(),
        report.skipped_count(),
        report.total_duration(),
    );

    if let Some(path) = &args.junit {
        report
            .generate_junit(path)
            .map_err(|e| CliError::report_generation(format!("{}: {e}", path.display())))?;
        reporter.info(&format!("JUnit report written to {}", path.display()));
    }
    Ok(())
}

fn run_config(args: &ConfigArgs) -> CliResult<()> {
    let probe = load_probe_config(args.suite.as_deref())?;
    let rendered = if args.json {
        serde_json::to_string_pretty(&probe)
            .map_err(|e| CliError::config(format!("cannot render config: {e}")))?
    } else {
        serde_yaml_ng::to_string(&probe)
            .map_err(|e| CliError::config(format!("cannot render config: {e}")))?
    };
    println!("{rendered}");
    Ok(())
}
