//! Suite execution across parallel workers
//!
//! ```text
//!   queue [A1 A2 B3 ...] ──► worker 0 ──► ScenarioRunner::run ──┐
//!                        ──► worker 1 ──► ScenarioRunner::run ──┼─► Reporter
//!                        ──► worker N ──► ScenarioRunner::run ──┘     ├─ report.json
//!                                                                     └─ junit.xml
//! ```
//!
//! Workers share nothing but the queue. Each attempt launches its own
//! browser context through the runner's launcher.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use storeprobe::{Reporter, ScenarioId, ScenarioReport, ScenarioRunner};

/// Suite name written into the reports
pub const SUITE_NAME: &str = "storeprobe";
/// Report file names under the output directory
pub const REPORT_JSON: &str = "report.json";
/// JUnit XML file name
pub const REPORT_JUNIT: &str = "junit.xml";

/// Resolve requested ids and an optional area into a run order
///
/// No ids means the whole catalogue. Duplicates are dropped, catalogue order
/// is kept.
pub fn select_scenarios(requested: &[String], area: Option<&str>) -> CliResult<Vec<ScenarioId>> {
    let wanted: Vec<ScenarioId> = requested
        .iter()
        .map(|raw| raw.parse::<ScenarioId>())
        .collect::<Result<_, _>>()?;

    if let Some(area) = area {
        if !ScenarioId::ALL.iter().any(|id| id.area().eq_ignore_ascii_case(area)) {
            return Err(CliError::invalid_argument(format!(
                "unknown area {area:?}; expected login, search, cart or checkout"
            )));
        }
    }

    Ok(ScenarioId::ALL
        .into_iter()
        .filter(|id| wanted.is_empty() || wanted.contains(id))
        .filter(|id| area.map_or(true, |a| id.area().eq_ignore_ascii_case(a)))
        .collect())
}

/// Runs a selection of scenarios and writes the run reports
#[derive(Debug)]
pub struct SuiteRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a suite runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Run `scenarios` on up to `config.workers` concurrent contexts
    ///
    /// Every selected scenario is reported; with `fail_fast` the ones never
    /// started are left out.
    ///
    /// # Errors
    ///
    /// Returns error if the reports cannot be written
    pub async fn run(&mut self, runner: &ScenarioRunner, scenarios: &[ScenarioId]) -> CliResult<Reporter> {
        let start = Instant::now();
        let mut report = Reporter::new(SUITE_NAME);

        if scenarios.is_empty() {
            self.reporter.warning("No scenarios selected");
            return Ok(report);
        }

        let workers = self.config.effective_workers(scenarios.len());
        self.reporter.header(&format!(
            "Running {} scenarios on {workers} worker(s)",
            scenarios.len()
        ));
        self.reporter
            .start_progress(scenarios.len() as u64, "starting");
        tracing::info!(scenarios = scenarios.len(), workers, "run started");

        let queue = Mutex::new(scenarios.iter().copied().collect::<VecDeque<_>>());
        let stop = AtomicBool::new(false);
        let fail_fast = self.config.fail_fast;
        let progress = &self.reporter;

        let lanes = (0..workers).map(|worker| {
            let queue = &queue;
            let stop = &stop;
            async move {
                let mut done = Vec::new();
                while !stop.load(Ordering::SeqCst) {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(id) = next else {
                        break;
                    };
                    progress.set_message(id.title());
                    let result = runner.run(id, worker).await;
                    progress.scenario(&result);
                    progress.increment(1);
                    if fail_fast && result.status.is_failed() {
                        stop.store(true, Ordering::SeqCst);
                    }
                    done.push(result);
                }
                done
            }
        });
        let finished: Vec<ScenarioReport> = futures::future::join_all(lanes)
            .await
            .into_iter()
            .flatten()
            .collect();

        self.reporter.finish();
        for result in finished {
            report.record(result);
        }
        report.sort();

        write_reports(&report, &self.config.output_dir)?;
        self.reporter.summary(
            report.passed_count(),
            report.failed_count(),
            report.skipped_count(),
            start.elapsed(),
        );
        tracing::info!(summary = %report.summary(), "run finished");
        Ok(report)
    }

    /// Get the reporter (for testing)
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }
}

/// Write `report.json` and `junit.xml` into `dir`
pub fn write_reports(report: &Reporter, dir: &Path) -> CliResult<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let json = dir.join(REPORT_JSON);
    let junit = dir.join(REPORT_JUNIT);
    report
        .write_json(&json)
        .map_err(|e| CliError::report_generation(format!("{}: {e}", json.display())))?;
    report
        .generate_junit(&junit)
        .map_err(|e| CliError::report_generation(format!("{}: {e}", junit.display())))?;
    Ok((json, junit))
}
