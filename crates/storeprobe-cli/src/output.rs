//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storeprobe::{ScenarioId, ScenarioReport, ScenarioStatus};

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Progress reporter for a scenario run
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, message: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(message),
            None => {
                let _ = self.term.write_line(message);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, paint: Style, message: &str) {
        let prefix = if self.use_color {
            paint.apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("✓", "PASS", Style::new().green().bold(), message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        self.prefixed("✗", "FAIL", Style::new().red().bold(), message);
    }

    /// Print a skip message
    pub fn skipped(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("↷", "SKIP", Style::new().yellow().bold(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("⚠", "WARN", Style::new().yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("ℹ", "INFO", Style::new().blue().bold(), message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print one finished scenario
    pub fn scenario(&self, report: &ScenarioReport) {
        let retries = if report.attempts > 1 {
            format!(" after {} attempts", report.attempts)
        } else {
            String::new()
        };
        let label = format!("{} ({:.1}s{retries})", report.title, report.duration().as_secs_f64());
        match report.status {
            ScenarioStatus::Passed => self.success(&label),
            ScenarioStatus::Skipped => self.skipped(&format!(
                "{label}: {}",
                report.failure.as_deref().unwrap_or("skipped")
            )),
            ScenarioStatus::Failed => self.failure(&format!(
                "{label}: {}",
                report.failure.as_deref().unwrap_or("unknown error")
            )),
        }
    }

    /// Print run summary
    pub fn summary(&self, passed: usize, failed: usize, skipped: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let total = passed + failed + skipped;
        let duration_secs = duration.as_secs_f64();
        self.line("");

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            self.line(&format!(
                "{} {} scenarios in {:.2}s ({} passed, {} failed, {} skipped)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            self.line(&format!(
                "{status} {total} scenarios in {duration_secs:.2}s ({passed} passed, {failed} failed, {skipped} skipped)"
            ));
        }
    }
}

/// Render the scenario catalogue
#[must_use]
pub fn render_catalogue(ids: &[ScenarioId], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => ids
            .iter()
            .map(|id| format!("{:<4} {:<9} {}", id.as_str(), id.area(), id.title()))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => {
            let rows: Vec<_> = ids
                .iter()
                .map(|id| {
                    serde_json::json!({
                        "id": id.as_str(),
                        "area": id.area(),
                        "file": id.file(),
                        "title": id.title(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod progress_reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = ProgressReporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
        }

        #[test]
        fn test_scenario_lines_for_every_status() {
            let reporter = ProgressReporter::new(false, false);
            let elapsed = Duration::from_millis(1500);
            reporter.scenario(&ScenarioReport::passed("A1", "A1: modal", elapsed));
            reporter.scenario(&ScenarioReport::failed("B3", "B3: search", elapsed, "no tiles").with_attempts(4));
            reporter.scenario(&ScenarioReport::skipped("D10", "D10: gate", elapsed, "place order disabled"));
        }

        #[test]
        fn test_summary_with_progress_bar() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress(3, "running");
            reporter.set_message("A1");
            reporter.increment(1);
            reporter.summary(2, 1, 0, Duration::from_secs(3));
            reporter.finish();
        }

        #[test]
        fn test_quiet_mode_suppresses_output() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(10, "running");
            assert!(reporter.progress_bar.is_none());
            reporter.success("hidden");
            reporter.skipped("hidden");
            reporter.info("hidden");
            reporter.failure("shown");
        }
    }

    mod catalogue_tests {
        use super::*;

        #[test]
        fn test_text_catalogue_has_one_row_per_scenario() {
            let text = render_catalogue(&ScenarioId::ALL, OutputFormat::Text);
            assert_eq!(text.lines().count(), ScenarioId::ALL.len());
            assert!(text.lines().next().unwrap().starts_with("A1"));
        }

        #[test]
        fn test_json_catalogue_parses() {
            let json = render_catalogue(&[ScenarioId::B5], OutputFormat::Json);
            let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(rows[0]["id"], "B5");
            assert_eq!(rows[0]["area"], "search");
        }
    }
}
