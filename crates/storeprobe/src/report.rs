//! Run Report
//!
//! Collects one [`ScenarioReport`] per scenario and renders the run as
//! `report.json` or JUnit XML for CI.
//!
//! ```text
//!   ScenarioRunner ──record──► Reporter ──write_json──► <output>/report.json
//!                                  └──────generate_junit──► <output>/junit.xml
//! ```
//!
//! Every scenario is recorded even after a failure; a run never stops early.

use crate::result::ProbeResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Final status of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// Every assertion held
    Passed,
    /// An assertion failed on the last attempt
    Failed,
    /// A precondition on the live site was not met
    Skipped,
}

impl ScenarioStatus {
    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Outcome of one scenario across its attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    /// Scenario id, e.g. `B5`
    pub scenario: String,
    /// Human title
    pub title: String,
    /// Final status
    pub status: ScenarioStatus,
    /// Attempts made, at least one
    pub attempts: u32,
    /// Wall time of all attempts
    pub duration_ms: u64,
    /// Message of the last failure or skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Names of the attachments of the last attempt
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl ScenarioReport {
    fn with_status(scenario: &str, title: &str, status: ScenarioStatus, duration: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            title: title.to_string(),
            status,
            attempts: 1,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            failure: None,
            attachments: Vec::new(),
        }
    }

    /// Create a passing report
    #[must_use]
    pub fn passed(scenario: &str, title: &str, duration: Duration) -> Self {
        Self::with_status(scenario, title, ScenarioStatus::Passed, duration)
    }

    /// Create a failing report
    #[must_use]
    pub fn failed(scenario: &str, title: &str, duration: Duration, failure: impl Into<String>) -> Self {
        Self {
            failure: Some(failure.into()),
            ..Self::with_status(scenario, title, ScenarioStatus::Failed, duration)
        }
    }

    /// Create a skipped report
    #[must_use]
    pub fn skipped(scenario: &str, title: &str, duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::with_status(scenario, title, ScenarioStatus::Skipped, duration)
        }
    }

    /// Set the attempt count
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the attachment names
    #[must_use]
    pub fn with_attachments(mut self, names: Vec<String>) -> Self {
        self.attachments = names;
        self
    }

    /// Wall time as a `Duration`
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Scenario reports of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reporter {
    suite_name: String,
    started_at: DateTime<Utc>,
    results: Vec<ScenarioReport>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new("storeprobe")
    }
}

impl Reporter {
    /// Empty report started now
    #[must_use]
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            suite_name: suite_name.into(),
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    /// Record a scenario
    pub fn record(&mut self, report: ScenarioReport) {
        tracing::debug!(scenario = %report.scenario, status = ?report.status, "recorded");
        self.results.push(report);
    }

    /// Get number of passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_passed()).count()
    }

    /// Get number of failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_failed()).count()
    }

    /// Get number of skipped scenarios
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ScenarioStatus::Skipped)
            .count()
    }

    /// Get total scenario count
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    /// Passed over executed (skips excluded), 1.0 when nothing ran
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pass_rate(&self) -> f64 {
        let executed = self.total_count() - self.skipped_count();
        if executed == 0 {
            return 1.0;
        }
        self.passed_count() as f64 / executed as f64
    }

    /// Check if no scenario failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get total duration
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.results.iter().map(ScenarioReport::duration).sum()
    }

    /// Get scenario reports in record order
    #[must_use]
    pub fn results(&self) -> &[ScenarioReport] {
        &self.results
    }

    /// Sort by scenario id so parallel runs report deterministically
    pub fn sort(&mut self) {
        self.results.sort_by(|a, b| {
            scenario_key(&a.scenario).cmp(&scenario_key(&b.scenario))
        });
    }

    /// Get failing scenarios
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioReport> {
        self.results
            .iter()
            .filter(|r| r.status.is_failed())
            .collect()
    }

    /// Generate summary string
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} passed, {} failed, {} skipped ({:.1}%)",
            self.suite_name,
            self.passed_count(),
            self.total_count(),
            self.failed_count(),
            self.skipped_count(),
            self.pass_rate() * 100.0
        )
    }

    /// Write `report.json`
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails
    pub fn write_json(&self, output_path: &Path) -> ProbeResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(output_path, json)?;
        Ok(())
    }

    /// Read a report written by [`Reporter::write_json`]
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn read_json(path: &Path) -> ProbeResult<Self> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }

    /// Generate JUnit XML for CI integration
    ///
    /// # Errors
    ///
    /// Returns error if file writing fails
    pub fn generate_junit(&self, output_path: &Path) -> ProbeResult<()> {
        std::fs::write(output_path, self.render_junit())?;
        Ok(())
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}">"#,
            escape_xml(&self.suite_name),
            self.total_count(),
            self.failed_count(),
            self.skipped_count(),
            self.total_duration().as_secs_f64()
        ));
        xml.push('\n');

        for result in &self.results {
            xml.push_str(&format!(
                r#"  <testcase classname="{}" name="{}" time="{:.3}">"#,
                escape_xml(&result.scenario),
                escape_xml(&result.title),
                result.duration().as_secs_f64()
            ));
            xml.push('\n');

            let message = result.failure.as_deref().unwrap_or_default();
            match result.status {
                ScenarioStatus::Failed => {
                    xml.push_str(&format!(
                        r#"    <failure message="{}">{}</failure>"#,
                        escape_xml(message),
                        escape_xml(message)
                    ));
                    xml.push('\n');
                }
                ScenarioStatus::Skipped => {
                    xml.push_str(&format!(r#"    <skipped message="{}"/>"#, escape_xml(message)));
                    xml.push('\n');
                }
                ScenarioStatus::Passed => {}
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }
}

/// `B10` sorts after `B9`
fn scenario_key(id: &str) -> (String, u32) {
    let split = id.find(|c: char| c.is_ascii_digit()).unwrap_or(id.len());
    let (area, number) = id.split_at(split);
    (area.to_string(), number.parse().unwrap_or(u32::MAX))
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> Reporter {
        let mut reporter = Reporter::new("storefront");
        reporter.record(
            ScenarioReport::passed("A1", "dismiss login modal", Duration::from_millis(1200))
                .with_attachments(vec!["langfuse-trace".into()]),
        );
        reporter.record(
            ScenarioReport::failed("B5", "sort low to high", Duration::from_millis(3000), "p0 > p1 <after sort>")
                .with_attempts(4),
        );
        reporter.record(ScenarioReport::skipped(
            "D10",
            "checkout gate",
            Duration::from_millis(800),
            "Place Order disabled",
        ));
        reporter
    }

    mod status_tests {
        use super::*;

        #[test]
        fn test_status_predicates() {
            assert!(ScenarioStatus::Passed.is_passed());
            assert!(!ScenarioStatus::Skipped.is_passed());
            assert!(ScenarioStatus::Failed.is_failed());
            assert!(!ScenarioStatus::Skipped.is_failed());
        }
    }

    mod reporter_tests {
        use super::*;

        #[test]
        fn test_counts_and_rate() {
            let reporter = sample();
            assert_eq!(reporter.total_count(), 3);
            assert_eq!(reporter.passed_count(), 1);
            assert_eq!(reporter.failed_count(), 1);
            assert_eq!(reporter.skipped_count(), 1);
            assert!((reporter.pass_rate() - 0.5).abs() < f64::EPSILON);
            assert!(!reporter.all_passed());
            assert_eq!(reporter.total_duration(), Duration::from_millis(5000));
            assert_eq!(reporter.failures()[0].scenario, "B5");
        }

        #[test]
        fn test_empty_reporter_passes() {
            let reporter = Reporter::default();
            assert!(reporter.all_passed());
            assert!((reporter.pass_rate() - 1.0).abs() < f64::EPSILON);
        }

        #[test]
        fn test_summary() {
            assert_eq!(sample().summary(), "storefront: 1/3 passed, 1 failed, 1 skipped (50.0%)");
        }

        #[test]
        fn test_sort_orders_numerically() {
            let mut reporter = Reporter::default();
            for id in ["D10", "C7", "D9", "A1"] {
                reporter.record(ScenarioReport::passed(id, id, Duration::ZERO));
            }
            reporter.sort();
            let ids: Vec<&str> = reporter.results().iter().map(|r| r.scenario.as_str()).collect();
            assert_eq!(ids, vec!["A1", "C7", "D9", "D10"]);
        }
    }

    mod output_tests {
        use super::*;

        #[test]
        fn test_json_file_round_trip() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("report.json");
            sample().write_json(&path).unwrap();

            let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
            assert_eq!(raw["results"][1]["status"], "failed");
            assert_eq!(raw["results"][1]["attempts"], 4);
            assert_eq!(raw["results"][0]["attachments"][0], "langfuse-trace");
            assert!(raw["results"][0].get("failure").is_none());

            let back = Reporter::read_json(&path).unwrap();
            assert_eq!(back.results(), sample().results());
        }

        #[test]
        fn test_junit_escapes_and_marks_status() {
            let xml = sample().render_junit();
            assert!(xml.contains(r#"tests="3" failures="1" skipped="1""#));
            assert!(xml.contains("p0 &gt; p1 &lt;after sort&gt;"));
            assert!(xml.contains(r#"<skipped message="Place Order disabled"/>"#));
            assert!(xml.ends_with("</testsuite>\n"));
        }
    }
}
