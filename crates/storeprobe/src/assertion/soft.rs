//! Soft Assertions
//!
//! Collect several failures without stopping a scenario, then turn them into
//! one [`ProbeError::AssertionFailed`] at the end. Each failure is also
//! logged at `warn` the moment it is recorded.

use crate::driver::PageDriver;
use crate::locator::{self, Locator};
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// Default wait for [`soft_expect_visible`]
pub const SOFT_EXPECT_TIMEOUT_MS: u64 = 5_000;

/// A single recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// What went wrong
    pub message: String,
    /// Position among all failures of the collector
    pub index: usize,
}

/// Counts of a collector's checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSummary {
    /// Checks made
    pub total: usize,
    /// Checks that held
    pub passed: usize,
    /// Checks that failed
    pub failed: usize,
}

/// Soft assertions collector
///
/// ```ignore
/// let mut soft = SoftAssertions::new();
/// soft.assert_true(tiles.len() >= 3, "at least three tiles");
/// soft.assert_eq(&cart_count, &1, "cart count");
/// soft.verify()?;
/// ```
#[derive(Debug, Default)]
pub struct SoftAssertions {
    failures: Vec<AssertionFailure>,
    assertion_count: usize,
}

impl SoftAssertions {
    /// Empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure unless `condition` holds
    pub fn assert_true(&mut self, condition: bool, message: &str) {
        self.assertion_count += 1;
        if !condition {
            self.record_failure(message.to_string());
        }
    }

    /// Record a failure unless the values are equal
    pub fn assert_eq<T: PartialEq + Debug>(&mut self, actual: &T, expected: &T, message: &str) {
        self.assertion_count += 1;
        if actual != expected {
            self.record_failure(format!("{message}: expected {expected:?}, got {actual:?}"));
        }
    }

    /// Record a failure if the option is empty
    pub fn assert_some<T>(&mut self, value: &Option<T>, message: &str) {
        self.assertion_count += 1;
        if value.is_none() {
            self.record_failure(format!("{message}: expected a value"));
        }
    }

    /// Record an unconditional failure
    pub fn fail(&mut self, message: impl Into<String>) {
        self.assertion_count += 1;
        self.record_failure(message.into());
    }

    fn record_failure(&mut self, message: String) {
        tracing::warn!(%message, "soft assertion failed");
        let index = self.failures.len();
        self.failures.push(AssertionFailure { message, index });
    }

    /// Recorded failures
    #[must_use]
    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    /// Checks made so far
    #[must_use]
    pub const fn assertion_count(&self) -> usize {
        self.assertion_count
    }

    /// No failures recorded
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Counts of checks
    #[must_use]
    pub fn summary(&self) -> AssertionSummary {
        AssertionSummary {
            total: self.assertion_count,
            passed: self.assertion_count - self.failures.len(),
            failed: self.failures.len(),
        }
    }

    /// Fail with every recorded message, one per line
    pub fn verify(&self) -> ProbeResult<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("  {}. {}", f.index + 1, f.message))
            .collect();
        Err(ProbeError::assertion(format!(
            "{} soft assertion(s) failed:\n{}",
            self.failures.len(),
            lines.join("\n")
        )))
    }
}

/// Wait for `locator` to become visible; log a warning instead of failing
///
/// Returns whether it became visible.
pub async fn soft_expect_visible(
    page: &dyn PageDriver,
    locator: &Locator,
    timeout: Duration,
    message: &str,
) -> bool {
    let visible = locator::wait_visible(page, locator, timeout).await;
    if !visible {
        tracing::warn!(locator = %locator, "soft expect failed: {message}");
    }
    visible
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockBrowser, MockElement};

    #[test]
    fn test_collects_all_failures() {
        let mut soft = SoftAssertions::new();
        soft.assert_true(false, "tile count");
        soft.assert_eq(&2, &1, "cart count");
        soft.assert_some(&Some(3), "price");
        assert_eq!(soft.failures().len(), 2);
        assert_eq!(
            soft.summary(),
            AssertionSummary {
                total: 3,
                passed: 1,
                failed: 2
            }
        );
        let err = soft.verify().unwrap_err().to_string();
        assert!(err.contains("2 soft assertion(s) failed"));
        assert!(err.contains("1. tile count"));
        assert!(err.contains("2. cart count: expected 1, got 2"));
    }

    #[test]
    fn test_verify_passes_when_clean() {
        let mut soft = SoftAssertions::new();
        soft.assert_true(true, "fine");
        assert!(soft.all_passed());
        assert!(soft.verify().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_expect_visible_never_fails() {
        let browser = MockBrowser::new();
        let page = browser.open_page("https://shop.test/");
        page.append(None, MockElement::new("div").class("banner").text("Sale"));
        let timeout = Duration::from_millis(SOFT_EXPECT_TIMEOUT_MS);
        assert!(soft_expect_visible(page.as_ref(), &Locator::css(".banner"), timeout, "banner").await);
        assert!(!soft_expect_visible(page.as_ref(), &Locator::css(".missing"), timeout, "missing").await);
    }
}
