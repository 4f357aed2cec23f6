//! Result and error types for storeprobe.

use thiserror::Error;

/// Result type for storeprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while driving a storefront
///
/// Absence and timeouts are not errors here: locator and readiness code
/// return `Option`/`RaceOutcome` for those. These variants cover the cases
/// where an operation cannot meaningfully continue.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Page-level engine error (evaluation, input dispatch, closed tab)
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A required element never became visible
    #[error("Element not found: {description}")]
    ElementNotFound {
        /// What was being looked for
        description: String,
    },

    /// Scenario-level assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Scenario skipped at runtime (precondition on the live site not met)
    #[error("Skipped: {reason}")]
    Skipped {
        /// Why the scenario did not run to completion
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ProbeError {
    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }

    /// Create an element-not-found error
    #[must_use]
    pub fn not_found(description: impl Into<String>) -> Self {
        Self::ElementNotFound {
            description: description.into(),
        }
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a skip marker
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether this error marks a skip rather than a failure
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Fail with [`ProbeError::AssertionFailed`] unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> ProbeResult<()> {
    if condition {
        Ok(())
    } else {
        Err(ProbeError::assertion(message))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_error_display() {
        let err = ProbeError::assertion("price should be positive");
        assert_eq!(err.to_string(), "Assertion failed: price should be positive");
    }

    #[test]
    fn test_not_found_display() {
        let err = ProbeError::not_found("login identifier input");
        assert!(err.to_string().contains("login identifier input"));
    }

    #[test]
    fn test_skip_detection() {
        assert!(ProbeError::skipped("place order disabled").is_skip());
        assert!(!ProbeError::page("closed").is_skip());
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, "fine").is_ok());
        let err = ensure(false, "p0 <= p1").unwrap_err();
        assert!(matches!(err, ProbeError::AssertionFailed { .. }));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProbeError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
