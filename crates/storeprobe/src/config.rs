//! Run configuration.
//!
//! Values come from three layers, lowest precedence first: built-in
//! defaults, process environment, an optional YAML suite file. The CLI
//! applies its own flags last.

use crate::price::PriceBounds;
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default storefront
pub const DEFAULT_BASE_URL: &str = "https://www.flipkart.com";
/// Default Langfuse host
pub const DEFAULT_LANGFUSE_BASE_URL: &str = "https://cloud.langfuse.com";
/// Default OpenAI-compatible host used when `OPENAI_BASE_URL` is unset
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
/// Default chat model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Langfuse credentials and endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangfuseSettings {
    /// Project public key
    pub public_key: String,
    /// Project secret key
    #[serde(skip_serializing)]
    pub secret_key: String,
    /// API host
    pub base_url: String,
    /// Surface bridge warnings at `warn` instead of `debug`
    pub debug: bool,
}

impl Default for LangfuseSettings {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            secret_key: String::new(),
            base_url: DEFAULT_LANGFUSE_BASE_URL.to_string(),
            debug: false,
        }
    }
}

impl LangfuseSettings {
    /// Both keys present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.public_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// OpenAI-compatible chat endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiSettings {
    /// Bearer key; empty disables LLM checks
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Override host
    pub base_url: Option<String>,
    /// Model name
    pub model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

impl OpenAiSettings {
    /// API key present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Host to call, falling back to the public endpoint
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL)
    }
}

/// Engine timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Budget for a single click/fill/press
    pub action_ms: u64,
    /// Budget for a page navigation
    pub navigation_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            action_ms: 20_000,
            navigation_ms: 30_000,
        }
    }
}

impl Timeouts {
    /// Action timeout as a `Duration`
    #[must_use]
    pub const fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    /// Navigation timeout as a `Duration`
    #[must_use]
    pub const fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }
}

/// Filters applied by the filter scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Lower price bound
    pub min_price: u64,
    /// Upper price bound
    pub max_price: u64,
    /// Brand checkbox label
    pub brand: String,
}

/// Search inputs shared by the search, cart and checkout scenarios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchData {
    /// Free-text query
    pub term: String,
    /// Filter values
    pub filters: SearchFilters,
}

/// Identity used by the rejected-login scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidLogin {
    /// Email or mobile number typed into the form
    pub email: String,
    /// One-time code entered when the form accepts the identifier
    pub otp: String,
}

/// Scenario inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestData {
    /// Search inputs
    pub search: SearchData,
    /// Rejected login inputs
    pub invalid_login: InvalidLogin,
}

impl Default for TestData {
    fn default() -> Self {
        Self {
            search: SearchData {
                term: "samsung mobile".to_string(),
                filters: SearchFilters {
                    min_price: 10_000,
                    max_price: 30_000,
                    brand: "SAMSUNG".to_string(),
                },
            },
            invalid_login: InvalidLogin {
                email: "invalid_user@example".to_string(),
                otp: "000000".to_string(),
            },
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Storefront origin
    pub base_url: String,
    /// Run the browser without a window
    pub headless: bool,
    /// Account email (unused by the rejection-only login flow)
    pub user_email: String,
    /// Account password
    #[serde(skip_serializing)]
    pub user_password: String,
    /// Trace service
    pub langfuse: LangfuseSettings,
    /// LLM service
    pub openai: OpenAiSettings,
    /// Fail scenarios on malformed or failed LLM checks
    pub llm_strict_assert: bool,
    /// Engine timeouts
    pub timeouts: Timeouts,
    /// Attempts after the first failure of a scenario
    pub retries: u32,
    /// Plausible price range for digit scans
    pub price_bounds: PriceBounds,
    /// Scenario inputs
    pub test_data: TestData,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            user_email: String::new(),
            user_password: String::new(),
            langfuse: LangfuseSettings::default(),
            openai: OpenAiSettings::default(),
            llm_strict_assert: false,
            timeouts: Timeouts::default(),
            retries: 3,
            price_bounds: PriceBounds::default(),
            test_data: TestData::default(),
        }
    }
}

impl ProbeConfig {
    /// Defaults overlaid with the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    ///
    /// Empty values count as unset. Boolean flags are true only for the
    /// literal `true`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let flag = |key: &str, default: bool| get(key).map_or(default, |v| v == "true");
        let defaults = Self::default();

        Self {
            base_url: get("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            headless: flag("HEADLESS", true),
            user_email: get("USER_EMAIL").unwrap_or_default(),
            user_password: get("USER_PASSWORD").unwrap_or_default(),
            langfuse: LangfuseSettings {
                public_key: get("LANGFUSE_PUBLIC_KEY").unwrap_or_default(),
                secret_key: get("LANGFUSE_SECRET_KEY").unwrap_or_default(),
                base_url: get("LANGFUSE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LANGFUSE_BASE_URL.to_string()),
                debug: flag("LANGFUSE_DEBUG", false),
            },
            openai: OpenAiSettings {
                api_key: get("OPENAI_API_KEY").unwrap_or_default(),
                base_url: get("OPENAI_BASE_URL"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            llm_strict_assert: flag("LLM_STRICT_ASSERT", false),
            ..defaults
        }
    }

    /// Apply overrides from a suite file
    #[must_use]
    pub fn with_suite(mut self, suite: SuiteFile) -> Self {
        if let Some(base_url) = suite.base_url {
            self.base_url = base_url;
        }
        if let Some(timeouts) = suite.timeouts {
            self.timeouts = timeouts;
        }
        if let Some(retries) = suite.retries {
            self.retries = retries;
        }
        if let Some(bounds) = suite.price_bounds {
            self.price_bounds = bounds;
        }
        if let Some(data) = suite.test_data {
            self.test_data = data;
        }
        self
    }

    /// Set the storefront origin
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the retry count
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Absolute URL for a site path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Check invariants the rest of the crate relies on
    pub fn validate(&self) -> ProbeResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ProbeError::Config {
                message: format!("base URL must be http(s): {}", self.base_url),
            });
        }
        if self.price_bounds.min > self.price_bounds.max {
            return Err(ProbeError::Config {
                message: format!(
                    "price bounds inverted: {} > {}",
                    self.price_bounds.min, self.price_bounds.max
                ),
            });
        }
        Ok(())
    }
}

/// Optional YAML overrides, e.g. `storeprobe.yaml`
///
/// ```yaml
/// retries: 1
/// timeouts: { action_ms: 15000, navigation_ms: 45000 }
/// test_data:
///   search:
///     term: "running shoes"
///     filters: { min_price: 1000, max_price: 5000, brand: "PUMA" }
///   invalid_login: { email: "nobody@", otp: "123456" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteFile {
    /// Storefront origin
    #[serde(default)]
    pub base_url: Option<String>,
    /// Engine timeouts
    #[serde(default)]
    pub timeouts: Option<Timeouts>,
    /// Scenario retries
    #[serde(default)]
    pub retries: Option<u32>,
    /// Plausible price range
    #[serde(default)]
    pub price_bounds: Option<PriceBounds>,
    /// Scenario inputs
    #[serde(default)]
    pub test_data: Option<TestData>,
}

impl SuiteFile {
    /// Parse from YAML text
    pub fn from_yaml(text: &str) -> ProbeResult<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Load from disk
    pub fn load(path: &Path) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}
