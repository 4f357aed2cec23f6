//! storeprobe: Resilient End-to-End Checks for E-commerce Storefronts
//!
//! Drives a real (or mocked) browser through the flows a shopper takes on a
//! live storefront: dismissing the login modal, an invalid login, searching,
//! filtering and sorting, product details, cart add/remove and the checkout
//! gate. Live sites re-render, A/B test class names and answer one action in
//! several valid ways, so every element is found through a fallback chain
//! and every transition is a race between acceptable end states.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    STOREPROBE Architecture                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Scenario   │    │ Page       │    │ PageDriver │            │
//! │   │ Runner     │───►│ Objects    │───►│ CDP / Mock │            │
//! │   │ (retries)  │    │ (chains)   │    │            │            │
//! │   └─────┬──────┘    └─────┬──────┘    └────────────┘            │
//! │         │                 │ locator · wait · price              │
//! │         ▼                 ▼                                     │
//! │   ┌────────────┐    ┌────────────┐                              │
//! │   │ Report     │    │ Observ-    │  Langfuse traces +           │
//! │   │ JSON/JUnit │    │ ability    │  advisory LLM checks         │
//! │   └────────────┘    └────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use storeprobe::prelude::*;
//!
//! # async fn demo(launcher: Arc<dyn SessionLauncher>) {
//! let config = Arc::new(ProbeConfig::from_env());
//! let observability = Arc::new(Observability::from_config(&config));
//! let runner = ScenarioRunner::new(launcher, config, observability);
//! let report = runner.run(ScenarioId::B3, 0).await;
//! println!("{}: {:?}", report.scenario, report.status);
//! # }
//! ```

#![warn(missing_docs)]

mod assertion;
mod attachments;
mod result;

/// Run configuration: defaults, environment and YAML suite files
pub mod config;

/// Browser abstraction traits implemented by the CDP and mock backends
pub mod driver;

/// Fallback locator chains and element resolution
pub mod locator;

/// Readiness races between alternative end states
pub mod wait;

/// Price parsing and multi-source extraction
pub mod price;

/// In-memory browser for tests
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod mock;

/// Chromium over the `DevTools` protocol
#[cfg(feature = "browser")]
pub mod browser;

/// Page objects for the storefront screens
pub mod pages;

/// Per-attempt browser contexts and shared preconditions
pub mod fixture;

/// Langfuse traces and advisory LLM checks
pub mod observability;

/// Scenario catalogue and retrying runner
pub mod scenarios;

/// JSON and JUnit run reports
pub mod report;

pub use assertion::{
    poll_until, retry, soft_expect_visible, AssertionFailure, AssertionSummary, PollConfig,
    Polled, RetryConfig, SoftAssertions, DEFAULT_ATTEMPTS, DEFAULT_POLL_INTERVALS_MS,
    DEFAULT_RETRY_DELAY_MS, SOFT_EXPECT_TIMEOUT_MS,
};
pub use attachments::{Attachment, Attachments};
#[cfg(feature = "browser")]
pub use browser::CdpLauncher;
pub use config::{LangfuseSettings, OpenAiSettings, ProbeConfig, SuiteFile, TestData, Timeouts};
pub use driver::{BrowserSession, ElementInfo, PageDriver, SessionLauncher};
pub use fixture::{ScenarioFixture, SearchSetup, SessionIdentity};
pub use locator::{AriaRole, Locator, LocatorChain, Resolved, TextMatch};
pub use mock::{MockBrowser, MockElement, MockLauncher, MockPage};
pub use observability::{LlmCheck, Observability, TraceId};
pub use pages::{CartPage, HomePage, LoginPage, LoginState, PageContext, PageObject, ProductPage, SearchPage};
pub use price::{Price, PriceBounds, PriceExtractor, PriceSource};
pub use report::{Reporter, ScenarioReport, ScenarioStatus};
pub use result::{ensure, ProbeError, ProbeResult};
pub use scenarios::{run_scenario, ScenarioContext, ScenarioId, ScenarioRunner};
pub use wait::{LoadState, RaceOutcome, Signal, UrlPattern};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::assertion::*;
    pub use super::attachments::*;
    #[cfg(feature = "browser")]
    pub use super::browser::CdpLauncher;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::fixture::*;
    pub use super::locator::{AriaRole, Locator, LocatorChain, Resolved, TextMatch};
    pub use super::mock::{MockBrowser, MockElement, MockLauncher, MockPage};
    pub use super::observability::{LlmCheck, Observability, TestTrace, TraceId};
    pub use super::pages::*;
    pub use super::price::*;
    pub use super::report::*;
    pub use super::result::*;
    pub use super::scenarios::*;
    pub use super::wait::{LoadState, RaceOutcome, Signal, UrlPattern};
}
