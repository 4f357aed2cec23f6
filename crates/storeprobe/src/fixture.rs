//! Scenario Fixtures
//!
//! Preconditions shared by scenarios.
//!
//! ```text
//!   SessionLauncher ──launch──► ScenarioFixture ──new_context──► PageContext
//!                                   │
//!                                   └──search_setup──► SearchSetup ──search(term)──► SearchPage
//! ```
//!
//! Every scenario attempt gets its own [`ScenarioFixture`] (a fresh browser
//! context) and tears it down when done, so a retry never sees the cookies
//! or tabs of the attempt before it.

use crate::config::ProbeConfig;
use crate::driver::{BrowserSession, SessionLauncher};
use crate::locator;
use crate::pages::selectors::{home, paths, urls};
use crate::pages::{HomePage, PageContext, SearchPage};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{self, LoadState, Signal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Project name used in session ids when none is configured
pub const DEFAULT_PROJECT: &str = "chromium";

// =============================================================================
// SESSION IDENTITY
// =============================================================================

/// Who is running a scenario attempt; groups traces of retries together
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Browser project, e.g. `chromium`
    pub project: String,
    /// Worker index, zero-based
    pub worker: usize,
    /// Retry number, zero for the first attempt
    pub retry: u32,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT, 0)
    }
}

impl SessionIdentity {
    /// First attempt on `worker`
    #[must_use]
    pub fn new(project: impl Into<String>, worker: usize) -> Self {
        Self {
            project: project.into(),
            worker,
            retry: 0,
        }
    }

    /// Same worker, given retry number
    #[must_use]
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// `{project}-w{worker}-r{retry}`
    #[must_use]
    pub fn session_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-w{}-r{}", self.project, self.worker, self.retry)
    }
}

// =============================================================================
// SCENARIO FIXTURE
// =============================================================================

/// A browser context plus the run configuration, owned by one attempt
#[derive(Debug, Clone)]
pub struct ScenarioFixture {
    session: Arc<dyn BrowserSession>,
    config: Arc<ProbeConfig>,
    identity: SessionIdentity,
}

impl ScenarioFixture {
    /// Launch a fresh context
    ///
    /// # Errors
    ///
    /// Whatever the launcher reports, typically [`ProbeError::BrowserLaunch`].
    pub async fn setup(
        launcher: &dyn SessionLauncher,
        config: Arc<ProbeConfig>,
        identity: SessionIdentity,
    ) -> ProbeResult<Self> {
        let session = launcher.launch(&config).await?;
        tracing::debug!(session = %identity, "browser context launched");
        Ok(Self::from_session(session, config, identity))
    }

    /// Wrap an already running context
    #[must_use]
    pub fn from_session(
        session: Arc<dyn BrowserSession>,
        config: Arc<ProbeConfig>,
        identity: SessionIdentity,
    ) -> Self {
        Self {
            session,
            config,
            identity,
        }
    }

    /// The browser context
    #[must_use]
    pub fn session(&self) -> Arc<dyn BrowserSession> {
        Arc::clone(&self.session)
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Who is running
    #[must_use]
    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Open a blank tab and bind a page context to it
    ///
    /// # Errors
    ///
    /// Engine errors from opening the tab.
    pub async fn new_context(&self) -> ProbeResult<PageContext> {
        let page = self.session.new_page().await?;
        Ok(PageContext::new(
            Arc::clone(&self.session),
            page,
            Arc::clone(&self.config),
        ))
    }

    /// Open home in a new tab with the login modal dismissed
    ///
    /// # Errors
    ///
    /// Engine or navigation errors.
    pub async fn search_setup(&self) -> ProbeResult<SearchSetup> {
        SearchSetup::start(self.new_context().await?).await
    }

    /// Close the context and every tab in it
    ///
    /// # Errors
    ///
    /// Engine errors from closing.
    pub async fn teardown(self) -> ProbeResult<()> {
        tracing::debug!(session = %self.identity, "closing browser context");
        self.session.close().await
    }
}

// =============================================================================
// SEARCH SETUP
// =============================================================================

/// Home page with the modal dismissed, ready to search
#[derive(Debug, Clone)]
pub struct SearchSetup {
    ctx: PageContext,
}

impl SearchSetup {
    /// Go home and dismiss the login modal
    ///
    /// # Errors
    ///
    /// Navigation errors.
    pub async fn start(ctx: PageContext) -> ProbeResult<Self> {
        HomePage::new(ctx.clone()).open().await?;
        Ok(Self { ctx })
    }

    /// Page handles of the tab
    #[must_use]
    pub const fn context(&self) -> &PageContext {
        &self.ctx
    }

    /// Search for `term` and wait for the results page
    ///
    /// Uses the header box when it shows. A queue page or a missing box
    /// sends the tab straight to `/search?q=`, as does a submit that never
    /// reaches a results URL.
    ///
    /// # Errors
    ///
    /// [`ProbeError::AssertionFailed`] when the "Sort By" strip never shows;
    /// engine and navigation errors.
    pub async fn search(&self, term: &str) -> ProbeResult<SearchPage> {
        let page = self.ctx.page();
        let input = locator::probe(page, &home::search_input()).await;
        let surge = locator::is_visible(page, &home::surge_gate()).await;
        let direct = format!("{}?q={}", paths::SEARCH, urlencoding::encode(term));

        match input {
            Some(hit) if !surge => {
                page.fill(&hit.locator, hit.nth, term).await?;
                let landed = [Signal::url(urls::SEARCH_RESULTS)];
                let (outcome, pressed) = tokio::join!(
                    wait::first_of(page, &landed, self.ctx.config().timeouts.navigation()),
                    page.press(&hit.locator, hit.nth, "Enter"),
                );
                pressed?;
                if !outcome.is_won() {
                    tracing::warn!(term, "search submit did not reach results; opening them directly");
                    self.ctx.goto(&direct).await?;
                }
            }
            _ => {
                tracing::info!(term, surge, "search box unavailable; opening results directly");
                self.ctx.goto(&direct).await?;
            }
        }
        wait::wait_for_load_state(page, LoadState::DomContentLoaded, self.ctx.config().timeouts.navigation())
            .await;

        HomePage::new(self.ctx.clone()).close_login_modal_if_present().await;

        let results = SearchPage::new(self.ctx.clone());
        if !results.wait_for_results().await {
            return Err(ProbeError::assertion(format!(
                "results for {term:?} never showed the Sort By strip (url {})",
                self.ctx.url().await
            )));
        }
        tracing::info!(term, url = %self.ctx.url().await, "landed on results");
        Ok(results)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockBrowser, MockElement, MockLauncher, MockPage};
    use crate::pages::PageObject;

    const ORIGIN: &str = "https://shop.test";

    fn home_document(page: &MockPage, surge: bool) {
        if surge {
            page.append(None, MockElement::new("div").text("Lot of rush right now"));
        }
        let input = page.append(
            None,
            MockElement::new("input")
                .attr("name", "q")
                .attr("title", "Search for Products, Brands and More"),
        );
        page.on_press(input, "Enter", move |p| {
            let term = p.value_of(input).unwrap_or_default();
            p.navigate(&format!("/search?q={term}"));
        });
    }

    fn storefront(surge: bool, results: bool) -> MockBrowser {
        let browser = MockBrowser::new();
        browser.route(r"^https://shop\.test/$", move |page| home_document(page, surge));
        browser.route(r"/search\?", move |page| {
            if results {
                page.append(None, MockElement::new("div").child(MockElement::new("span").text("Sort By")));
            }
        });
        browser
    }

    fn fixture(browser: &MockBrowser) -> ScenarioFixture {
        let config = ProbeConfig::default().with_base_url(ORIGIN);
        ScenarioFixture::from_session(Arc::new(browser.clone()), Arc::new(config), SessionIdentity::default())
    }

    mod identity_tests {
        use super::*;

        #[test]
        fn test_session_id_format() {
            let id = SessionIdentity::new("chromium", 2).with_retry(1);
            assert_eq!(id.session_id(), "chromium-w2-r1");
            assert_eq!(SessionIdentity::default().to_string(), "chromium-w0-r0");
        }
    }

    mod fixture_tests {
        use super::*;

        #[tokio::test]
        async fn test_setup_launches_fresh_context() {
            let launcher = MockLauncher::new(MockBrowser::new);
            let config = Arc::new(ProbeConfig::default());
            let first = ScenarioFixture::setup(&launcher, Arc::clone(&config), SessionIdentity::default())
                .await
                .unwrap();
            let second = ScenarioFixture::setup(&launcher, config, SessionIdentity::default().with_retry(1))
                .await
                .unwrap();
            assert_eq!(launcher.launched().len(), 2);
            assert_eq!(second.identity().retry, 1);

            first.new_context().await.unwrap();
            assert_eq!(launcher.launched()[0].open_pages().len(), 1);
            first.teardown().await.unwrap();
            assert!(launcher.launched()[0].open_pages().is_empty());
        }
    }

    mod search_setup_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_search_through_header_box() {
            let browser = storefront(false, true);
            let setup = fixture(&browser).search_setup().await.unwrap();
            let results = setup.search("phone").await.unwrap();
            assert!(results.is_current().await);
            assert_eq!(setup.context().url().await, "https://shop.test/search?q=phone");
            let actions = browser.open_pages()[0].actions();
            assert!(actions.iter().any(|a| a.starts_with("press")));
            assert_eq!(actions.iter().filter(|a| a.starts_with("goto")).count(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_surge_gate_goes_direct() {
            let browser = storefront(true, true);
            let setup = fixture(&browser).search_setup().await.unwrap();
            setup.search("samsung mobile").await.unwrap();
            assert_eq!(setup.context().url().await, "https://shop.test/search?q=samsung%20mobile");
            let actions = browser.open_pages()[0].actions();
            assert!(actions.iter().all(|a| !a.starts_with("press")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_sort_strip_fails() {
            let browser = storefront(false, false);
            let setup = fixture(&browser).search_setup().await.unwrap();
            let err = setup.search("phone").await.unwrap_err();
            assert!(matches!(err, ProbeError::AssertionFailed { .. }));
        }
    }
}
