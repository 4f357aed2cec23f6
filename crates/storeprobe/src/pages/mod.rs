//! Page Objects for the storefront screens.
//!
//! Each page object binds one logical screen to a live tab through a
//! [`PageContext`] and exposes intention-revealing operations built from
//! locator chains ([`selectors`]), readiness races and price extraction.
//!
//! ```text
//!   HomePage ──search──► SearchPage ──open_first_product──► ProductPage
//!      │                                                       │
//!      └──open_login_from_header──► LoginPage        add_to_cart
//!                                                              ▼
//!                                 checkout gate ◄──── CartPage
//! ```
//!
//! Page objects never cache element handles. A page object whose screen
//! moved to another tab is rebound with [`PageContext::rebind`].

pub mod cart;
pub mod home;
pub mod login;
pub mod product;
pub mod search;
pub mod selectors;

pub use cart::CartPage;
pub use home::HomePage;
pub use login::{LoginPage, LoginState, RejectionEvidence, VerificationOutcome};
pub use product::{ProductDetails, ProductPage};
pub use search::SearchPage;

use crate::config::ProbeConfig;
use crate::driver::{BrowserSession, PageDriver};
use crate::locator::{self, LocatorChain, Resolved};
use crate::result::ProbeResult;
use crate::wait::UrlPattern;
use async_trait::async_trait;
use std::sync::Arc;

/// Handles a page object needs: its tab, the owning session and the run config
#[derive(Debug, Clone)]
pub struct PageContext {
    session: Arc<dyn BrowserSession>,
    page: Arc<dyn PageDriver>,
    config: Arc<ProbeConfig>,
}

impl PageContext {
    /// Bind to a tab
    #[must_use]
    pub fn new(
        session: Arc<dyn BrowserSession>,
        page: Arc<dyn PageDriver>,
        config: Arc<ProbeConfig>,
    ) -> Self {
        Self {
            session,
            page,
            config,
        }
    }

    /// The bound tab
    #[must_use]
    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    /// Shared handle to the bound tab
    #[must_use]
    pub fn page_handle(&self) -> Arc<dyn PageDriver> {
        Arc::clone(&self.page)
    }

    /// The browser context owning the tab
    #[must_use]
    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Same session and config, another tab
    #[must_use]
    pub fn with_page(&self, page: Arc<dyn PageDriver>) -> Self {
        Self {
            session: Arc::clone(&self.session),
            page,
            config: Arc::clone(&self.config),
        }
    }

    /// Point at another tab
    pub fn rebind(&mut self, page: Arc<dyn PageDriver>) {
        tracing::debug!(from = %self.page.id(), to = %page.id(), "rebinding page object");
        self.page = page;
    }

    /// Navigate to a site path (or absolute URL) with the navigation timeout
    pub async fn goto(&self, path: &str) -> ProbeResult<()> {
        let url = if path.contains("://") {
            path.to_string()
        } else {
            self.config.url(path)
        };
        self.page.goto(&url, self.config.timeouts.navigation()).await
    }

    /// Current URL, empty when the tab cannot report one
    pub async fn url(&self) -> String {
        self.page.current_url().await.unwrap_or_default()
    }

    /// Resolve a chain against the bound tab
    pub async fn resolve(&self, chain: &LocatorChain) -> Option<Resolved> {
        locator::resolve(self.page(), chain).await
    }

    /// Click a resolved element
    pub async fn click(&self, hit: &Resolved) -> ProbeResult<()> {
        self.page.click(&hit.locator, hit.nth).await
    }

    /// Click the first visible candidate if there is one right now
    ///
    /// Returns whether anything was clicked; engine errors on the click
    /// itself are logged and reported as `false`.
    pub async fn click_if_visible(&self, chain: &LocatorChain) -> bool {
        let Some(hit) = locator::probe(self.page(), chain).await else {
            return false;
        };
        match self.click(&hit).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(chain = %chain.name, error = %e, "click on visible element failed");
                false
            }
        }
    }
}

/// A page or component of the storefront
#[async_trait]
pub trait PageObject: Send + Sync {
    /// URL regex that identifies this screen
    fn url_pattern(&self) -> &str;

    /// The bound tab and run handles
    fn context(&self) -> &PageContext;

    /// Name used in logs
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether the bound tab currently shows this screen
    async fn is_current(&self) -> bool {
        UrlPattern::new(self.url_pattern()).matches(&self.context().url().await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod testing {
    use super::*;
    use crate::mock::{MockBrowser, MockPage};

    /// Origin used by page tests
    pub const ORIGIN: &str = "https://shop.test";

    /// Context over a fresh mock tab at `path`
    pub fn context_at(browser: &MockBrowser, path: &str) -> (PageContext, Arc<MockPage>) {
        let page = browser.open_page(&format!("{ORIGIN}{path}"));
        let config = ProbeConfig::default().with_base_url(ORIGIN);
        let ctx = PageContext::new(
            Arc::new(browser.clone()),
            Arc::clone(&page) as Arc<dyn PageDriver>,
            Arc::new(config),
        );
        (ctx, page)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::locator::Locator;
    use crate::mock::{MockBrowser, MockElement};

    struct Dummy(PageContext);

    impl PageObject for Dummy {
        fn url_pattern(&self) -> &str {
            r"/viewcart"
        }

        fn context(&self) -> &PageContext {
            &self.0
        }
    }

    #[tokio::test]
    async fn test_goto_joins_base_url() {
        let browser = MockBrowser::new();
        let (ctx, _page) = context_at(&browser, "/");
        ctx.goto("/viewcart").await.unwrap();
        assert_eq!(ctx.url().await, "https://shop.test/viewcart");
        let dummy = Dummy(ctx);
        assert!(dummy.is_current().await);
        assert!(dummy.page_name().ends_with("Dummy"));
    }

    #[tokio::test]
    async fn test_rebind_switches_tab() {
        let browser = MockBrowser::new();
        let (mut ctx, first) = context_at(&browser, "/search?q=phone");
        let second = browser.open_page("https://shop.test/viewcart");
        ctx.rebind(second.clone());
        assert_eq!(ctx.page().id(), second.id());
        assert_ne!(ctx.page().id(), first.id());
    }

    #[tokio::test]
    async fn test_click_if_visible_skips_hidden() {
        let browser = MockBrowser::new();
        let (ctx, page) = context_at(&browser, "/");
        page.append(None, MockElement::new("button").class("close").hidden());
        let chain = LocatorChain::single("close", Locator::css("button.close"));
        assert!(!ctx.click_if_visible(&chain).await);
        assert!(page.actions().iter().all(|a| !a.starts_with("click")));
    }
}
