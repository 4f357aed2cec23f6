//! Home page and global header.

use super::selectors::{self, home, paths};
use super::{PageContext, PageObject};
use crate::locator;
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{self, LoadState};
use std::time::Duration;

/// Home page
#[derive(Debug, Clone)]
pub struct HomePage {
    ctx: PageContext,
}

impl PageObject for HomePage {
    fn url_pattern(&self) -> &str {
        r"^https?://[^/]+/?(\?.*)?$"
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }
}

impl HomePage {
    /// Bind to a tab
    #[must_use]
    pub const fn new(ctx: PageContext) -> Self {
        Self { ctx }
    }

    /// Navigate home and dismiss the first-visit login modal
    pub async fn open(&self) -> ProbeResult<()> {
        self.ctx.goto(paths::HOME).await?;
        self.close_login_modal_if_present().await;
        Ok(())
    }

    /// Click the modal close button if it is showing; returns whether it was
    pub async fn close_login_modal_if_present(&self) -> bool {
        let closed = self.ctx.click_if_visible(&home::close_login_modal()).await;
        if closed {
            tracing::debug!("closed login modal");
        }
        closed
    }

    /// Whether the login modal is gone (or goes away) within `timeout`
    pub async fn login_modal_hidden(&self, timeout: Duration) -> bool {
        locator::wait_hidden(self.ctx.page(), &home::login_modal(), timeout).await
    }

    /// Dismiss the modal, then follow the header Login link if present
    pub async fn open_login_from_header(&self) -> bool {
        self.close_login_modal_if_present().await;
        self.ctx.click_if_visible(&home::login_link()).await
    }

    /// Type a term into the header search box and submit it
    pub async fn search(&self, term: &str) -> ProbeResult<()> {
        let page = self.ctx.page();
        let input = self
            .ctx
            .resolve(&home::search_input())
            .await
            .ok_or_else(|| ProbeError::not_found("header search input"))?;
        page.fill(&input.locator, input.nth, "").await?;
        page.fill(&input.locator, input.nth, term).await?;
        page.press(&input.locator, input.nth, "Enter").await?;
        wait::wait_for_load_state(page, LoadState::DomContentLoaded, self.ctx.config().timeouts.navigation())
            .await;
        tracing::info!(term, url = %self.ctx.url().await, "search submitted");
        Ok(())
    }

    /// Whether the site is showing its queue page instead of the store
    pub async fn surge_gate_visible(&self) -> bool {
        locator::is_visible(self.ctx.page(), &selectors::home::surge_gate()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::locator::AriaRole;
    use crate::mock::{MockBrowser, MockElement, MockPage};

    fn home_route(page: &MockPage) {
        page.append(
            None,
            MockElement::new("div").class("_2MlkI1").child(
                MockElement::new("button").class("_30XB9F").text("✕"),
            ),
        );
        let form = page.append(None, MockElement::new("form"));
        let input = page.append(
            Some(form),
            MockElement::new("input")
                .attr("name", "q")
                .attr("title", "Search for Products, Brands and More"),
        );
        page.on_press(input, "Enter", move |p| {
            let term = p.value_of(input).unwrap_or_default();
            p.navigate(&format!("/search?q={term}"));
        });
        page.append(None, MockElement::new("a").attr("href", "/account/login?ret=/").text("Login"));
    }

    fn browser() -> MockBrowser {
        let browser = MockBrowser::new();
        browser.route(r"^https://shop\.test/$", |page| {
            home_route(page);
            let modal_close = page
                .with_dom(|dom| dom.select("button._30XB9F").unwrap().into_iter().next())
                .unwrap();
            page.on_click(modal_close, |p| {
                p.with_dom(|dom| {
                    let modal = dom.select("div._2MlkI1").unwrap()[0];
                    dom.set_visible(modal, false);
                });
            });
        });
        browser
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_dismisses_modal() {
        let browser = browser();
        let (ctx, _page) = context_at(&browser, "/about");
        let home = HomePage::new(ctx);
        home.open().await.unwrap();
        assert!(home.is_current().await);
        assert!(home.login_modal_hidden(Duration::from_secs(1)).await);
        assert!(!home.close_login_modal_if_present().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_submits_term() {
        let browser = browser();
        let (ctx, page) = context_at(&browser, "/");
        let home = HomePage::new(ctx);
        home.search("phone").await.unwrap();
        assert_eq!(home.context().url().await, "https://shop.test/search?q=phone");
        assert!(page.actions().iter().any(|a| a.starts_with("press") && a.ends_with("Enter")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_login_from_header() {
        let browser = browser();
        let (ctx, _page) = context_at(&browser, "/");
        let home = HomePage::new(ctx);
        assert!(home.open_login_from_header().await);
        assert!(home.context().url().await.contains("/account/login"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_without_input_is_not_found() {
        let browser = MockBrowser::new();
        let (ctx, page) = context_at(&browser, "/");
        page.append(None, MockElement::new("button").role(AriaRole::Button).text("Shop"));
        let err = HomePage::new(ctx).search("phone").await.unwrap_err();
        assert!(matches!(err, ProbeError::ElementNotFound { .. }));
    }
}
