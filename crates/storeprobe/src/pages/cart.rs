//! Cart page.
//!
//! The cart sometimes opens in its own tab, so [`CartPage`] rebinds to
//! whichever open tab shows `/viewcart` before acting. Items are counted by
//! their product links, one per line item.

use super::selectors::{cart, paths, urls};
use super::{PageContext, PageObject};
use crate::assertion::{poll_until, PollConfig};
use crate::driver::PageDriver;
use crate::locator::{self, Locator, TextMatch};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{self, LoadState, Signal, UrlPattern};
use serde::Serialize;
use std::time::Duration;

/// Budget for the first readiness race after opening the cart
pub const CART_READY_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for the product link confirmation race
pub const CART_ITEMS_TIMEOUT: Duration = Duration::from_secs(15);

/// Which checkout-gate prompts are showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutGate {
    /// Heading mentioning login, sign in or mobile entry
    pub login_heading: bool,
    /// Field labelled mobile or email
    pub login_label: bool,
    /// "Continue" button
    pub continue_button: bool,
    /// Delivery address header
    pub address_header: bool,
}

impl CheckoutGate {
    /// Whether any prompt is showing
    #[must_use]
    pub const fn any(&self) -> bool {
        self.login_heading || self.login_label || self.continue_button || self.address_header
    }
}

/// Cart page
#[derive(Debug, Clone)]
pub struct CartPage {
    ctx: PageContext,
}

impl PageObject for CartPage {
    fn url_pattern(&self) -> &str {
        urls::CART
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }
}

impl CartPage {
    /// Bind to a tab
    #[must_use]
    pub const fn new(ctx: PageContext) -> Self {
        Self { ctx }
    }

    fn page(&self) -> &dyn PageDriver {
        self.ctx.page()
    }

    /// Switch to an open cart tab, or to the first open tab if ours closed
    pub async fn rebind_to_cart_tab(&mut self) {
        let Ok(pages) = self.ctx.session().pages().await else {
            return;
        };
        let cart_url = UrlPattern::new(urls::CART);
        let mut open = Vec::new();
        for page in pages {
            if !page.is_closed().await {
                open.push(page);
            }
        }
        let mut cart_tab = None;
        for page in &open {
            if page.current_url().await.is_ok_and(|url| cart_url.matches(&url)) {
                cart_tab = Some(page.clone());
                break;
            }
        }
        if let Some(tab) = cart_tab {
            if tab.id() != self.page().id() {
                self.ctx.rebind(tab);
            }
        } else if self.page().is_closed().await {
            if let Some(first) = open.into_iter().next() {
                self.ctx.rebind(first);
            }
        }
    }

    async fn reopen_if_closed(&mut self) -> ProbeResult<()> {
        if self.page().is_closed().await {
            self.open().await?;
        }
        Ok(())
    }

    /// Make sure a live tab shows the cart and its contents rendered
    ///
    /// # Errors
    ///
    /// Navigation errors from opening `/viewcart`.
    pub async fn open(&mut self) -> ProbeResult<()> {
        self.rebind_to_cart_tab().await;
        if self.is_current().await {
            wait::wait_for_load_state(self.page(), LoadState::DomContentLoaded, CART_READY_TIMEOUT).await;
        } else {
            self.ctx.goto(paths::CART).await?;
        }

        let ready = [
            Signal::visible(cart::place_order()),
            Signal::visible(cart::login_link()),
            Signal::visible(cart::gate_text()),
            Signal::visible(cart::product_link()),
        ];
        let first = wait::first_of(self.page(), &ready, CART_READY_TIMEOUT).await;
        let items = wait::first_of(self.page(), &[Signal::visible(cart::product_link())], CART_ITEMS_TIMEOUT).await;
        tracing::info!(ready = ?first, items = items.is_won(), url = %self.ctx.url().await, "cart opened");
        Ok(())
    }

    /// Line items currently on the page
    pub async fn item_count(&self) -> usize {
        locator::count(self.page(), &cart::items()).await
    }

    /// Remove controls currently on the page
    pub async fn remove_control_count(&self) -> usize {
        let mut total = 0;
        for candidate in &cart::remove_button().candidates {
            total = total.max(locator::count(self.page(), candidate).await);
        }
        total
    }

    /// Poll until the cart shows at least one item by links or remove controls
    ///
    /// Returns the largest count observed on the last sample.
    pub async fn wait_for_items(&self, timeout: Duration) -> usize {
        let polled = poll_until(
            &PollConfig::new(timeout),
            || async { self.item_count().await.max(self.remove_control_count().await) },
            |n| *n > 0,
        )
        .await;
        polled.value
    }

    /// Whether the cart lists any item
    ///
    /// # Errors
    ///
    /// Navigation errors when the tab was closed and the cart had to be reopened.
    pub async fn has_items(&mut self) -> ProbeResult<bool> {
        self.reopen_if_closed().await?;
        Ok(self.item_count().await > 0)
    }

    /// Remove the first line item, confirming the dialog if one shows
    ///
    /// Returns `false` when the cart was already empty.
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when items exist but no remove control shows.
    pub async fn remove_first_item(&mut self) -> ProbeResult<bool> {
        if !self.has_items().await? {
            return Ok(false);
        }
        let remove = self
            .ctx
            .resolve(&cart::remove_button())
            .await
            .ok_or_else(|| ProbeError::not_found("remove control on cart item"))?;
        self.ctx.click(&remove).await?;

        if let Some(confirm) = self.ctx.resolve(&cart::confirm_remove()).await {
            self.ctx.click(&confirm).await?;
        }
        wait::wait_for_load_state(self.page(), LoadState::NetworkIdle, self.ctx.config().timeouts.navigation())
            .await;
        tracing::info!(remaining = self.item_count().await, "removed first cart item");
        Ok(true)
    }

    /// Whether Place Order is showing and enabled
    pub async fn can_checkout(&self) -> bool {
        let Some(hit) = locator::probe(self.page(), &cart::place_order()).await else {
            return false;
        };
        self.page()
            .query(&hit.locator)
            .await
            .ok()
            .and_then(|found| found.get(hit.nth).map(|e| e.enabled))
            .unwrap_or(false)
    }

    /// Click Place Order
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when there is no Place Order button.
    pub async fn proceed_to_checkout(&self) -> ProbeResult<()> {
        let hit = self
            .ctx
            .resolve(&cart::place_order())
            .await
            .ok_or_else(|| ProbeError::not_found("place order button"))?;
        self.ctx.click(&hit).await?;
        wait::wait_for_load_state(self.page(), LoadState::DomContentLoaded, self.ctx.config().timeouts.navigation())
            .await;
        Ok(())
    }

    /// Whether the empty-cart marker or banner is showing right now
    pub async fn empty_marker_visible(&self) -> bool {
        locator::is_visible(self.page(), &cart::empty_marker()).await
            || locator::probe(self.page(), &cart::gate_text()).await.is_some()
    }

    /// Wait for the explicit "Missing Cart items?" marker
    pub async fn wait_empty_marker(&self, timeout: Duration) -> bool {
        locator::wait_visible(self.page(), &cart::empty_marker(), timeout).await
    }

    /// Whether text matching `snippet` (literally, any case) becomes visible
    pub async fn contains_title_snippet(&self, snippet: &str, timeout: Duration) -> bool {
        let snippet = snippet.trim();
        if snippet.is_empty() {
            return false;
        }
        let loc = Locator::text(TextMatch::pattern(regex::escape(snippet)));
        locator::wait_visible(self.page(), &loc, timeout).await
    }

    /// Wait for any checkout-gate prompt, then report which ones show
    pub async fn checkout_gate_signals(&self, timeout: Duration) -> CheckoutGate {
        let chains = cart::checkout_gate();
        let signals: Vec<Signal> = chains.iter().cloned().map(Signal::visible).collect();
        wait::first_of(self.page(), &signals, timeout).await;

        let mut seen = [false; 4];
        for (slot, chain) in seen.iter_mut().zip(&chains) {
            *slot = locator::probe(self.page(), chain).await.is_some();
        }
        let [login_heading, login_label, continue_button, address_header] = seen;
        CheckoutGate {
            login_heading,
            login_label,
            continue_button,
            address_header,
        }
    }

    /// Login link shown to anonymous users
    pub async fn login_link_visible(&self) -> bool {
        locator::probe(self.page(), &cart::login_link()).await.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::locator::AriaRole;
    use crate::mock::{MockBrowser, MockElement, MockPage, NodeId};

    /// Cart with `n` items; removing the last one shows the empty marker
    fn cart_document(page: &MockPage, n: usize) {
        let main = page.append(None, MockElement::new("main"));
        for i in 0..n {
            let item = page.append(Some(main), MockElement::new("div").class("item"));
            page.append(
                Some(item),
                MockElement::new("a")
                    .class("T2CNXf QqLTQ-")
                    .attr("href", &format!("/phone-{i}/p/itm{i}"))
                    .text(&format!("Galaxy S24 variant {i}")),
            );
            let remove = page.append(Some(item), MockElement::new("div").class("sBxzFz").text("Remove"));
            page.on_click(remove, move |p| remove_item(p, main, item));
        }
        page.append(None, MockElement::new("button").text("Place Order"));
    }

    fn remove_item(page: &MockPage, main: NodeId, item: NodeId) {
        page.with_dom(|dom| {
            dom.remove(item);
            if dom.select("main div.item").unwrap().is_empty() {
                dom.append(
                    Some(main),
                    MockElement::new("div").class("s2gOFd").text("Missing Cart items?"),
                );
            }
        });
    }

    fn cart_browser(n: usize) -> MockBrowser {
        let browser = MockBrowser::new();
        browser.route(r"/viewcart", move |page| cart_document(page, n));
        browser
    }

    mod removal_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_removing_only_item_shows_empty_marker() {
            let browser = cart_browser(1);
            let (ctx, _page) = context_at(&browser, "/galaxy/p/itm1");
            let mut cart = CartPage::new(ctx);
            cart.open().await.unwrap();
            assert_eq!(cart.item_count().await, 1);

            assert!(cart.remove_first_item().await.unwrap());
            assert_eq!(cart.item_count().await, 0);
            assert!(cart.is_current().await);
            assert!(cart.wait_empty_marker(Duration::from_secs(5)).await);
            assert!(cart.empty_marker_visible().await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_removing_one_of_two_items_keeps_cart() {
            let browser = cart_browser(2);
            let (ctx, _page) = context_at(&browser, "/viewcart");
            let mut cart = CartPage::new(ctx);
            cart.open().await.unwrap();
            assert_eq!(cart.item_count().await, 2);

            assert!(cart.remove_first_item().await.unwrap());
            assert_eq!(cart.item_count().await, 1);
            assert!(!cart.empty_marker_visible().await);
            assert!(cart.contains_title_snippet("Galaxy S24 vari", Duration::from_secs(1)).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_remove_on_empty_cart_is_noop() {
            let browser = cart_browser(0);
            let (ctx, _page) = context_at(&browser, "/viewcart");
            let mut cart = CartPage::new(ctx);
            assert!(!cart.remove_first_item().await.unwrap());
        }

        #[tokio::test(start_paused = true)]
        async fn test_confirm_dialog_is_clicked() {
            let browser = MockBrowser::new();
            browser.route(r"/viewcart", |page| {
                let main = page.append(None, MockElement::new("main"));
                let item = page.append(Some(main), MockElement::new("div").class("item"));
                page.append(Some(item), MockElement::new("a").attr("href", "/x/p/itm1").text("Phone"));
                let remove = page.append(Some(item), MockElement::new("div").class("sBxzFz").text("Remove"));
                page.on_click(remove, move |p| {
                    let dialog = p.append(None, MockElement::new("div").role(AriaRole::Dialog));
                    let confirm = p.append(Some(dialog), MockElement::new("button").text("Remove"));
                    p.on_click(confirm, move |p| remove_item(p, main, item));
                });
            });
            let (ctx, page) = context_at(&browser, "/viewcart");
            let mut cart = CartPage::new(ctx);
            assert!(cart.remove_first_item().await.unwrap());
            assert_eq!(cart.item_count().await, 0);
            assert_eq!(page.actions().iter().filter(|a| a.starts_with("click")).count(), 2);
        }

        /// Line items with real `<button>Remove</button>` controls
        fn button_cart_browser(n: usize, with_dialog: bool) -> MockBrowser {
            let browser = MockBrowser::new();
            browser.route(r"/viewcart", move |page| {
                let main = page.append(None, MockElement::new("main"));
                for i in 0..n {
                    let item = page.append(Some(main), MockElement::new("div").class("item"));
                    page.append(
                        Some(item),
                        MockElement::new("a").attr("href", &format!("/phone-{i}/p/itm{i}")).text("Phone"),
                    );
                    let remove = page.append(Some(item), MockElement::new("button").text("Remove"));
                    if with_dialog {
                        page.on_click(remove, move |p| {
                            let dialog = p.append(None, MockElement::new("div").role(AriaRole::Dialog));
                            p.append(Some(dialog), MockElement::new("p").text("Are you sure?"));
                            let confirm = p.append(Some(dialog), MockElement::new("button").text("Remove"));
                            p.on_click(confirm, move |p| {
                                remove_item(p, main, item);
                                p.with_dom(|dom| dom.remove(dialog));
                            });
                        });
                    } else {
                        page.on_click(remove, move |p| remove_item(p, main, item));
                    }
                }
            });
            browser
        }

        #[tokio::test(start_paused = true)]
        async fn test_next_item_remove_button_is_not_taken_for_confirm() {
            let browser = button_cart_browser(2, false);
            let (ctx, page) = context_at(&browser, "/viewcart");
            let mut cart = CartPage::new(ctx);
            cart.open().await.unwrap();
            assert_eq!(cart.item_count().await, 2);

            assert!(cart.remove_first_item().await.unwrap());
            assert_eq!(cart.item_count().await, 1);
            assert!(!cart.empty_marker_visible().await);
            assert_eq!(page.actions().iter().filter(|a| a.starts_with("click")).count(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_dialog_confirm_removes_exactly_one_item() {
            let browser = button_cart_browser(2, true);
            let (ctx, page) = context_at(&browser, "/viewcart");
            let mut cart = CartPage::new(ctx);
            cart.open().await.unwrap();

            assert!(cart.remove_first_item().await.unwrap());
            assert_eq!(cart.item_count().await, 1);
            assert!(!cart.empty_marker_visible().await);
            assert_eq!(page.actions().iter().filter(|a| a.starts_with("click")).count(), 2);
        }
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_rebinds_to_open_cart_tab() {
            let browser = cart_browser(1);
            let (ctx, pdp) = context_at(&browser, "/galaxy/p/itm1");
            let cart_tab = browser.open_page("https://shop.test/viewcart");
            let mut cart = CartPage::new(ctx);
            cart.rebind_to_cart_tab().await;
            assert_eq!(cart.context().page().id(), cart_tab.id());
            assert_ne!(cart.context().page().id(), pdp.id());
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_tab_falls_back_to_first_open() {
            let browser = cart_browser(1);
            let search = browser.open_page("https://shop.test/search?q=phone");
            let (ctx, pdp) = context_at(&browser, "/galaxy/p/itm1");
            pdp.close().await.unwrap();
            let mut cart = CartPage::new(ctx);
            assert!(cart.has_items().await.unwrap());
            assert_eq!(cart.context().page().id(), search.id());
        }

        #[tokio::test(start_paused = true)]
        async fn test_checkout_proceeds_when_enabled() {
            let browser = cart_browser(1);
            browser.route(r"/checkout", |page| {
                page.append(None, MockElement::new("h2").text("Login or Signup"));
            });
            let (ctx, page) = context_at(&browser, "/viewcart");
            let order = page.with_dom(|dom| dom.select("button").unwrap()[0]);
            page.on_click(order, |p| p.navigate("/checkout/init"));
            let cart = CartPage::new(ctx);
            assert_eq!(cart.wait_for_items(Duration::from_secs(15)).await, 1);
            assert!(cart.can_checkout().await);
            cart.proceed_to_checkout().await.unwrap();
            assert!(wait::wait_for_url(cart.context().page(), urls::CHECKOUT_OR_LOGIN, Duration::from_secs(1)).await);
            let gate = cart.checkout_gate_signals(Duration::from_secs(15)).await;
            assert!(gate.login_heading);
            assert!(gate.any());
        }

        #[tokio::test(start_paused = true)]
        async fn test_disabled_place_order_blocks_checkout() {
            let browser = MockBrowser::new();
            let (ctx, page) = context_at(&browser, "/viewcart");
            page.append(None, MockElement::new("button").text("Place Order").disabled());
            let cart = CartPage::new(ctx);
            assert!(!cart.can_checkout().await);
            let gate = cart.checkout_gate_signals(Duration::from_secs(1)).await;
            assert_eq!(gate, CheckoutGate::default());
        }
    }
}
