//! Product detail page.

use super::selectors::{paths, product, urls};
use super::{PageContext, PageObject};
use crate::driver::PageDriver;
use crate::locator::{self, Locator, LocatorChain, Resolved};
use crate::price::{Price, PriceExtractor, PriceSource, MAX_DOM_SCAN_ELEMENTS};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{self, LoadState, RaceOutcome, Signal, UrlPattern};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

/// Budget for the product URL to commit
pub const PDP_URL_TIMEOUT: Duration = Duration::from_secs(15);
/// Budget for variant selection to enable the add button
pub const VARIANT_TIMEOUT: Duration = Duration::from_secs(15);
/// Pause between variant selection rounds
pub const VARIANT_PAUSE: Duration = Duration::from_millis(300);
/// Budget for each add-to-cart confirmation signal
pub const ADD_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// What the product page showed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    /// Product title, empty when every source failed
    pub title: String,
    /// Raw text the price was read from
    pub price_text: String,
    /// Extracted price
    pub price: Price,
    /// Which source produced the price
    pub price_source: Option<PriceSource>,
}

/// How an add-to-cart click was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddedVia {
    /// Icon button led straight to the cart
    IconFastPath,
    /// Site redirected to the cart
    Redirect,
    /// "Go to cart" link appeared and was followed
    GoToCartLink,
    /// Confirmation toast appeared
    Toast,
    /// No signal fired; the cart was opened directly
    Unconfirmed,
}

fn document_title_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        [r"(?i)Buy\s+(.+?)\s+Online", r"(?i)^(.+?)\s+-\s+Buy"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Product name embedded in a `document.title` such as
/// `"Buy Galaxy S24 Online at Best Price"`; the whole title otherwise
#[must_use]
pub fn title_from_document(doc_title: &str) -> Option<String> {
    let doc_title = doc_title.trim();
    if doc_title.is_empty() {
        return None;
    }
    let extracted = document_title_patterns()
        .iter()
        .find_map(|re| re.captures(doc_title))
        .and_then(|caps| caps.get(1))
        .map_or(doc_title, |m| m.as_str());
    Some(extracted.trim().to_string())
}

/// Product detail page
#[derive(Debug, Clone)]
pub struct ProductPage {
    ctx: PageContext,
}

impl PageObject for ProductPage {
    fn url_pattern(&self) -> &str {
        urls::PRODUCT
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }
}

impl ProductPage {
    /// Bind to a tab
    #[must_use]
    pub const fn new(ctx: PageContext) -> Self {
        Self { ctx }
    }

    fn page(&self) -> &dyn PageDriver {
        self.ctx.page()
    }

    async fn trimmed_text(&self, locator: &Locator, nth: usize) -> Option<String> {
        locator::text_of(self.page(), locator, nth)
            .await
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    async fn read_title(&self, heading: Option<&Resolved>) -> String {
        if let Some(hit) = heading {
            if let Some(title) = self.trimmed_text(&hit.locator, hit.nth).await {
                return title;
            }
        }
        let og = self
            .page()
            .attribute(&product::og_title(), 0, "content")
            .await
            .ok()
            .flatten()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(title) = og {
            return title;
        }
        let doc_title = self.page().title().await.unwrap_or_default();
        title_from_document(&doc_title).unwrap_or_default()
    }

    async fn read_price_text(&self) -> String {
        if let Some(hit) = self.ctx.resolve(&product::price_block()).await {
            if let Some(text) = self.trimmed_text(&hit.locator, hit.nth).await {
                return text;
            }
        }
        for fallback in product::price_text_fallbacks() {
            if let Some(text) = self.trimmed_text(&fallback, 0).await {
                return text;
            }
        }
        String::new()
    }

    /// Read title and price, falling back through every source the page offers
    ///
    /// Never fails: missing pieces come back empty or [`Price::NotAvailable`].
    pub async fn details(&self) -> ProductDetails {
        let page = self.page();
        if !wait::wait_for_url(page, urls::PRODUCT, PDP_URL_TIMEOUT).await {
            tracing::warn!(url = %self.ctx.url().await, "reading details off a non-product URL");
        }
        wait::wait_for_load_state(page, LoadState::DomContentLoaded, PDP_URL_TIMEOUT).await;

        let heading = self.ctx.resolve(&product::title()).await;
        self.ctx.resolve(&product::price_hint()).await;

        let title = self.read_title(heading.as_ref()).await;
        let price_text = self.read_price_text().await;

        let structured = page.structured_data().await.unwrap_or_default();
        let dom_texts = page
            .body_texts(MAX_DOM_SCAN_ELEMENTS)
            .await
            .unwrap_or_default();
        let extractor = PriceExtractor::new(self.ctx.config().price_bounds);
        let (price, price_source) = extractor.extract(&price_text, &structured, &dom_texts);

        tracing::info!(%title, %price, source = ?price_source, "product details");
        ProductDetails {
            title,
            price_text,
            price,
            price_source,
        }
    }

    async fn on_cart(&self) -> bool {
        UrlPattern::new(urls::CART).matches(&self.ctx.url().await)
    }

    /// Pick variants until `add` reports enabled or the budget runs out
    async fn enable_add_button(&self, add: &Resolved) {
        let page = self.page();
        let deadline = Instant::now() + VARIANT_TIMEOUT;
        while Instant::now() < deadline {
            let enabled = page
                .query(&add.locator)
                .await
                .ok()
                .and_then(|found| found.get(add.nth).map(|e| e.enabled))
                .unwrap_or(true);
            if enabled {
                return;
            }
            for control in product::variant_controls() {
                let chain = LocatorChain::single(control.to_string(), control);
                if self.ctx.click_if_visible(&chain).await {
                    tracing::debug!(control = %chain.name, "picked variant");
                }
            }
            tokio::time::sleep(VARIANT_PAUSE).await;
        }
        tracing::warn!("add to cart still disabled after variant selection");
    }

    /// Add the product to the cart and land on the cart page
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when no add-to-cart control shows;
    /// engine errors from the click itself.
    pub async fn add_to_cart(&self) -> ProbeResult<AddedVia> {
        let page = self.page();
        let add = self
            .ctx
            .resolve(&product::add_to_cart())
            .await
            .ok_or_else(|| ProbeError::not_found("add to cart button"))?;

        self.enable_add_button(&add).await;

        let icon = LocatorChain::single("icon add to cart", product::icon_add_to_cart());
        if self.ctx.click_if_visible(&icon).await
            && wait::wait_for_url(page, urls::CART, ADD_CONFIRM_TIMEOUT).await
        {
            tracing::info!("added to cart via icon button");
            return Ok(AddedVia::IconFastPath);
        }

        if !self.on_cart().await {
            self.ctx.click(&add).await?;
        }

        let signals = [
            Signal::url(urls::CART),
            Signal::visible(product::go_to_cart()),
            Signal::visible(product::added_toast()),
        ];
        let via = match wait::first_of(page, &signals, ADD_CONFIRM_TIMEOUT).await {
            RaceOutcome::Won(0) => AddedVia::Redirect,
            RaceOutcome::Won(1) => {
                if !self.on_cart().await && self.ctx.click_if_visible(&product::go_to_cart()).await {
                    wait::wait_for_url(page, urls::CART, ADD_CONFIRM_TIMEOUT).await;
                }
                AddedVia::GoToCartLink
            }
            RaceOutcome::Won(_) => {
                wait::wait_for_load_state(page, LoadState::NetworkIdle, ADD_CONFIRM_TIMEOUT).await;
                AddedVia::Toast
            }
            RaceOutcome::None => AddedVia::Unconfirmed,
        };

        if !self.on_cart().await {
            if let Err(e) = self.ctx.goto(paths::CART).await {
                tracing::warn!(error = %e, "direct cart navigation failed");
            }
        }
        let ready: Vec<Signal> = product::cart_ready().into_iter().map(Signal::visible).collect();
        if !wait::first_of(page, &ready, ADD_CONFIRM_TIMEOUT).await.is_won() {
            tracing::warn!("cart contents not visible after add to cart");
        }
        tracing::info!(?via, "added to cart");
        Ok(via)
    }

    /// Follow the "Go to cart" link if it is showing
    pub async fn go_to_cart(&self) -> bool {
        self.ctx.click_if_visible(&product::go_to_cart()).await
    }
}
