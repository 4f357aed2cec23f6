//! Search results page.
//!
//! Results are identified by links to product pages (`/p/`), never by the
//! generated grid classes. A tile counts as "priced" when it shows a rupee
//! amount and no out-of-stock marker.

use super::selectors::{search, urls};
use super::{PageContext, PageObject};
use crate::assertion::{poll_until, PollConfig};
use crate::driver::{self, PageDriver};
use crate::locator::{self, LocatorChain};
use crate::price::parse_tile_price;
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{self, LoadState, RaceOutcome, Signal};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Budget for the results strip to render
pub const RESULTS_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for the URL to reflect the sort order
pub const SORT_URL_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget for the first two tiles to come out ascending
pub const SORT_SETTLE_TIMEOUT: Duration = Duration::from_secs(25);
/// Budget for the first product link to be visible
pub const FIRST_PRODUCT_TIMEOUT: Duration = Duration::from_secs(15);

/// State of the first two tiles while a sort settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SortCheck {
    /// Fewer than two tiles visible
    WaitingVisible,
    /// A tile shows no readable price yet
    WaitingPrices,
    /// First price <= second price
    Ascending {
        /// First tile price
        first: u64,
        /// Second tile price
        second: u64,
    },
    /// First price > second price
    Descending {
        /// First tile price
        first: u64,
        /// Second tile price
        second: u64,
    },
}

impl SortCheck {
    /// Whether the tiles are in non-decreasing order
    #[must_use]
    pub const fn is_ascending(&self) -> bool {
        matches!(self, Self::Ascending { .. })
    }

    /// Classify two tile prices (0 means unreadable)
    #[must_use]
    pub const fn from_prices(first: u64, second: u64) -> Self {
        if first == 0 || second == 0 {
            Self::WaitingPrices
        } else if first <= second {
            Self::Ascending { first, second }
        } else {
            Self::Descending { first, second }
        }
    }
}

/// Search results page
#[derive(Debug, Clone)]
pub struct SearchPage {
    ctx: PageContext,
}

impl PageObject for SearchPage {
    fn url_pattern(&self) -> &str {
        urls::SEARCH_RESULTS
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }
}

impl SearchPage {
    /// Bind to a tab
    #[must_use]
    pub const fn new(ctx: PageContext) -> Self {
        Self { ctx }
    }

    fn page(&self) -> &dyn PageDriver {
        self.ctx.page()
    }

    /// Wait for a results URL and the "Sort By" strip
    pub async fn wait_for_results(&self) -> bool {
        let page = self.page();
        if !wait::wait_for_url(page, urls::SEARCH_RESULTS, RESULTS_TIMEOUT).await {
            tracing::warn!(url = %self.ctx.url().await, "not on a results URL");
            return false;
        }
        wait::wait_for_load_state(page, LoadState::DomContentLoaded, RESULTS_TIMEOUT).await;
        locator::wait_visible(page, &search::results_ready(), RESULTS_TIMEOUT).await
    }

    /// Pick the price range in the sidebar dropdowns; absent dropdowns are skipped
    pub async fn apply_price_filter(&self, min: u64, max: u64) -> bool {
        let page = self.page();
        let toggle = LocatorChain::single("price filter", search::price_filter_toggle());
        self.ctx.click_if_visible(&toggle).await;

        for (locator, value) in [
            (search::min_price_select(), min),
            (search::max_price_select(), max),
        ] {
            if !locator::is_visible(page, &locator).await {
                tracing::debug!(locator = %locator, "price dropdown absent");
                continue;
            }
            match page.select_option(&locator, 0, &value.to_string()).await {
                Ok(true) => tracing::debug!(value, "price bound selected"),
                Ok(false) => tracing::debug!(value, "price bound not offered"),
                Err(e) => tracing::debug!(error = %e, "price bound selection failed"),
            }
        }
        self.wait_for_results().await
    }

    /// Tick the brand checkbox if the sidebar offers it; returns whether it did
    pub async fn apply_brand_filter(&self, brand: &str) -> bool {
        let checkbox = LocatorChain::single(format!("brand {brand}"), search::brand_checkbox(brand));
        if !self.ctx.click_if_visible(&checkbox).await {
            tracing::info!(brand, "brand filter not offered");
            return false;
        }
        self.wait_for_results().await
    }

    /// Classify the first two priced tiles
    pub async fn sort_check(&self) -> SortCheck {
        let tiles = match self.page().query(&search::product_cards()).await {
            Ok(tiles) => tiles,
            Err(e) => {
                tracing::debug!(error = %e, "tile query failed");
                return SortCheck::WaitingVisible;
            }
        };
        match (tiles.first(), tiles.get(1)) {
            (Some(a), Some(b)) if a.visible && b.visible => SortCheck::from_prices(
                parse_tile_price(&a.text).unwrap_or(0),
                parse_tile_price(&b.text).unwrap_or(0),
            ),
            _ => SortCheck::WaitingVisible,
        }
    }

    /// Sort by ascending price and wait until the top tiles agree
    ///
    /// Returns the last observed tile state; callers assert on it.
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when the results strip or the sort
    /// option never shows.
    pub async fn sort_low_to_high(&self) -> ProbeResult<SortCheck> {
        let page = self.page();
        if !locator::wait_visible(page, &search::results_ready(), RESULTS_TIMEOUT).await {
            return Err(ProbeError::not_found("\"Sort By\" strip"));
        }
        let option = self
            .ctx
            .resolve(&search::sort_low_to_high())
            .await
            .ok_or_else(|| ProbeError::not_found("\"Price -- Low to High\" sort option"))?;

        let (sorted_url, clicked) = tokio::join!(
            wait::wait_for_url(page, urls::SORTED_PRICE_ASC, SORT_URL_TIMEOUT),
            self.ctx.click(&option),
        );
        if let Err(e) = clicked {
            tracing::debug!(error = %e, "sort click failed");
        }
        tracing::debug!(sorted_url, "sort applied");

        locator::wait_visible(page, &search::results_ready(), RESULTS_TIMEOUT).await;

        let polled = poll_until(
            &PollConfig::new(SORT_SETTLE_TIMEOUT),
            || self.sort_check(),
            SortCheck::is_ascending,
        )
        .await;
        tracing::info!(check = ?polled.value, samples = polled.samples, "sort settled");
        Ok(polled.value)
    }

    /// Number of priced, available tiles currently matched
    pub async fn product_card_count(&self) -> usize {
        locator::count(self.page(), &search::product_cards()).await
    }

    /// Whether the first priced tile is visible within `timeout`
    pub async fn has_visible_product(&self, timeout: Duration) -> bool {
        locator::wait_visible(self.page(), &search::product_cards(), timeout).await
    }

    /// Trimmed texts of the leading priced tiles, stopping at the first hidden one
    ///
    /// Each text is cut to `max_chars` characters; empty texts are skipped.
    pub async fn tile_texts(&self, n: usize, max_chars: usize) -> Vec<String> {
        let tiles = self
            .page()
            .query(&search::product_cards())
            .await
            .unwrap_or_default();
        tiles
            .into_iter()
            .take(n)
            .take_while(|t| t.visible)
            .map(|t| t.text.trim().chars().take(max_chars).collect::<String>())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Price on the `i`th priced tile
    pub async fn tile_price(&self, i: usize) -> Option<u64> {
        let text = locator::text_of(self.page(), &search::product_cards(), i).await?;
        parse_tile_price(&text)
    }

    /// Open the first product, following it into a new tab if one opens
    ///
    /// Prefers priced tiles and falls back to any product link. Returns the
    /// tab now showing the product page.
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when no product link shows,
    /// [`ProbeError::AssertionFailed`] when the landing URL is not a product.
    pub async fn open_first_product(&self) -> ProbeResult<Arc<dyn PageDriver>> {
        let page = self.page();
        let target = if locator::count(page, &search::product_cards()).await > 0 {
            search::product_cards()
        } else {
            search::all_product_cards()
        };
        let chain = LocatorChain::single("first product", target).with_timeout(FIRST_PRODUCT_TIMEOUT);
        let hit = self
            .ctx
            .resolve(&chain)
            .await
            .ok_or_else(|| ProbeError::not_found("product link on results page"))?;

        let known = driver::page_ids(self.ctx.session()).await;
        self.ctx.click(&hit).await?;

        let same_tab = Signal::url(urls::PRODUCT);
        let outcome = wait::race_first(
            vec![
                wait::watch_new_page(self.ctx.session(), known.clone()),
                wait::watch(page, &same_tab),
            ],
            self.ctx.config().timeouts.navigation(),
        )
        .await;

        let pdp = match outcome {
            RaceOutcome::Won(0) => driver::find_new_page(self.ctx.session(), &known)
                .await
                .unwrap_or_else(|| self.ctx.page_handle()),
            _ => self.ctx.page_handle(),
        };
        wait::wait_for_load_state(pdp.as_ref(), LoadState::DomContentLoaded, RESULTS_TIMEOUT).await;

        let url = pdp.current_url().await.unwrap_or_default();
        if !wait::UrlPattern::new(urls::PRODUCT).matches(&url) {
            return Err(ProbeError::assertion(format!("expected a product URL, got {url}")));
        }
        tracing::info!(%url, popup = outcome == RaceOutcome::Won(0), "opened product");
        Ok(pdp)
    }
}
