//! Scenario Catalogue
//!
//! The ten end-to-end scenarios and the runner that retries them.
//!
//! ```text
//!   ScenarioRunner::run(id, worker)
//!     for retry in 0..=retries
//!       SessionLauncher ──► ScenarioFixture ──► ScenarioContext
//!                                                   │ begin: trace + trace ref
//!                                                   │ scenario body (page objects)
//!                                                   │ advisory LLM checks
//!                                                   ▼
//!                           attachments ──► <output>/<id>/
//! ```
//!
//! | Id  | Area     | What it checks                                   |
//! |-----|----------|--------------------------------------------------|
//! | A1  | login    | login modal can be dismissed                     |
//! | A2  | login    | an invalid identity is rejected                  |
//! | B3  | search   | a search lands on priced results                 |
//! | B4  | search   | price and brand filters keep results             |
//! | B5  | search   | "Price -- Low to High" orders the first tiles    |
//! | C6  | cart     | product page yields a title and a price          |
//! | C7  | cart     | an added product shows in the cart               |
//! | C8  | cart     | removing the only item empties the cart          |
//! | D9  | checkout | Place Order reaches checkout or login            |
//! | D10 | checkout | checkout prompts for login or an address         |

use crate::assertion::{poll_until, PollConfig};
use crate::attachments::Attachments;
use crate::config::{ProbeConfig, TestData};
use crate::driver::{PageDriver, SessionLauncher};
use crate::fixture::{ScenarioFixture, SessionIdentity, DEFAULT_PROJECT};
use crate::observability::{LlmCheck, Observability, TestTrace, TRACE_REF_ATTACHMENT};
use crate::pages::cart::CART_ITEMS_TIMEOUT;
use crate::pages::login::VERIFY_SETTLE_TIMEOUT;
use crate::pages::selectors::urls;
use crate::pages::{CartPage, HomePage, LoginPage, LoginState, PageContext, PageObject, ProductPage};
use crate::report::ScenarioReport;
use crate::result::{ensure, ProbeError, ProbeResult};
use crate::wait::{self, LoadState, Signal, UrlPattern};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Budget of a plain visibility expectation
pub const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget for checkout to load after Place Order
pub const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(15);
/// Budget for the checkout gate to settle before reading its prompts
pub const GATE_SETTLE_TIMEOUT: Duration = Duration::from_secs(20);
/// Characters of the product title looked for in the cart
pub const TITLE_SNIPPET_CHARS: usize = 15;
/// Characters kept per result tile in LLM prompts
pub const TILE_SNIPPET_CHARS: usize = 200;

// =============================================================================
// CATALOGUE
// =============================================================================

/// One scenario of the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScenarioId {
    /// Dismiss the login modal
    A1,
    /// Invalid login is rejected
    A2,
    /// Search shows results
    B3,
    /// Filters keep results
    B4,
    /// Sort by price ascending
    B5,
    /// Product details
    C6,
    /// Add to cart
    C7,
    /// Remove from cart
    C8,
    /// Proceed to checkout
    D9,
    /// Checkout gate prompts
    D10,
}

impl ScenarioId {
    /// Every scenario in catalogue order
    pub const ALL: [Self; 10] = [
        Self::A1,
        Self::A2,
        Self::B3,
        Self::B4,
        Self::B5,
        Self::C6,
        Self::C7,
        Self::C8,
        Self::D9,
        Self::D10,
    ];

    /// Short id, e.g. `D10`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B3 => "B3",
            Self::B4 => "B4",
            Self::B5 => "B5",
            Self::C6 => "C6",
            Self::C7 => "C7",
            Self::C8 => "C8",
            Self::D9 => "D9",
            Self::D10 => "D10",
        }
    }

    /// Human title
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::A1 => "A1: Close login modal if present on home",
            Self::A2 => "A2: Attempt login with invalid credentials and verify error message",
            Self::B3 => "B3: Search shows results",
            Self::B4 => "B4: Apply price and brand filters affects results",
            Self::B5 => "B5: Sort by Price, Low to High",
            Self::C6 => "C6: Open product details, capture product name and price",
            Self::C7 => "C7: Add product to cart, verify it appears in cart",
            Self::C8 => "C8: Remove product from cart, verify it's removed",
            Self::D9 => "D9: Add to cart, go to cart, proceed to checkout, validate page load",
            Self::D10 => "D10: Validate checkout prompts for login or address, capture evidence",
        }
    }

    /// Feature area
    #[must_use]
    pub const fn area(self) -> &'static str {
        match self {
            Self::A1 | Self::A2 => "login",
            Self::B3 | Self::B4 | Self::B5 => "search",
            Self::C6 | Self::C7 | Self::C8 => "cart",
            Self::D9 | Self::D10 => "checkout",
        }
    }

    /// Suite the scenario belongs to, used as the trace's file
    #[must_use]
    pub const fn file(self) -> &'static str {
        match self {
            Self::A1 | Self::A2 => "login.scenarios",
            Self::B3 | Self::B4 | Self::B5 => "search.scenarios",
            Self::C6 | Self::C7 | Self::C8 => "cart.scenarios",
            Self::D9 | Self::D10 => "checkout.scenarios",
        }
    }

    /// Kebab-case action recorded in trace metadata
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::A1 => "dismiss-modal",
            Self::A2 => "invalid-login",
            Self::B3 => "search-basic",
            Self::B4 => "filter",
            Self::B5 => "sort-low-high",
            Self::C6 => "open-pdp",
            Self::C7 => "add-to-cart",
            Self::C8 => "remove-from-cart",
            Self::D9 => "proceed-checkout",
            Self::D10 => "checkout-gate",
        }
    }

    /// What the scenario does, in words, for the trace input
    #[must_use]
    pub fn prompt(self, data: &TestData) -> String {
        let term = &data.search.term;
        let filters = &data.search.filters;
        match self {
            Self::A1 => "Open home page and close login modal if visible".to_string(),
            Self::A2 => format!("Attempt invalid login with email {}", data.invalid_login.email),
            Self::B3 => format!("Search for: {term}"),
            Self::B4 => format!(
                "Search: {term} -> filter price {}-{} and brand {}",
                filters.min_price, filters.max_price, filters.brand
            ),
            Self::B5 => format!("Search: {term} -> sort Low to High"),
            Self::C6 => format!("Search term: {term} -> open first product details"),
            Self::C7 => format!("Search term: {term} -> add first product to cart"),
            Self::C8 => format!("Search term: {term} -> add first product and then remove from cart"),
            Self::D9 => format!("Search term: {term} -> add first product to cart and proceed to checkout"),
            Self::D10 => format!("Search term: {term} -> proceed to checkout and capture the prompt"),
        }
    }

    /// What the scenario expects, for the trace output
    #[must_use]
    pub const fn expected(self) -> &'static str {
        match self {
            Self::A1 => "Login modal hidden",
            Self::A2 => "Validation error or login rejection state visible",
            Self::B3 => "At least one product card visible",
            Self::B4 => "Filtered results visible",
            Self::B5 => "First price <= second price",
            Self::C6 => "PDP opens; title and price captured (> 0)",
            Self::C7 => "Cart shows at least one item; product title snippet visible",
            Self::C8 => "Cart item count decreases; empty-state shown if only one item",
            Self::D9 => "Checkout or login page loads; cart kept when Place Order is disabled",
            Self::D10 => "Checkout prompts for login or a delivery address",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioId {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProbeError::Config {
                message: format!("unknown scenario {s:?}; expected one of A1..D10"),
            })
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything one scenario attempt works with
#[derive(Debug)]
pub struct ScenarioContext {
    id: ScenarioId,
    fixture: ScenarioFixture,
    observability: Arc<Observability>,
    attachments: Attachments,
    last_page: Option<Arc<dyn PageDriver>>,
}

impl ScenarioContext {
    /// Context for one attempt of `id`
    #[must_use]
    pub fn new(id: ScenarioId, fixture: ScenarioFixture, observability: Arc<Observability>) -> Self {
        Self {
            id,
            fixture,
            observability,
            attachments: Attachments::new(),
            last_page: None,
        }
    }

    /// Scenario being run
    #[must_use]
    pub const fn id(&self) -> ScenarioId {
        self.id
    }

    /// Browser context of the attempt
    #[must_use]
    pub const fn fixture(&self) -> &ScenarioFixture {
        &self.fixture
    }

    /// Attachments collected so far
    #[must_use]
    pub const fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    /// Attachments, mutably
    pub fn attachments_mut(&mut self) -> &mut Attachments {
        &mut self.attachments
    }

    /// The tab the scenario touched last
    #[must_use]
    pub fn last_page(&self) -> Option<Arc<dyn PageDriver>> {
        self.last_page.clone()
    }

    fn track(&mut self, page: Arc<dyn PageDriver>) {
        self.last_page = Some(page);
    }

    fn data(&self) -> &TestData {
        &self.fixture.config().test_data
    }

    fn session_id(&self) -> String {
        self.fixture.identity().session_id()
    }

    /// Record the scenario trace and attach its reference
    pub async fn begin(&mut self) {
        let id = self.id;
        let trace = TestTrace::new(self.session_id(), id.prompt(self.data()), json!(id.expected()))
            .named(id.title())
            .with_test_id(format!("{}::{}", id.file(), id.title()))
            .with_metadata(json!({
                "file": id.file(),
                "area": id.area(),
                "action": id.action(),
            }));
        let trace_id = self.observability.create_trace(trace).await;
        self.observability
            .attach_trace_ref(&mut self.attachments, trace_id.as_ref(), TRACE_REF_ATTACHMENT);
    }

    /// Run an advisory LLM check; `None` when it was skipped
    pub async fn advise(&mut self, prompt: &str, attach_name: &str) -> Option<LlmCheck> {
        let session_id = self.session_id();
        self.observability
            .llm_json_check(&mut self.attachments, prompt, &session_id, attach_name)
            .await
    }

    /// Open a tab bound to a page context and start tracking it
    async fn new_page(&mut self) -> ProbeResult<PageContext> {
        let ctx = self.fixture.new_context().await?;
        self.track(ctx.page_handle());
        Ok(ctx)
    }

    async fn screenshot(&mut self, name: &str) {
        let Some(page) = self.last_page.clone() else {
            return;
        };
        match page.screenshot().await {
            Ok(png) => self.attachments.attach_png(name, png),
            Err(e) => tracing::warn!(scenario = %self.id, error = %e, "screenshot failed"),
        }
    }
}

/// Fail unless the check ran cleanly and `key` is `true`
fn require_true(check: Option<LlmCheck>, key: &str) -> ProbeResult<()> {
    let Some(check) = check else {
        return Ok(());
    };
    ensure(check.ok, format!("LLM call failed: {}", check.raw.error.as_deref().unwrap_or_default()))?;
    ensure(
        check.flag(key) == Some(true),
        format!("LLM verdict {key} was not true: {:?}", check.parsed),
    )
}

/// Fail unless the check ran cleanly and `key` is a boolean
fn require_boolean(check: Option<LlmCheck>, key: &str) -> ProbeResult<()> {
    let Some(check) = check else {
        return Ok(());
    };
    ensure(check.ok, format!("LLM call failed: {}", check.raw.error.as_deref().unwrap_or_default()))?;
    ensure(
        check.flag(key).is_some(),
        format!("LLM verdict {key} missing or not a boolean: {:?}", check.parsed),
    )
}

// =============================================================================
// SCENARIOS
// =============================================================================

/// Run the body of `ctx`'s scenario
///
/// # Errors
///
/// [`ProbeError::AssertionFailed`] when an expectation does not hold,
/// [`ProbeError::Skipped`] when a live-site precondition is missing, and
/// engine errors.
pub async fn run_scenario(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    ctx.begin().await;
    match ctx.id() {
        ScenarioId::A1 => dismiss_login_modal(ctx).await,
        ScenarioId::A2 => invalid_login(ctx).await,
        ScenarioId::B3 => search_results(ctx).await,
        ScenarioId::B4 => filtered_results(ctx).await,
        ScenarioId::B5 => sorted_results(ctx).await,
        ScenarioId::C6 => product_details(ctx).await,
        ScenarioId::C7 => add_to_cart(ctx).await,
        ScenarioId::C8 => remove_from_cart(ctx).await,
        ScenarioId::D9 => proceed_to_checkout(ctx).await,
        ScenarioId::D10 => checkout_gate(ctx).await,
    }
}

async fn dismiss_login_modal(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let home = HomePage::new(ctx.new_page().await?);
    home.open().await?;
    home.close_login_modal_if_present().await;
    ensure(
        home.login_modal_hidden(EXPECT_TIMEOUT).await,
        "login modal still visible after closing",
    )
}

async fn invalid_login(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let page = ctx.new_page().await?;
    let identity = ctx.data().invalid_login.clone();
    let home = HomePage::new(page.clone());
    home.open().await?;
    home.open_login_from_header().await;

    let mut login = LoginPage::new(page);
    login.open().await?;
    let state = login.request_otp(&identity.email).await?;

    if state == LoginState::ValidationError || login.validation_error_visible().await {
        let text = login.error_text().await;
        ctx.attachments_mut().attach_text("login-error", text.clone());
        ensure(!text.is_empty(), "validation error showed no message")?;
        let check = ctx
            .advise(
                r#"User attempts login with invalid email/mobile. Is an error message expected? Respond JSON: {"expected": true|false}"#,
                "llm-invalid-login-expected",
            )
            .await;
        return require_true(check, "expected");
    }

    ensure(
        login.wait_otp_visible(EXPECT_TIMEOUT).await,
        format!("neither OTP inputs nor a validation error after requesting a code (state {state})"),
    )?;
    login.enter_otp(&identity.otp).await?;
    login.click_verify().await?;

    let outcome = login.verification_outcome(VERIFY_SETTLE_TIMEOUT).await;
    let error_text = login.error_text().await;
    ctx.attachments_mut().attach_json("login-outcome", &outcome);
    ensure(
        outcome.is_rejected() || !error_text.is_empty(),
        format!("invalid login was not rejected: {outcome:?}"),
    )
}

async fn search_results(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let term = ctx.data().search.term.clone();
    let setup = ctx.fixture().search_setup().await?;
    ctx.track(setup.context().page_handle());
    let results = setup.search(&term).await?;
    ensure(
        results.has_visible_product(EXPECT_TIMEOUT).await,
        format!("no priced product card for {term:?}"),
    )?;

    let tiles = results.tile_texts(3, TILE_SNIPPET_CHARS).await;
    ctx.attachments_mut().attach_text("search-tiles", tiles.join("\n"));
    let prompt = format!(
        "You are validating e-commerce search relevance.\nQuery: {term}\nHere are up to 3 product tiles (snippets).\nAnswer with JSON: {{\"relevant\": true|false, \"reason\": \"short\"}}.\nTiles:\n- {}",
        tiles.join("\n- ")
    );
    let check = ctx.advise(&prompt, "llm-search-relevance").await;
    require_true(check, "relevant")
}

async fn filtered_results(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let search = ctx.data().search.clone();
    let filters = &search.filters;
    let setup = ctx.fixture().search_setup().await?;
    ctx.track(setup.context().page_handle());
    let results = setup.search(&search.term).await?;

    results.apply_price_filter(filters.min_price, filters.max_price).await;
    let brand_applied = results.apply_brand_filter(&filters.brand).await;
    ctx.attachments_mut().attach_json(
        "filters",
        &json!({
            "minPrice": filters.min_price,
            "maxPrice": filters.max_price,
            "brand": filters.brand,
            "brandApplied": brand_applied,
            "url": results.context().url().await,
        }),
    );
    ensure(
        results.has_visible_product(EXPECT_TIMEOUT).await,
        "no priced product card after filtering",
    )?;

    let tiles = results.tile_texts(3, TILE_SNIPPET_CHARS).await;
    let prompt = format!(
        "We applied filters: brand={}, price={}-{}.\nGiven these tile texts, does it look consistent with the brand filter intent?\nRespond JSON: {{\"brandConsistent\": true|false, \"reason\": \"short\"}}.\nTiles:\n- {}",
        filters.brand,
        filters.min_price,
        filters.max_price,
        tiles.join("\n- ")
    );
    let check = ctx.advise(&prompt, "llm-filter-consistency").await;
    require_boolean(check, "brandConsistent")
}

async fn sorted_results(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let term = ctx.data().search.term.clone();
    let setup = ctx.fixture().search_setup().await?;
    ctx.track(setup.context().page_handle());
    let results = setup.search(&term).await?;

    let settled = results.sort_low_to_high().await?;
    ctx.attachments_mut().attach_json("sort-check", &settled);

    let p0 = results.tile_price(0).await.unwrap_or(0);
    let p1 = results.tile_price(1).await.unwrap_or(0);
    ensure(p0 > 0, "first tile shows no price after sorting")?;
    ensure(p0 <= p1, format!("tiles not ascending after sorting: {p0} > {p1}"))?;

    let prompt = format!(
        r#"Given two prices p0={p0} and p1={p1}, is the order non-decreasing? Respond JSON: {{"ascending": true|false}}"#
    );
    let check = ctx.advise(&prompt, "llm-sort-check").await;
    require_true(check, "ascending")
}

/// Search, open the first product and bind a context to its tab
async fn open_product(ctx: &mut ScenarioContext) -> ProbeResult<PageContext> {
    let term = ctx.data().search.term.clone();
    let setup = ctx.fixture().search_setup().await?;
    ctx.track(setup.context().page_handle());
    let results = setup.search(&term).await?;
    let pdp = results.open_first_product().await?;
    ctx.track(Arc::clone(&pdp));
    Ok(setup.context().with_page(pdp))
}

/// Add the product shown in `pdp` and open the cart in the same tab
async fn add_and_open_cart(ctx: &mut ScenarioContext, pdp: PageContext) -> ProbeResult<CartPage> {
    let via = ProductPage::new(pdp.clone()).add_to_cart().await?;
    tracing::debug!(scenario = %ctx.id(), ?via, "product added");
    let mut cart = CartPage::new(pdp);
    cart.open().await?;
    ctx.track(cart.context().page_handle());
    Ok(cart)
}

async fn product_details(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let pdp = open_product(ctx).await?;
    let details = ProductPage::new(pdp).details().await;
    ctx.attachments_mut().attach_json("C6-product-details", &details);

    ensure(!details.title.is_empty(), "product title empty")?;
    let price = details
        .price
        .amount()
        .ok_or_else(|| ProbeError::assertion(format!("no price on product page ({:?})", details.price_text)))?;
    ensure(price > 0, "product price not positive")?;

    let prompt = format!(
        r#"Is {price} a sensible positive price for a consumer product? Answer JSON: {{"sensible": true|false, "reason": "short"}}"#
    );
    let check = ctx.advise(&prompt, "llm-price-sanity").await;
    require_true(check, "sensible")
}

async fn add_to_cart(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let term = ctx.data().search.term.clone();
    let pdp = open_product(ctx).await?;
    let details = ProductPage::new(pdp.clone()).details().await;
    ensure(!details.title.is_empty(), "product title empty before adding to cart")?;

    let cart = add_and_open_cart(ctx, pdp).await?;
    let count = cart.item_count().await;
    ensure(count > 0, "cart is empty after adding a product")?;

    let snippet: String = details.title.chars().take(TITLE_SNIPPET_CHARS).collect();
    let snippet = snippet.trim();
    if !snippet.is_empty() {
        ensure(
            cart.contains_title_snippet(snippet, EXPECT_TIMEOUT).await,
            format!("cart does not show {snippet:?}"),
        )?;
    }

    let prompt = format!(
        r#"Query: {term}. Product title snippet: {snippet}. Respond JSON: {{"matchesIntent": true|false}}"#
    );
    let check = ctx.advise(&prompt, "llm-cart-match").await;
    require_boolean(check, "matchesIntent")
}

async fn remove_from_cart(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let pdp = open_product(ctx).await?;
    let mut cart = add_and_open_cart(ctx, pdp).await?;

    let initial = cart.item_count().await;
    ensure(initial > 0, "cart is empty before removal")?;
    cart.remove_first_item().await?;
    let remaining = poll_until(
        &PollConfig::new(EXPECT_TIMEOUT),
        || async { cart.item_count().await },
        |n| *n < initial,
    )
    .await
    .value;
    ctx.attachments_mut()
        .attach_json("cart-counts", &json!({ "initial": initial, "remaining": remaining }));

    ensure(
        remaining + 1 == initial,
        format!("expected {} item(s) after removing one of {initial}, found {remaining}", initial - 1),
    )?;
    if initial == 1 {
        let url = cart.context().url().await;
        ensure(
            UrlPattern::new(urls::CART).matches(&url),
            format!("left the cart after removal: {url}"),
        )?;
        ensure(
            cart.wait_empty_marker(EXPECT_TIMEOUT).await,
            "empty-cart marker not shown after removing the only item",
        )?;
    } else {
        ensure(
            !cart.empty_marker_visible().await,
            format!("empty-cart marker shown with {remaining} item(s) left"),
        )?;
    }

    let prompt = format!(
        r#"Initial cart count was {initial}. After removing one item, should an empty state be expected? Respond JSON: {{"empty": true|false}}"#
    );
    let check = ctx.advise(&prompt, "llm-cart-empty-check").await;
    require_boolean(check, "empty")
}

async fn proceed_to_checkout(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let pdp = open_product(ctx).await?;
    let cart = add_and_open_cart(ctx, pdp).await?;

    let items = cart.wait_for_items(CART_ITEMS_TIMEOUT).await;
    ensure(items > 0, "cart shows no items or remove controls")?;

    let page = cart.context().page();
    if cart.can_checkout().await {
        cart.proceed_to_checkout().await?;
        ensure(
            wait::wait_for_url(page, urls::CHECKOUT_OR_LOGIN, CHECKOUT_TIMEOUT).await,
            format!("checkout did not load: {}", cart.context().url().await),
        )
    } else {
        tracing::info!("Place Order disabled; staying on cart");
        ensure(cart.is_current().await, "left the cart although Place Order is disabled")
    }
}

async fn checkout_gate(ctx: &mut ScenarioContext) -> ProbeResult<()> {
    let pdp = open_product(ctx).await?;
    let cart = add_and_open_cart(ctx, pdp).await?;
    ensure(cart.item_count().await > 0, "cart is empty before checkout")?;

    if !cart.can_checkout().await {
        return Err(ProbeError::skipped(
            "Place Order not enabled; skipping checkout prompt validation.",
        ));
    }
    cart.proceed_to_checkout().await?;
    let settle = [
        Signal::url(urls::CHECKOUT_OR_LOGIN),
        Signal::LoadState(LoadState::NetworkIdle),
    ];
    wait::first_of(cart.context().page(), &settle, GATE_SETTLE_TIMEOUT).await;

    let gate = cart.checkout_gate_signals(CHECKOUT_TIMEOUT).await;
    ctx.attachments_mut().attach_json("checkout-gate", &gate);
    ctx.screenshot("checkout-prompt").await;
    ensure(gate.any(), "checkout showed neither a login nor an address prompt")
}

// =============================================================================
// RUNNER
// =============================================================================

/// Runs scenarios with per-attempt browser contexts and retries
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    launcher: Arc<dyn SessionLauncher>,
    config: Arc<ProbeConfig>,
    observability: Arc<Observability>,
    output_dir: Option<PathBuf>,
    project: String,
}

impl ScenarioRunner {
    /// Runner launching contexts through `launcher`
    #[must_use]
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        config: Arc<ProbeConfig>,
        observability: Arc<Observability>,
    ) -> Self {
        Self {
            launcher,
            config,
            observability,
            output_dir: None,
            project: DEFAULT_PROJECT.to_string(),
        }
    }

    /// Write each scenario's attachments under `dir/<id>/`
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Project name used in session ids
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run one attempt in a fresh context; returns the outcome and its attachments
    async fn attempt(&self, id: ScenarioId, identity: SessionIdentity) -> (ProbeResult<()>, Attachments) {
        let fixture = match ScenarioFixture::setup(self.launcher.as_ref(), Arc::clone(&self.config), identity).await {
            Ok(fixture) => fixture,
            Err(e) => return (Err(e), Attachments::new()),
        };
        let mut ctx = ScenarioContext::new(id, fixture.clone(), Arc::clone(&self.observability));
        let outcome = run_scenario(&mut ctx).await;
        if matches!(&outcome, Err(e) if !e.is_skip()) {
            ctx.screenshot("failure-screenshot").await;
        }
        if let Err(e) = fixture.teardown().await {
            tracing::warn!(scenario = %id, error = %e, "teardown failed");
        }
        (outcome, ctx.attachments)
    }

    fn persist(&self, id: ScenarioId, attachments: &Attachments) {
        let Some(dir) = &self.output_dir else {
            return;
        };
        if attachments.is_empty() {
            return;
        }
        if let Err(e) = attachments.write_to(&dir.join(id.as_str())) {
            tracing::warn!(scenario = %id, error = %e, "could not write attachments");
        }
    }

    /// Run `id` on `worker`, retrying failures up to the configured count
    ///
    /// Skips are not retried. The report carries the attachments of the
    /// last attempt.
    pub async fn run(&self, id: ScenarioId, worker: usize) -> ScenarioReport {
        let start = Instant::now();
        let attempts = self.config.retries.saturating_add(1);
        let mut retry = 0;
        loop {
            let identity = SessionIdentity::new(self.project.clone(), worker).with_retry(retry);
            tracing::info!(scenario = %id, session = %identity, "running");
            let (outcome, attachments) = self.attempt(id, identity).await;
            let last = retry + 1 >= attempts;

            let report = match outcome {
                Ok(()) => ScenarioReport::passed(id.as_str(), id.title(), start.elapsed()),
                Err(ProbeError::Skipped { reason }) => {
                    tracing::info!(scenario = %id, %reason, "skipped");
                    ScenarioReport::skipped(id.as_str(), id.title(), start.elapsed(), reason)
                }
                Err(e) if !last => {
                    tracing::warn!(scenario = %id, retry, error = %e, "attempt failed; retrying");
                    retry += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(scenario = %id, attempts, error = %e, "failed");
                    ScenarioReport::failed(id.as_str(), id.title(), start.elapsed(), e.to_string())
                }
            };
            self.persist(id, &attachments);
            return report
                .with_attempts(retry + 1)
                .with_attachments(attachments.names());
        }
    }
}
