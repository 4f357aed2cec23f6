//! Mock browser for testing page objects without Chromium.
//!
//! [`MockBrowser`] implements [`BrowserSession`] and hands out [`MockPage`]s,
//! which implement [`PageDriver`] over an in-memory [`MockDom`]. Site
//! behaviour is scripted with:
//!
//! - **routes**: `browser.route(pattern, |page| ...)` builds the document
//!   whenever a page navigates to a matching URL;
//! - **event hooks**: `page.on_click(node, |page| ...)` (also `on_change`,
//!   `on_press`) run when an action hits the node or one of its descendants;
//! - **timers**: `page.schedule(delay, |dom| ...)` mutates the document
//!   later on the tokio clock, so `start_paused` tests stay deterministic.
//!
//! ## Example
//!
//! ```rust
//! use storeprobe::mock::{MockBrowser, MockElement};
//!
//! let browser = MockBrowser::new();
//! browser.route(r"/viewcart", |page| {
//!     page.append(None, MockElement::new("div").class("s2gOFd").text("Missing Cart items?"));
//! });
//! let page = browser.open_page("https://shop.test/viewcart");
//! assert_eq!(page.with_dom(|dom| dom.select("div.s2gOFd").map(|v| v.len())).ok(), Some(1));
//! ```

mod css;
mod dom;

pub use css::SelectorList;
pub use dom::{MockDom, MockElement, NodeId};

use crate::config::ProbeConfig;
use crate::driver::{BrowserSession, ElementInfo, PageDriver, SessionLauncher};
use crate::locator::Locator;
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{LoadState, UrlPattern};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// PNG signature returned as the mock screenshot body
pub const MOCK_SCREENSHOT: &[u8] = b"\x89PNG\r\n\x1a\n";

type Hook = Arc<dyn Fn(&MockPage) + Send + Sync>;

/// Event a hook listens for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Click on the node or a descendant
    Click,
    /// Value changed by `fill` or `select_option`
    Change,
    /// Key pressed while the node is focused
    Press(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// BROWSER
// =============================================================================

struct BrowserInner {
    pages: Mutex<Vec<Arc<MockPage>>>,
    routes: Mutex<Vec<(UrlPattern, Hook)>>,
    next_id: AtomicUsize,
}

/// In-memory browser context
#[derive(Clone)]
pub struct MockBrowser {
    inner: Arc<BrowserInner>,
}

impl fmt::Debug for MockBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBrowser")
            .field("pages", &lock(&self.inner.pages).len())
            .field("routes", &lock(&self.inner.routes).len())
            .finish()
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    /// Browser with no pages and no routes
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrowserInner {
                pages: Mutex::new(Vec::new()),
                routes: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(1),
            }),
        }
    }

    /// Build documents for URLs matching `pattern` (first registered route wins)
    pub fn route(&self, pattern: &str, build: impl Fn(&MockPage) + Send + Sync + 'static) {
        lock(&self.inner.routes).push((UrlPattern::new(pattern), Arc::new(build)));
    }

    /// Open a tab at `url`
    pub fn open_page(&self, url: &str) -> Arc<MockPage> {
        open_in(&self.inner, url)
    }

    /// Pages that have not been closed
    #[must_use]
    pub fn open_pages(&self) -> Vec<Arc<MockPage>> {
        lock(&self.inner.pages)
            .iter()
            .filter(|p| !p.closed.load(Ordering::SeqCst))
            .cloned()
            .collect()
    }
}

fn open_in(inner: &Arc<BrowserInner>, url: &str) -> Arc<MockPage> {
    let n = inner.next_id.fetch_add(1, Ordering::SeqCst);
    let page = Arc::new(MockPage {
        id: format!("mock-page-{n}"),
        dom: Arc::new(Mutex::new(MockDom::new("about:blank"))),
        hooks: Mutex::new(Vec::new()),
        actions: Mutex::new(Vec::new()),
        closed: AtomicBool::new(false),
        browser: Arc::downgrade(inner),
    });
    lock(&inner.pages).push(Arc::clone(&page));
    page.navigate(url);
    page
}

#[async_trait]
impl BrowserSession for MockBrowser {
    async fn new_page(&self) -> ProbeResult<Arc<dyn PageDriver>> {
        let page: Arc<dyn PageDriver> = self.open_page("about:blank");
        Ok(page)
    }

    async fn pages(&self) -> ProbeResult<Vec<Arc<dyn PageDriver>>> {
        Ok(self
            .open_pages()
            .into_iter()
            .map(|p| p as Arc<dyn PageDriver>)
            .collect())
    }

    async fn close(&self) -> ProbeResult<()> {
        for page in lock(&self.inner.pages).iter() {
            page.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

// =============================================================================
// LAUNCHER
// =============================================================================

type BrowserFactory = Arc<dyn Fn() -> MockBrowser + Send + Sync>;

/// Hands out a freshly scripted [`MockBrowser`] per launch
#[derive(Clone)]
pub struct MockLauncher {
    build: BrowserFactory,
    launched: Arc<Mutex<Vec<MockBrowser>>>,
}

impl fmt::Debug for MockLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLauncher")
            .field("launched", &lock(&self.launched).len())
            .finish_non_exhaustive()
    }
}

impl MockLauncher {
    /// Launcher calling `build` for every new session
    #[must_use]
    pub fn new(build: impl Fn() -> MockBrowser + Send + Sync + 'static) -> Self {
        Self {
            build: Arc::new(build),
            launched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Browsers launched so far, oldest first
    #[must_use]
    pub fn launched(&self) -> Vec<MockBrowser> {
        lock(&self.launched).clone()
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn launch(&self, _config: &ProbeConfig) -> ProbeResult<Arc<dyn BrowserSession>> {
        let browser = (self.build)();
        lock(&self.launched).push(browser.clone());
        Ok(Arc::new(browser))
    }
}

// =============================================================================
// PAGE
// =============================================================================

/// One in-memory tab
pub struct MockPage {
    id: String,
    dom: Arc<Mutex<MockDom>>,
    hooks: Mutex<Vec<(NodeId, MockEvent, Hook)>>,
    actions: Mutex<Vec<String>>,
    closed: AtomicBool,
    browser: Weak<BrowserInner>,
}

impl fmt::Debug for MockPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPage")
            .field("id", &self.id)
            .field("url", &lock(&self.dom).url())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MockPage {
    /// Run `f` with the document locked
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut MockDom) -> R) -> R {
        f(&mut lock(&self.dom))
    }

    /// Insert an element tree
    pub fn append(&self, parent: Option<NodeId>, element: MockElement) -> NodeId {
        self.with_dom(|dom| dom.append(parent, element))
    }

    /// Set the document title
    pub fn set_title(&self, title: &str) {
        self.with_dom(|dom| dom.set_title(title));
    }

    /// Mark a load milestone reached or pending
    pub fn set_load_state(&self, state: LoadState, reached: bool) {
        self.with_dom(|dom| dom.set_load_state(state, reached));
    }

    /// Mutate the document after `delay` on the tokio clock
    pub fn schedule(&self, delay: Duration, f: impl FnOnce(&mut MockDom) + Send + 'static) {
        let dom = Arc::clone(&self.dom);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f(&mut lock(&dom));
        });
    }

    /// Register a hook
    pub fn on(&self, node: NodeId, event: MockEvent, hook: impl Fn(&Self) + Send + Sync + 'static) {
        lock(&self.hooks).push((node, event, Arc::new(hook)));
    }

    /// Run `hook` when the node (or a descendant) is clicked
    pub fn on_click(&self, node: NodeId, hook: impl Fn(&Self) + Send + Sync + 'static) {
        self.on(node, MockEvent::Click, hook);
    }

    /// Run `hook` when the node's value changes
    pub fn on_change(&self, node: NodeId, hook: impl Fn(&Self) + Send + Sync + 'static) {
        self.on(node, MockEvent::Change, hook);
    }

    /// Run `hook` when `key` is pressed on the node
    pub fn on_press(&self, node: NodeId, key: &str, hook: impl Fn(&Self) + Send + Sync + 'static) {
        self.on(node, MockEvent::Press(key.to_string()), hook);
    }

    /// Replace the document with the route for `url`
    pub fn navigate(&self, url: &str) {
        let absolute = self.absolutize(url);
        self.with_dom(|dom| dom.reset(&absolute));
        lock(&self.hooks).clear();
        let route = self.browser.upgrade().and_then(|b| {
            lock(&b.routes)
                .iter()
                .find(|(pattern, _)| pattern.matches(&absolute))
                .map(|(_, build)| Arc::clone(build))
        });
        if let Some(build) = route {
            build(self);
        }
    }

    /// Open another tab in the same browser
    pub fn open_popup(&self, url: &str) -> Option<Arc<Self>> {
        let absolute = self.absolutize(url);
        self.browser.upgrade().map(|b| open_in(&b, &absolute))
    }

    /// Value attribute of a node (what `fill` wrote)
    #[must_use]
    pub fn value_of(&self, node: NodeId) -> Option<String> {
        self.with_dom(|dom| dom.attr(node, "value").map(str::to_string))
    }

    /// Actions performed on this page, e.g. `click css=button`
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        lock(&self.actions).clone()
    }

    fn absolutize(&self, url: &str) -> String {
        if url.contains("://") || url.starts_with("about:") {
            return url.to_string();
        }
        let current = self.with_dom(|dom| dom.url().to_string());
        let origin = current
            .find("://")
            .and_then(|scheme| current[scheme + 3..].find('/').map(|p| &current[..scheme + 3 + p]))
            .unwrap_or(current.as_str());
        if url.starts_with('/') {
            format!("{origin}{url}")
        } else {
            format!("{origin}/{url}")
        }
    }

    fn ensure_open(&self) -> ProbeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ProbeError::page(format!("{} is closed", self.id)))
        } else {
            Ok(())
        }
    }

    /// Resolve `nth` match and check it can receive input
    fn target(&self, locator: &Locator, nth: usize) -> ProbeResult<NodeId> {
        self.ensure_open()?;
        self.with_dom(|dom| {
            let id = dom
                .find(locator)?
                .into_iter()
                .nth(nth)
                .ok_or_else(|| ProbeError::not_found(format!("{locator} (match {nth})")))?;
            if !dom.is_visible(id) {
                return Err(ProbeError::page(format!("{locator} is not visible")));
            }
            if !dom.is_enabled(id) {
                return Err(ProbeError::page(format!("{locator} is disabled")));
            }
            Ok(id)
        })
    }

    /// Fire hooks on `node` and its ancestors; returns how many ran
    fn dispatch(&self, node: NodeId, event: &MockEvent) -> usize {
        let path: Vec<NodeId> = self.with_dom(|dom| {
            let mut path = vec![node];
            let mut cursor = dom.parent(node);
            while let Some(p) = cursor {
                path.push(p);
                cursor = dom.parent(p);
            }
            path
        });
        let matching: Vec<Hook> = lock(&self.hooks)
            .iter()
            .filter(|(id, ev, _)| path.contains(id) && ev == event)
            .map(|(_, _, hook)| Arc::clone(hook))
            .collect();
        for hook in &matching {
            hook(self);
        }
        matching.len()
    }

    fn record(&self, action: String) {
        lock(&self.actions).push(action);
    }
}

#[async_trait]
impl PageDriver for MockPage {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> ProbeResult<()> {
        self.ensure_open()?;
        self.record(format!("goto {url}"));
        self.navigate(url);
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        self.ensure_open()?;
        Ok(self.with_dom(|dom| dom.url().to_string()))
    }

    async fn title(&self) -> ProbeResult<String> {
        self.ensure_open()?;
        Ok(self.with_dom(|dom| dom.title().to_string()))
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn load_state_reached(&self, state: LoadState) -> ProbeResult<bool> {
        self.ensure_open()?;
        Ok(self.with_dom(|dom| dom.load_state_reached(state)))
    }

    async fn query(&self, locator: &Locator) -> ProbeResult<Vec<ElementInfo>> {
        self.ensure_open()?;
        self.with_dom(|dom| Ok(dom.find(locator)?.into_iter().map(|id| dom.info(id)).collect()))
    }

    async fn click(&self, locator: &Locator, nth: usize) -> ProbeResult<()> {
        let node = self.target(locator, nth)?;
        self.record(format!("click {locator}"));
        if self.dispatch(node, &MockEvent::Click) > 0 {
            return Ok(());
        }
        let link = self.with_dom(|dom| {
            let mut cursor = Some(node);
            while let Some(id) = cursor {
                if dom.tag(id) == "a" {
                    if let Some(href) = dom.attr(id, "href") {
                        return Some((href.to_string(), dom.attr(id, "target") == Some("_blank")));
                    }
                }
                cursor = dom.parent(id);
            }
            None
        });
        match link {
            Some((href, true)) => {
                self.open_popup(&href);
            }
            Some((href, false)) => self.navigate(&href),
            None => {}
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, nth: usize, value: &str) -> ProbeResult<()> {
        let node = self.target(locator, nth)?;
        self.record(format!("fill {locator} = {value}"));
        self.with_dom(|dom| dom.set_attr(node, "value", value));
        self.dispatch(node, &MockEvent::Change);
        Ok(())
    }

    async fn press(&self, locator: &Locator, nth: usize, key: &str) -> ProbeResult<()> {
        let node = self.target(locator, nth)?;
        self.record(format!("press {locator} {key}"));
        self.dispatch(node, &MockEvent::Press(key.to_string()));
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, nth: usize, option: &str) -> ProbeResult<bool> {
        let node = self.target(locator, nth)?;
        let chosen = self.with_dom(|dom| {
            let options = dom.find(&Locator::css("option")).unwrap_or_default();
            let hit = options.into_iter().find(|o| {
                dom.is_descendant(*o, node)
                    && (dom.attr(*o, "value") == Some(option) || dom.full_text(*o) == option)
            })?;
            let value = dom
                .attr(hit, "value")
                .map_or_else(|| dom.full_text(hit), str::to_string);
            dom.set_attr(node, "value", &value);
            Some(value)
        });
        match chosen {
            Some(value) => {
                self.record(format!("select {locator} = {value}"));
                self.dispatch(node, &MockEvent::Change);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn attribute(&self, locator: &Locator, nth: usize, name: &str) -> ProbeResult<Option<String>> {
        self.ensure_open()?;
        self.with_dom(|dom| {
            Ok(dom
                .find(locator)?
                .into_iter()
                .nth(nth)
                .and_then(|id| dom.attr(id, name).map(str::to_string)))
        })
    }

    async fn structured_data(&self) -> ProbeResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.with_dom(|dom| dom.structured_data()))
    }

    async fn body_texts(&self, limit: usize) -> ProbeResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.with_dom(|dom| dom.body_texts(limit)))
    }

    async fn screenshot(&self) -> ProbeResult<Vec<u8>> {
        self.ensure_open()?;
        self.record("screenshot".into());
        Ok(MOCK_SCREENSHOT.to_vec())
    }

    async fn close(&self) -> ProbeResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
