//! PageDriver - Abstract Browser Automation Traits
//!
//! Page objects talk to the browser only through [`PageDriver`] (one tab) and
//! [`BrowserSession`] (one isolated browser context). Two implementations
//! exist:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageDriver / BrowserSession (async traits)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐  │
//! │  │  CdpPage / CdpSession    │  │  MockPage / MockBrowser  │  │
//! │  │  (feature "browser")     │  │  (in-memory DOM)         │  │
//! │  │  chromiumoxide + JS      │  │  used by unit and        │  │
//! │  │  locator engine          │  │  scenario tests          │  │
//! │  └──────────────────────────┘  └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Element access is always by [`Locator`] plus the index of the match
//! (`nth`), never by a cached handle, so a re-render between resolution and
//! action is handled by the engine re-querying.

use crate::config::ProbeConfig;
use crate::locator::Locator;
use crate::result::ProbeResult;
use crate::wait::LoadState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot of one matched element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Rendered text, whitespace-normalized
    pub text: String,
    /// Whether the element is rendered with a non-empty box
    pub visible: bool,
    /// Whether the element accepts input (no `disabled`, no `aria-disabled`)
    pub enabled: bool,
}

/// One browser tab
#[async_trait]
pub trait PageDriver: Send + Sync + fmt::Debug {
    /// Stable identifier of this tab within its session
    fn id(&self) -> String;

    /// Navigate and wait for the document to commit
    async fn goto(&self, url: &str, timeout: Duration) -> ProbeResult<()>;

    /// Current URL
    async fn current_url(&self) -> ProbeResult<String>;

    /// `document.title`
    async fn title(&self) -> ProbeResult<String>;

    /// Whether the tab has been closed
    async fn is_closed(&self) -> bool;

    /// Whether the given load milestone has been reached for the current document
    async fn load_state_reached(&self, state: LoadState) -> ProbeResult<bool>;

    /// All elements matching the locator, in document order
    async fn query(&self, locator: &Locator) -> ProbeResult<Vec<ElementInfo>>;

    /// Click the `nth` match
    async fn click(&self, locator: &Locator, nth: usize) -> ProbeResult<()>;

    /// Replace the value of the `nth` match
    async fn fill(&self, locator: &Locator, nth: usize, value: &str) -> ProbeResult<()>;

    /// Press a key (e.g. `"Enter"`) with the `nth` match focused
    async fn press(&self, locator: &Locator, nth: usize, key: &str) -> ProbeResult<()>;

    /// Select an option by value or label; `false` when no option matched
    async fn select_option(&self, locator: &Locator, nth: usize, option: &str)
        -> ProbeResult<bool>;

    /// Attribute of the `nth` match
    async fn attribute(&self, locator: &Locator, nth: usize, name: &str)
        -> ProbeResult<Option<String>>;

    /// Raw bodies of `script[type="application/ld+json"]` blocks
    async fn structured_data(&self) -> ProbeResult<Vec<String>>;

    /// Own texts of body elements in document order, at most `limit`
    async fn body_texts(&self, limit: usize) -> ProbeResult<Vec<String>>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> ProbeResult<Vec<u8>>;

    /// Close the tab
    async fn close(&self) -> ProbeResult<()>;
}

/// An isolated browser context holding one or more tabs
#[async_trait]
pub trait BrowserSession: Send + Sync + fmt::Debug {
    /// Open a blank tab
    async fn new_page(&self) -> ProbeResult<Arc<dyn PageDriver>>;

    /// Open tabs, oldest first
    async fn pages(&self) -> ProbeResult<Vec<Arc<dyn PageDriver>>>;

    /// Tear the context down
    async fn close(&self) -> ProbeResult<()>;
}

/// Starts one isolated browser context per scenario attempt
#[async_trait]
pub trait SessionLauncher: Send + Sync + fmt::Debug {
    /// Launch a context configured for `config` (headless flag, timeouts)
    async fn launch(&self, config: &ProbeConfig) -> ProbeResult<Arc<dyn BrowserSession>>;
}

/// Ids of the currently open tabs
pub async fn page_ids(session: &dyn BrowserSession) -> Vec<String> {
    match session.pages().await {
        Ok(pages) => pages.iter().map(|p| p.id()).collect(),
        Err(e) => {
            tracing::debug!(error = %e, "listing pages failed");
            Vec::new()
        }
    }
}

/// The newest open tab whose id is not in `known`
pub async fn find_new_page(
    session: &dyn BrowserSession,
    known: &[String],
) -> Option<Arc<dyn PageDriver>> {
    let pages = session.pages().await.ok()?;
    let mut fresh = Vec::new();
    for page in pages {
        if !known.contains(&page.id()) && !page.is_closed().await {
            fresh.push(page);
        }
    }
    fresh.pop()
}
