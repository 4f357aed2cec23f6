//! Readiness Wait Strategy
//!
//! A storefront may answer the same user action with one of several equally
//! valid end states (redirect to the cart, a toast, a "Go to cart" link).
//! Instead of guessing which one will happen, callers race independent
//! [`Signal`]s and continue as soon as any of them fires.
//!
//! ```text
//!  UrlMatches(/viewcart/) ──┐
//!  ElementVisible(toast) ───┼──► race_first ──► RaceOutcome::Won(i) | None
//!  LoadState(NetworkIdle) ──┘
//! ```
//!
//! The race never errors and never reports two winners: the first future to
//! resolve `true` wins and the others are dropped before the caller resumes.
//! A `None` outcome is the caller's cue for its fallback (re-navigate or
//! re-query) followed by a second, longer confirmation race.

use crate::driver::{find_new_page, BrowserSession, PageDriver};
use crate::locator::{self, LocatorChain};
use futures::future::{select_all, BoxFuture, FutureExt};
use regex::Regex;
use std::fmt;
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Polling interval used by signal watchers (100ms)
pub const SIGNAL_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page load milestones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// The `load` event fired
    #[default]
    Load,
    /// `DOMContentLoaded` fired
    DomContentLoaded,
    /// No network requests for 500ms
    NetworkIdle,
}

impl LoadState {
    /// Event name as reported by the engine
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// URL PATTERN
// =============================================================================

/// Regular expression matched against the current URL
///
/// An invalid pattern never matches.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Option<Regex>,
}

impl UrlPattern {
    /// Compile a URL pattern
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = Regex::new(&source)
            .map_err(|e| tracing::debug!(pattern = %source, error = %e, "invalid url pattern"))
            .ok();
        Self { source, regex }
    }

    /// Pattern source
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `url` matches
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(url))
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

// =============================================================================
// SIGNALS
// =============================================================================

/// A readiness condition that can be awaited
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The page URL matches
    UrlMatches(UrlPattern),
    /// Some candidate of the chain has a visible match
    ElementVisible(LocatorChain),
    /// The load milestone was reached
    LoadState(LoadState),
}

impl Signal {
    /// URL signal from a pattern source
    #[must_use]
    pub fn url(pattern: &str) -> Self {
        Self::UrlMatches(UrlPattern::new(pattern))
    }

    /// Visibility signal
    #[must_use]
    pub fn visible(chain: LocatorChain) -> Self {
        Self::ElementVisible(chain)
    }

    /// Check the condition once
    pub async fn is_met(&self, page: &dyn PageDriver) -> bool {
        match self {
            Self::UrlMatches(pattern) => page
                .current_url()
                .await
                .is_ok_and(|url| pattern.matches(&url)),
            Self::ElementVisible(chain) => locator::probe(page, chain).await.is_some(),
            Self::LoadState(state) => page.load_state_reached(*state).await.unwrap_or(false),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlMatches(p) => write!(f, "url {p}"),
            Self::ElementVisible(chain) => write!(f, "visible {}", chain.name),
            Self::LoadState(state) => write!(f, "load state {state}"),
        }
    }
}

/// Outcome of a readiness race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOutcome {
    /// Index of the signal that fired first
    Won(usize),
    /// No signal fired within its timeout
    None,
}

impl RaceOutcome {
    /// Index of the winner, if any
    #[must_use]
    pub const fn winner(&self) -> Option<usize> {
        match self {
            Self::Won(i) => Some(*i),
            Self::None => None,
        }
    }

    /// Whether any signal fired
    #[must_use]
    pub const fn is_won(&self) -> bool {
        matches!(self, Self::Won(_))
    }
}

// =============================================================================
// RACE COMBINATOR
// =============================================================================

/// Race futures resolving to `bool`; the first to resolve `true` wins
///
/// Each future gets its own `timeout_each` budget. A future that resolves
/// `false` or times out drops out of the race without ending it. Losers are
/// dropped before this returns.
pub async fn race_first<'a>(
    signals: Vec<BoxFuture<'a, bool>>,
    timeout_each: Duration,
) -> RaceOutcome {
    if signals.is_empty() {
        return RaceOutcome::None;
    }
    let mut pending: Vec<BoxFuture<'a, (usize, bool)>> = signals
        .into_iter()
        .enumerate()
        .map(|(index, signal)| {
            async move {
                let fired = matches!(tokio::time::timeout(timeout_each, signal).await, Ok(true));
                (index, fired)
            }
            .boxed()
        })
        .collect();

    while !pending.is_empty() {
        let ((index, fired), _, rest) = select_all(pending).await;
        if fired {
            return RaceOutcome::Won(index);
        }
        pending = rest;
    }
    RaceOutcome::None
}

/// Future that resolves `true` once the signal holds (polls until dropped)
pub fn watch<'a>(page: &'a dyn PageDriver, signal: &'a Signal) -> BoxFuture<'a, bool> {
    async move {
        loop {
            if signal.is_met(page).await {
                return true;
            }
            if page.is_closed().await {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(SIGNAL_POLL_INTERVAL_MS)).await;
        }
    }
    .boxed()
}

/// Future that resolves `true` once a tab not in `known` opens
pub fn watch_new_page<'a>(
    session: &'a dyn BrowserSession,
    known: Vec<String>,
) -> BoxFuture<'a, bool> {
    async move {
        loop {
            if find_new_page(session, &known).await.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(SIGNAL_POLL_INTERVAL_MS)).await;
        }
    }
    .boxed()
}

/// Race page signals; `Won(i)` refers to the position in `signals`
pub async fn first_of(
    page: &dyn PageDriver,
    signals: &[Signal],
    timeout_each: Duration,
) -> RaceOutcome {
    let futures = signals.iter().map(|s| watch(page, s)).collect();
    let outcome = race_first(futures, timeout_each).await;
    match outcome {
        RaceOutcome::Won(i) => {
            tracing::debug!(signal = %signals[i], "readiness signal fired");
        }
        RaceOutcome::None => {
            tracing::debug!(
                signals = signals.len(),
                timeout_ms = timeout_each.as_millis() as u64,
                "no readiness signal fired"
            );
        }
    }
    outcome
}

/// Wait for one URL pattern
pub async fn wait_for_url(page: &dyn PageDriver, pattern: &str, timeout: Duration) -> bool {
    first_of(page, &[Signal::url(pattern)], timeout).await.is_won()
}

/// Wait for a load milestone
pub async fn wait_for_load_state(page: &dyn PageDriver, state: LoadState, timeout: Duration) -> bool {
    first_of(page, &[Signal::LoadState(state)], timeout)
        .await
        .is_won()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use crate::mock::{MockBrowser, MockElement};
    use proptest::prelude::*;

    fn delayed(ms: u64, value: bool) -> BoxFuture<'static, bool> {
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            value
        }
        .boxed()
    }

    mod race_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_fastest_true_wins() {
            let outcome = race_first(vec![delayed(300, true), delayed(100, true)], Duration::from_secs(1)).await;
            assert_eq!(outcome, RaceOutcome::Won(1));
        }

        #[tokio::test(start_paused = true)]
        async fn test_false_does_not_win() {
            let outcome = race_first(vec![delayed(10, false), delayed(200, true)], Duration::from_secs(1)).await;
            assert_eq!(outcome, RaceOutcome::Won(1));
        }

        #[tokio::test(start_paused = true)]
        async fn test_all_timeout_is_none() {
            let outcome = race_first(vec![delayed(5_000, true), delayed(6_000, true)], Duration::from_secs(1)).await;
            assert_eq!(outcome, RaceOutcome::None);
        }

        #[tokio::test]
        async fn test_empty_race_is_none() {
            assert_eq!(race_first(Vec::new(), Duration::from_millis(10)).await, RaceOutcome::None);
        }

        #[tokio::test(start_paused = true)]
        async fn test_simultaneous_signals_yield_exactly_one_winner() {
            let outcome = race_first(vec![delayed(100, true), delayed(100, true)], Duration::from_secs(1)).await;
            assert!(matches!(outcome, RaceOutcome::Won(0 | 1)));
        }
    }

    mod signal_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_url_signal_after_navigation() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/itm1");
            page.schedule(Duration::from_millis(400), move |dom| {
                dom.set_url("https://shop.test/viewcart");
            });

            let toast = LocatorChain::single("toast", Locator::text(crate::locator::TextMatch::pattern("added to cart")));
            let outcome = first_of(
                page.as_ref(),
                &[Signal::url(r"/viewcart"), Signal::visible(toast)],
                Duration::from_secs(2),
            )
            .await;
            assert_eq!(outcome, RaceOutcome::Won(0));
        }

        #[tokio::test(start_paused = true)]
        async fn test_element_signal_wins_when_url_never_changes() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/itm1");
            page.schedule(Duration::from_millis(250), |dom| {
                dom.append(None, MockElement::new("div").text("Your cart has 1 item"));
            });

            let toast = LocatorChain::single(
                "toast",
                Locator::text(crate::locator::TextMatch::pattern("added to cart|cart has 1 item")),
            );
            let outcome = first_of(
                page.as_ref(),
                &[Signal::url(r"/viewcart"), Signal::visible(toast)],
                Duration::from_secs(2),
            )
            .await;
            assert_eq!(outcome, RaceOutcome::Won(1));
        }

        #[tokio::test(start_paused = true)]
        async fn test_load_state_signal() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/viewcart");
            page.set_load_state(LoadState::NetworkIdle, false);
            assert!(!wait_for_load_state(page.as_ref(), LoadState::NetworkIdle, Duration::from_millis(300)).await);
            page.set_load_state(LoadState::NetworkIdle, true);
            assert!(wait_for_load_state(page.as_ref(), LoadState::NetworkIdle, Duration::from_millis(300)).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_new_page_signal() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/search?q=phone");
            let known = crate::driver::page_ids(&browser).await;
            let popup_source = browser.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                popup_source.open_page("https://shop.test/p/itm1");
            });

            let outcome = race_first(
                vec![
                    watch_new_page(&browser, known),
                    watch(page.as_ref(), &Signal::url("/p/")),
                ],
                Duration::from_secs(1),
            )
            .await;
            assert_eq!(outcome, RaceOutcome::Won(0));
        }

        #[test]
        fn test_invalid_url_pattern_never_matches() {
            let p = UrlPattern::new("([");
            assert!(!p.matches("(["));
            assert_eq!(p.source(), "([");
        }
    }

    proptest! {
        #[test]
        fn prop_race_returns_at_most_one_winner(delays in proptest::collection::vec((1u64..500, any::<bool>()), 0..6)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let expected_any = delays.iter().any(|(_, fired)| *fired);
            let outcome = rt.block_on(async {
                let futures = delays.iter().map(|(ms, v)| delayed(*ms, *v)).collect();
                race_first(futures, Duration::from_secs(1)).await
            });
            match outcome {
                RaceOutcome::Won(i) => {
                    prop_assert!(delays[i].1);
                    let fastest = delays.iter().filter(|(_, f)| *f).map(|(ms, _)| *ms).min().unwrap();
                    prop_assert_eq!(delays[i].0, fastest);
                }
                RaceOutcome::None => prop_assert!(!expected_any),
            }
        }
    }
}
