//! Locator Resolution Strategy
//!
//! A [`Locator`] is a lazy query: a closed set of query kinds ([`Query`]) plus
//! optional text filters, a `has` child constraint and a `within` scope. A
//! [`LocatorChain`] is an ordered list of alternative locators for the same
//! semantic element; earlier entries encode more semantic signals (role,
//! label) and later ones fall back to brittle generated class names.
//!
//! ## Resolution
//!
//! ```text
//! poll ──► candidate[0] visible? ──yes──► Resolved { index: 0, .. }
//!   │            │ no
//!   │      candidate[1] visible? ──yes──► Resolved { index: 1, .. }
//!   │            │ no
//!   │           ...
//!   └──── sleep(poll_interval) until timeout ──► None
//! ```
//!
//! Visibility is re-read from the engine on every poll. An element that is
//! merely present in the document never counts as a match.

use crate::driver::{ElementInfo, PageDriver};
use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for locator resolution (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// TEXT MATCHING
// =============================================================================

/// Case-insensitive regular expression used for text, name and label matching
///
/// An invalid pattern is kept (so it can be serialized and reported) but never
/// matches anything.
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    case_insensitive: bool,
    regex: Option<Regex>,
}

impl TextPattern {
    /// Compile a case-insensitive pattern
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self::build(source.into(), true)
    }

    /// Compile a case-sensitive pattern
    #[must_use]
    pub fn case_sensitive(source: impl Into<String>) -> Self {
        Self::build(source.into(), false)
    }

    fn build(source: String, case_insensitive: bool) -> Self {
        let regex = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| tracing::debug!(pattern = %source, error = %e, "invalid text pattern"))
            .ok();
        Self {
            source,
            case_insensitive,
            regex,
        }
    }

    /// Pattern source as written
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the pattern compiled
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// Test a string against the pattern
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }

    fn flags(&self) -> &'static str {
        if self.case_insensitive {
            "i"
        } else {
            ""
        }
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TextPattern {}

/// How a text, accessible name, label or placeholder is matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Whole-string equality after whitespace normalization (case-sensitive)
    Exact(String),
    /// Case-insensitive substring
    Contains(String),
    /// Regular expression
    Pattern(TextPattern),
}

impl TextMatch {
    /// Exact match
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Case-insensitive substring match
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Case-insensitive regex match
    #[must_use]
    pub fn pattern(source: impl Into<String>) -> Self {
        Self::Pattern(TextPattern::new(source))
    }

    /// Whether `text` satisfies this matcher
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => normalize_whitespace(text) == normalize_whitespace(expected),
            Self::Contains(needle) => normalize_whitespace(text)
                .to_lowercase()
                .contains(&normalize_whitespace(needle).to_lowercase()),
            Self::Pattern(p) => p.is_match(text),
        }
    }
}

impl From<&str> for TextMatch {
    fn from(text: &str) -> Self {
        Self::Contains(text.to_string())
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(t) => write!(f, "\"{t}\""),
            Self::Contains(t) => write!(f, "~\"{t}\""),
            Self::Pattern(p) => write!(f, "/{}/", p.source()),
        }
    }
}

impl Serialize for TextMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Exact(t) => {
                map.serialize_entry("kind", "exact")?;
                map.serialize_entry("value", t)?;
            }
            Self::Contains(t) => {
                map.serialize_entry("kind", "contains")?;
                map.serialize_entry("value", t)?;
            }
            Self::Pattern(p) => {
                map.serialize_entry("kind", "pattern")?;
                map.serialize_entry("value", p.source())?;
                map.serialize_entry("flags", p.flags())?;
            }
        }
        map.end()
    }
}

/// Collapse whitespace runs (including NBSP) to single spaces and trim
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// QUERIES
// =============================================================================

/// ARIA roles used by the storefront page objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AriaRole {
    /// `button`, `input[type=button|submit]`
    Button,
    /// `a[href]`
    Link,
    /// `input` (text-like), `textarea`
    Textbox,
    /// `input[type=checkbox]`
    Checkbox,
    /// `input[type=radio]`
    Radio,
    /// `option`
    Option,
    /// `h1`..`h6`
    Heading,
    /// `select`
    Combobox,
    /// `form`
    Form,
    /// `dialog`
    Dialog,
    /// `img`
    Img,
}

impl AriaRole {
    /// Role name as used in the `role` attribute
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Link => "link",
            Self::Textbox => "textbox",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Option => "option",
            Self::Heading => "heading",
            Self::Combobox => "combobox",
            Self::Form => "form",
            Self::Dialog => "dialog",
            Self::Img => "img",
        }
    }

    /// Parse a role attribute value
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let role = match value.trim().to_ascii_lowercase().as_str() {
            "button" => Self::Button,
            "link" => Self::Link,
            "textbox" | "searchbox" => Self::Textbox,
            "checkbox" => Self::Checkbox,
            "radio" => Self::Radio,
            "option" => Self::Option,
            "heading" => Self::Heading,
            "combobox" | "listbox" => Self::Combobox,
            "form" => Self::Form,
            "dialog" => Self::Dialog,
            "img" => Self::Img,
            _ => return None,
        };
        Some(role)
    }
}

impl fmt::Display for AriaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of finding elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Query {
    /// Accessible role with optional accessible name and heading level
    Role {
        /// Role to match
        role: AriaRole,
        /// Accessible name filter
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<TextMatch>,
        /// Heading level (`h1` = 1)
        #[serde(skip_serializing_if = "Option::is_none")]
        level: Option<u8>,
    },
    /// Innermost elements whose own text matches
    Text {
        /// Text matcher
        text: TextMatch,
    },
    /// Form controls whose label matches
    Label {
        /// Label matcher
        text: TextMatch,
    },
    /// Inputs whose placeholder matches
    Placeholder {
        /// Placeholder matcher
        text: TextMatch,
    },
    /// CSS selector
    Css {
        /// Selector source
        selector: String,
    },
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role, name, level } => {
                write!(f, "role={role}")?;
                if let Some(name) = name {
                    write!(f, "[name={name}]")?;
                }
                if let Some(level) = level {
                    write!(f, "[level={level}]")?;
                }
                Ok(())
            }
            Self::Text { text } => write!(f, "text={text}"),
            Self::Label { text } => write!(f, "label={text}"),
            Self::Placeholder { text } => write!(f, "placeholder={text}"),
            Self::Css { selector } => write!(f, "css={selector}"),
        }
    }
}

// =============================================================================
// LOCATOR
// =============================================================================

/// A lazy element query with filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    /// Base query
    pub query: Query,
    /// Keep only elements whose full text matches
    #[serde(rename = "hasText", skip_serializing_if = "Option::is_none")]
    pub has_text: Option<TextMatch>,
    /// Drop elements whose full text matches
    #[serde(rename = "hasNotText", skip_serializing_if = "Option::is_none")]
    pub has_not_text: Option<TextMatch>,
    /// Keep only elements with a descendant matching this locator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has: Option<Box<Locator>>,
    /// Restrict the search to descendants of elements matching this locator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within: Option<Box<Locator>>,
}

impl Locator {
    fn from_query(query: Query) -> Self {
        Self {
            query,
            has_text: None,
            has_not_text: None,
            has: None,
            within: None,
        }
    }

    /// Locate by CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_query(Query::Css {
            selector: selector.into(),
        })
    }

    /// Locate by role alone
    #[must_use]
    pub fn role(role: AriaRole) -> Self {
        Self::from_query(Query::Role {
            role,
            name: None,
            level: None,
        })
    }

    /// Locate by role and accessible name
    #[must_use]
    pub fn role_named(role: AriaRole, name: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Role {
            role,
            name: Some(name.into()),
            level: None,
        })
    }

    /// Locate a heading at a given level
    #[must_use]
    pub fn heading(level: u8) -> Self {
        Self::from_query(Query::Role {
            role: AriaRole::Heading,
            name: None,
            level: Some(level),
        })
    }

    /// Locate by visible text
    #[must_use]
    pub fn text(text: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Text { text: text.into() })
    }

    /// Locate a form control by label
    #[must_use]
    pub fn label(text: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Label { text: text.into() })
    }

    /// Locate an input by placeholder
    #[must_use]
    pub fn placeholder(text: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Placeholder { text: text.into() })
    }

    /// Keep elements whose text matches
    #[must_use]
    pub fn with_text(mut self, text: impl Into<TextMatch>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    /// Drop elements whose text matches
    #[must_use]
    pub fn without_text(mut self, text: impl Into<TextMatch>) -> Self {
        self.has_not_text = Some(text.into());
        self
    }

    /// Keep elements containing a descendant matching `child`
    #[must_use]
    pub fn has(mut self, child: Self) -> Self {
        self.has = Some(Box::new(child));
        self
    }

    /// Search only inside elements matching `scope`
    ///
    /// Scoping an already scoped locator nests the scopes.
    #[must_use]
    pub fn within(mut self, scope: Self) -> Self {
        self.within = Some(Box::new(match self.within.take() {
            Some(inner) => inner.within(scope),
            None => scope,
        }));
        self
    }

    /// Serialized form handed to the in-page engine
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.within {
            write!(f, "{scope} >> ")?;
        }
        write!(f, "{}", self.query)?;
        if let Some(t) = &self.has_text {
            write!(f, " hasText={t}")?;
        }
        if let Some(t) = &self.has_not_text {
            write!(f, " hasNotText={t}")?;
        }
        if let Some(child) = &self.has {
            write!(f, " has({child})")?;
        }
        Ok(())
    }
}

// =============================================================================
// OPTIONS AND CHAINS
// =============================================================================

/// Options for locator resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl LocatorOptions {
    /// Timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Ordered alternatives for one semantic element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorChain {
    /// Name used in logs and errors
    pub name: String,
    /// Candidates in preference order
    pub candidates: Vec<Locator>,
    /// Wait budget and polling
    pub options: LocatorOptions,
}

impl LocatorChain {
    /// Create a chain with default options
    #[must_use]
    pub fn new(name: impl Into<String>, candidates: Vec<Locator>) -> Self {
        Self {
            name: name.into(),
            candidates,
            options: LocatorOptions::default(),
        }
    }

    /// Chain holding a single locator
    #[must_use]
    pub fn single(name: impl Into<String>, locator: Locator) -> Self {
        Self::new(name, vec![locator])
    }

    /// Set the wait budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval_ms = interval.as_millis() as u64;
        self
    }
}

/// A chain candidate that had a visible match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Index of the winning candidate in the chain
    pub index: usize,
    /// The winning candidate
    pub locator: Locator,
    /// Index of the first visible element among all matches of the candidate
    pub nth: usize,
    /// Number of elements the candidate matched (visible or not)
    pub count: usize,
}

// =============================================================================
// RESOLUTION
// =============================================================================

async fn query_or_empty(page: &dyn PageDriver, locator: &Locator) -> Vec<ElementInfo> {
    match page.query(locator).await {
        Ok(found) => found,
        Err(e) => {
            tracing::debug!(locator = %locator, error = %e, "locator query failed; treating as no match");
            Vec::new()
        }
    }
}

/// One pass over the chain: the first candidate with a visible element
pub async fn probe(page: &dyn PageDriver, chain: &LocatorChain) -> Option<Resolved> {
    for (index, locator) in chain.candidates.iter().enumerate() {
        let found = query_or_empty(page, locator).await;
        if let Some(nth) = found.iter().position(|e| e.visible) {
            return Some(Resolved {
                index,
                locator: locator.clone(),
                nth,
                count: found.len(),
            });
        }
    }
    None
}

/// Poll the chain until a candidate has a visible match or the budget runs out
///
/// Returns `None` on exhaustion; callers decide whether absence is an error.
pub async fn resolve(page: &dyn PageDriver, chain: &LocatorChain) -> Option<Resolved> {
    let deadline = Instant::now() + chain.options.timeout();
    loop {
        if let Some(hit) = probe(page, chain).await {
            tracing::debug!(chain = %chain.name, candidate = hit.index, "locator resolved");
            return Some(hit);
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(chain = %chain.name, timeout_ms = chain.options.timeout_ms, "locator not found");
            return None;
        }
        tokio::time::sleep(chain.options.poll_interval().min(deadline - now)).await;
    }
}

/// Zero-wait visibility probe for one locator
pub async fn is_visible(page: &dyn PageDriver, locator: &Locator) -> bool {
    query_or_empty(page, locator).await.iter().any(|e| e.visible)
}

/// Number of visible elements the locator currently matches
pub async fn count_visible(page: &dyn PageDriver, locator: &Locator) -> usize {
    query_or_empty(page, locator)
        .await
        .iter()
        .filter(|e| e.visible)
        .count()
}

/// Number of elements the locator currently matches, visible or not
pub async fn count(page: &dyn PageDriver, locator: &Locator) -> usize {
    query_or_empty(page, locator).await.len()
}

/// Wait until a single locator has a visible match
pub async fn wait_visible(page: &dyn PageDriver, locator: &Locator, timeout: Duration) -> bool {
    let chain = LocatorChain::single(locator.to_string(), locator.clone()).with_timeout(timeout);
    resolve(page, &chain).await.is_some()
}

/// Wait until the locator has no visible match
pub async fn wait_hidden(page: &dyn PageDriver, locator: &Locator, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_visible(page, locator).await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS).min(deadline - now))
            .await;
    }
}

/// Text of the `nth` match, if it exists
pub async fn text_of(page: &dyn PageDriver, locator: &Locator, nth: usize) -> Option<String> {
    query_or_empty(page, locator)
        .await
        .into_iter()
        .nth(nth)
        .map(|e| e.text)
}

/// Texts of all visible matches, in document order
pub async fn visible_texts(page: &dyn PageDriver, locator: &Locator) -> Vec<String> {
    query_or_empty(page, locator)
        .await
        .into_iter()
        .filter(|e| e.visible)
        .map(|e| e.text)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockBrowser, MockElement};

    mod text_match_tests {
        use super::*;

        #[test]
        fn test_exact_normalizes_whitespace() {
            let m = TextMatch::exact("Sort By");
            assert!(m.matches("  Sort\u{00A0}By "));
            assert!(!m.matches("sort by"));
            assert!(!m.matches("Sort By Price"));
        }

        #[test]
        fn test_contains_is_case_insensitive() {
            let m = TextMatch::contains("add to cart");
            assert!(m.matches("ADD TO CART"));
            assert!(m.matches("Click to Add to Cart now"));
            assert!(!m.matches("Buy now"));
        }

        #[test]
        fn test_pattern_is_case_insensitive() {
            let m = TextMatch::pattern(r"^remove$");
            assert!(m.matches("Remove"));
            assert!(!m.matches("Remove item"));
        }

        #[test]
        fn test_invalid_pattern_never_matches() {
            let p = TextPattern::new("(unclosed");
            assert!(!p.is_valid());
            assert!(!p.is_match("(unclosed"));
        }

        #[test]
        fn test_case_sensitive_pattern() {
            let p = TextPattern::case_sensitive("Login");
            assert!(p.is_match("Login"));
            assert!(!p.is_match("LOGIN"));
        }

        #[test]
        fn test_pattern_equality_by_source() {
            assert_eq!(TextMatch::pattern("a+"), TextMatch::pattern("a+"));
            assert_ne!(TextMatch::pattern("a+"), TextMatch::pattern("b+"));
        }
    }

    mod serialization_tests {
        use super::*;

        #[test]
        fn test_role_locator_json() {
            let loc = Locator::role_named(AriaRole::Button, TextMatch::pattern("add to cart"));
            let json = loc.to_json();
            assert_eq!(json["query"]["kind"], "role");
            assert_eq!(json["query"]["role"], "button");
            assert_eq!(json["query"]["name"]["kind"], "pattern");
            assert_eq!(json["query"]["name"]["flags"], "i");
            assert!(json.get("hasText").is_none());
        }

        #[test]
        fn test_filters_and_scope_json() {
            let loc = Locator::css("a[href*=\"/p/\"]")
                .with_text(TextMatch::pattern(r"₹\s*[\d,]+"))
                .without_text(TextMatch::contains("Currently unavailable"))
                .within(Locator::css("main"));
            let json = loc.to_json();
            assert_eq!(json["query"]["selector"], "a[href*=\"/p/\"]");
            assert_eq!(json["hasText"]["kind"], "pattern");
            assert_eq!(json["hasNotText"]["value"], "Currently unavailable");
            assert_eq!(json["within"]["query"]["selector"], "main");
        }

        #[test]
        fn test_display() {
            let loc = Locator::text(TextMatch::exact("Sort By")).within(Locator::css("div.strip"));
            assert_eq!(loc.to_string(), "css=div.strip >> text=\"Sort By\"");
        }

        #[test]
        fn test_nested_within() {
            let loc = Locator::css("button")
                .within(Locator::css("form"))
                .within(Locator::css("main"));
            let scope = loc.within.as_ref().unwrap();
            assert_eq!(scope.query, Query::Css { selector: "form".into() });
            assert_eq!(
                scope.within.as_ref().unwrap().query,
                Query::Css { selector: "main".into() }
            );
        }
    }

    mod role_tests {
        use super::*;

        #[test]
        fn test_parse_roundtrip() {
            for role in [AriaRole::Button, AriaRole::Radio, AriaRole::Heading] {
                assert_eq!(AriaRole::parse(role.as_str()), Some(role));
            }
            assert_eq!(AriaRole::parse("searchbox"), Some(AriaRole::Textbox));
            assert_eq!(AriaRole::parse("banner"), None);
        }
    }

    mod resolution_tests {
        use super::*;

        fn add_to_cart_chain() -> LocatorChain {
            LocatorChain::new(
                "add to cart",
                vec![
                    Locator::role_named(AriaRole::Button, TextMatch::pattern("add to cart")),
                    Locator::css("button._2KpZ6l._2U9uOA._3v1-ww"),
                ],
            )
            .with_timeout(Duration::from_millis(500))
        }

        #[tokio::test(start_paused = true)]
        async fn test_first_visible_candidate_wins() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/x");
            page.append(None, MockElement::new("button").class("_2KpZ6l _2U9uOA _3v1-ww").text("ADD"));
            page.append(None, MockElement::new("button").text("Add to cart"));

            let hit = resolve(page.as_ref(), &add_to_cart_chain()).await.unwrap();
            assert_eq!(hit.index, 0);
            assert_eq!(hit.nth, 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_clone_is_skipped() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/x");
            page.append(None, MockElement::new("button").text("Add to cart").hidden());
            page.append(None, MockElement::new("button").class("_2KpZ6l _2U9uOA _3v1-ww"));

            let hit = resolve(page.as_ref(), &add_to_cart_chain()).await.unwrap();
            assert_eq!(hit.index, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_nth_points_at_first_visible_match() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/x");
            page.append(None, MockElement::new("button").text("Add to cart").hidden());
            page.append(None, MockElement::new("button").text("Add to cart"));

            let hit = resolve(page.as_ref(), &add_to_cart_chain()).await.unwrap();
            assert_eq!((hit.index, hit.nth, hit.count), (0, 1, 2));
        }

        #[tokio::test(start_paused = true)]
        async fn test_exhaustion_is_none() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/");
            let started = Instant::now();
            assert!(resolve(page.as_ref(), &add_to_cart_chain()).await.is_none());
            assert!(started.elapsed() >= Duration::from_millis(500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_late_element_is_found_by_polling() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/x");
            page.schedule(Duration::from_millis(200), |dom| {
                dom.append(None, MockElement::new("button").text("Add to cart"));
            });

            let hit = resolve(page.as_ref(), &add_to_cart_chain()).await;
            assert_eq!(hit.map(|h| h.index), Some(0));
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolution_is_idempotent() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/p/x");
            page.append(None, MockElement::new("button").class("_2KpZ6l _2U9uOA _3v1-ww"));
            page.append(None, MockElement::new("button").text("Add to cart"));

            let chain = add_to_cart_chain();
            let first = resolve(page.as_ref(), &chain).await;
            let second = resolve(page.as_ref(), &chain).await;
            assert_eq!(first, second);
        }

        #[tokio::test(start_paused = true)]
        async fn test_wait_hidden() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/");
            let modal = page.append(None, MockElement::new("div").class("_2MlkI1"));
            page.schedule(Duration::from_millis(300), move |dom| dom.set_visible(modal, false));

            let loc = Locator::css("div._2MlkI1");
            assert!(is_visible(page.as_ref(), &loc).await);
            assert!(wait_hidden(page.as_ref(), &loc, Duration::from_secs(1)).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_counts_and_texts() {
            let browser = MockBrowser::new();
            let page = browser.open_page("https://shop.test/viewcart");
            page.append(None, MockElement::new("a").class("item").text("Phone A"));
            page.append(None, MockElement::new("a").class("item").text("Phone B").hidden());

            let loc = Locator::css("a.item");
            assert_eq!(count(page.as_ref(), &loc).await, 2);
            assert_eq!(count_visible(page.as_ref(), &loc).await, 1);
            assert_eq!(text_of(page.as_ref(), &loc, 1).await.as_deref(), Some("Phone B"));
            assert_eq!(visible_texts(page.as_ref(), &loc).await, vec!["Phone A".to_string()]);
        }
    }
}
