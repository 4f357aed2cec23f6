//! Price extraction from loosely formatted storefront text.
//!
//! Storefront prices arrive as `₹1,23,456`, `Rs. 1 999`, `INR 12 499`
//! with non-breaking (U+00A0) or narrow non-breaking (U+202F) spaces, as
//! JSON-LD `offers`, or only as bare digits somewhere in the page body. The
//! extractor tries each source in a fixed order and stops at the first
//! usable amount:
//!
//! 1. currency-marked run in the primary price text (then an unmarked run,
//!    then the largest plausible 3-6 digit run)
//! 2. structured data, first present `price` in nested objects and lists
//! 3. body text scan, first run inside [`PriceBounds`]
//!
//! Exhaustion yields [`Price::NotAvailable`], never zero.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Lower plausibility bound for bare digit scans
pub const DEFAULT_MIN_PLAUSIBLE_PRICE: u64 = 100;
/// Upper plausibility bound for bare digit scans
pub const DEFAULT_MAX_PLAUSIBLE_PRICE: u64 = 200_000;
/// Maximum number of body elements examined by the DOM scan
pub const MAX_DOM_SCAN_ELEMENTS: usize = 3000;

const MARKED_RUN: &str =
    r"(?:₹|Rs\.?|INR)[\s\x{00A0}\x{202F}]*(\d{1,3}(?:[,. \x{00A0}\x{202F}]\d{2,3})+|\d+)";
const UNMARKED_RUN: &str = r"(\d{1,3}(?:[,. \x{00A0}\x{202F}]\d{2,3})+|\d{2,})";
const SEPARATORS: &str = r"[\x{00A0}\x{202F}\s,.]";
const TRAILING_FRACTION: &str = r"\.\d{1,2}$";
const STRUCTURED_NOISE: &str = r"[\x{00A0}\x{202F},₹\s]";
const DIGIT_RUN: &str = r"[0-9]{3,6}";
const TILE_PRICE: &str = r"₹\s*([0-9,]+)";

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn marked_run() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, MARKED_RUN)
}

fn unmarked_run() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, UNMARKED_RUN)
}

fn separators() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, SEPARATORS)
}

fn trailing_fraction() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, TRAILING_FRACTION)
}

fn structured_noise() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, STRUCTURED_NOISE)
}

fn digit_run() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, DIGIT_RUN)
}

fn tile_price() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, TILE_PRICE)
}

/// Inclusive range of amounts accepted from bare digit scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBounds {
    /// Smallest plausible amount
    pub min: u64,
    /// Largest plausible amount
    pub max: u64,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PLAUSIBLE_PRICE,
            max: DEFAULT_MAX_PLAUSIBLE_PRICE,
        }
    }
}

impl PriceBounds {
    /// Create bounds
    #[must_use]
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Whether `amount` is inside the bounds
    #[must_use]
    pub const fn contains(&self, amount: u64) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// An extracted price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Price {
    /// Whole currency units, always > 0
    Amount(u64),
    /// Every extraction strategy failed
    NotAvailable,
}

impl Price {
    /// Amount if available
    #[must_use]
    pub const fn amount(&self) -> Option<u64> {
        match self {
            Self::Amount(v) => Some(*v),
            Self::NotAvailable => None,
        }
    }

    /// Whether an amount was found
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Amount(_))
    }

    fn from_positive(value: u64) -> Self {
        if value > 0 {
            Self::Amount(value)
        } else {
            Self::NotAvailable
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(v) => write!(f, "₹{v}"),
            Self::NotAvailable => write!(f, "not available"),
        }
    }
}

/// Which source produced a price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Currency or digit run in the primary price text
    PrimaryText,
    /// JSON-LD structured data
    StructuredData,
    /// Body text scan
    DomScan,
}

/// Multi-source price extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceExtractor {
    bounds: PriceBounds,
}

impl PriceExtractor {
    /// Create an extractor with the given plausibility bounds
    #[must_use]
    pub const fn new(bounds: PriceBounds) -> Self {
        Self { bounds }
    }

    /// Plausibility bounds in use
    #[must_use]
    pub const fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    /// Parse the primary price text
    #[must_use]
    pub fn from_text(&self, text: &str) -> Price {
        let captured = marked_run()
            .and_then(|re| re.captures(text))
            .or_else(|| unmarked_run().and_then(|re| re.captures(text)))
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_grouped(m.as_str()));

        match captured {
            Some(value) if value > 0 => Price::Amount(value),
            _ => self.largest_plausible_run(text),
        }
    }

    /// Largest 3-6 digit run inside the bounds
    #[must_use]
    pub fn largest_plausible_run(&self, text: &str) -> Price {
        digit_run()
            .map(|re| {
                re.find_iter(text)
                    .filter_map(|m| m.as_str().parse::<u64>().ok())
                    .filter(|v| self.bounds.contains(*v))
                    .max()
            })
            .flatten()
            .map_or(Price::NotAvailable, Price::from_positive)
    }

    /// Scan raw JSON-LD blocks for the first present price
    ///
    /// Unparseable blocks are skipped.
    #[must_use]
    pub fn from_structured_data<S: AsRef<str>>(&self, blocks: &[S]) -> Price {
        for block in blocks {
            let Ok(value) = serde_json::from_str::<Value>(block.as_ref()) else {
                continue;
            };
            if let Some(price) = find_price(&value).and_then(structured_amount) {
                return Price::Amount(price);
            }
        }
        Price::NotAvailable
    }

    /// First in-bounds run among body texts, examining at most
    /// [`MAX_DOM_SCAN_ELEMENTS`] entries
    #[must_use]
    pub fn from_dom_texts<S: AsRef<str>>(&self, texts: &[S]) -> Price {
        texts
            .iter()
            .take(MAX_DOM_SCAN_ELEMENTS)
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .find_map(|t| {
                let caps = marked_run()
                    .and_then(|re| re.captures(t))
                    .or_else(|| unmarked_run().and_then(|re| re.captures(t)))?;
                let value = parse_grouped(caps.get(1)?.as_str())?;
                self.bounds.contains(value).then_some(value)
            })
            .map_or(Price::NotAvailable, Price::Amount)
    }

    /// Run all strategies in order against already collected inputs
    #[must_use]
    pub fn extract<S: AsRef<str>, T: AsRef<str>>(
        &self,
        primary_text: &str,
        structured: &[S],
        dom_texts: &[T],
    ) -> (Price, Option<PriceSource>) {
        let price = self.from_text(primary_text);
        if price.is_available() {
            return (price, Some(PriceSource::PrimaryText));
        }
        let price = self.from_structured_data(structured);
        if price.is_available() {
            return (price, Some(PriceSource::StructuredData));
        }
        let price = self.from_dom_texts(dom_texts);
        if price.is_available() {
            return (price, Some(PriceSource::DomScan));
        }
        (Price::NotAvailable, None)
    }
}

/// Strip every separator and parse the remaining digits
///
/// A trailing `.d` or `.dd` is a fraction, not a thousands group, and rounds
/// the same way structured prices do.
fn parse_grouped(run: &str) -> Option<u64> {
    let (whole, fraction) = match trailing_fraction().and_then(|re| re.find(run)) {
        Some(m) => (&run[..m.start()], Some(m.as_str())),
        None => (run, None),
    };
    let cleaned = separators().map_or_else(
        || whole.to_string(),
        |re| re.replace_all(whole, "").into_owned(),
    );
    let value: u64 = cleaned.parse().ok()?;
    let round_up = fraction
        .and_then(|f| format!("0{f}").parse::<f64>().ok())
        .is_some_and(|f| f >= 0.5);
    Some(value + u64::from(round_up))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// First present `price`, checking an object's own field, then its
/// `offers`, then any nested value
fn find_price(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if let Some(price) = map.get("price").filter(|p| is_present(p)) {
                return Some(price);
            }
            if let Some(found) = map.get("offers").and_then(find_price) {
                return Some(found);
            }
            map.iter()
                .filter(|(key, _)| key.as_str() != "offers")
                .find_map(|(_, nested)| find_price(nested))
        }
        Value::Array(items) => items.iter().find_map(find_price),
        _ => None,
    }
}

fn structured_amount(value: &Value) -> Option<u64> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let cleaned = structured_noise().map_or_else(
        || raw.clone(),
        |re| re.replace_all(&raw, "").into_owned(),
    );
    let parsed: f64 = cleaned.parse().ok()?;
    (parsed.is_finite() && parsed > 0.0).then(|| parsed.round() as u64)
}

/// Price shown on a search-result tile (`₹` followed by digits and commas)
#[must_use]
pub fn parse_tile_price(text: &str) -> Option<u64> {
    let caps = tile_price()?.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// All ASCII digits in `text` as one number, e.g. a cart badge count
#[must_use]
pub fn digits_only(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn extractor() -> PriceExtractor {
        PriceExtractor::default()
    }

    mod primary_text_tests {
        use super::*;

        #[test]
        fn test_rupee_with_commas() {
            assert_eq!(extractor().from_text("₹1,999"), Price::Amount(1999));
        }

        #[test]
        fn test_indian_grouping() {
            assert_eq!(extractor().from_text("₹1,23,456"), Price::Amount(123_456));
        }

        #[test]
        fn test_rs_and_inr_prefixes() {
            assert_eq!(extractor().from_text("Rs. 12,499"), Price::Amount(12_499));
            assert_eq!(extractor().from_text("Rs 499"), Price::Amount(499));
            assert_eq!(extractor().from_text("INR 15 999"), Price::Amount(15_999));
        }

        #[test]
        fn test_marked_run_preferred_over_earlier_numbers() {
            let text = "4.5 (1,234 ratings) Special price ₹12,499";
            assert_eq!(extractor().from_text(text), Price::Amount(12_499));
        }

        #[test]
        fn test_unmarked_run_when_marker_missing() {
            assert_eq!(extractor().from_text("24,999"), Price::Amount(24_999));
        }

        #[test]
        fn test_trailing_rating_not_merged() {
            assert_eq!(extractor().from_text("₹1,999 4.3"), Price::Amount(1999));
        }

        #[test]
        fn test_no_digits_is_not_available() {
            assert_eq!(extractor().from_text("Price: Not Available"), Price::NotAvailable);
            assert_eq!(extractor().from_text(""), Price::NotAvailable);
        }

        #[test]
        fn test_zero_is_not_available() {
            assert_eq!(extractor().from_text("₹0"), Price::NotAvailable);
        }

        #[test]
        fn test_largest_plausible_run() {
            let ex = extractor();
            assert_eq!(ex.largest_plausible_run("id 9 code 350 alt 12000"), Price::Amount(12_000));
            assert_eq!(ex.largest_plausible_run("99 and 42"), Price::NotAvailable);
        }
    }

    mod structured_data_tests {
        use super::*;

        #[test]
        fn test_top_level_price() {
            let blocks = [r#"{"@type":"Product","price":"1,299"}"#];
            assert_eq!(extractor().from_structured_data(&blocks), Price::Amount(1299));
        }

        #[test]
        fn test_offers_object() {
            let blocks = [r#"{"@type":"Product","offers":{"price":15999.0,"priceCurrency":"INR"}}"#];
            assert_eq!(extractor().from_structured_data(&blocks), Price::Amount(15_999));
        }

        #[test]
        fn test_offers_array_takes_first_present() {
            let blocks = [r#"{"offers":[{"price":null},{"price":"₹ 2,499.60"},{"price":10}]}"#];
            assert_eq!(extractor().from_structured_data(&blocks), Price::Amount(2500));
        }

        #[test]
        fn test_top_level_array_and_nested_graph() {
            let blocks = [r#"[{"@type":"BreadcrumbList"},{"@graph":[{"offers":{"price":"899"}}]}]"#];
            assert_eq!(extractor().from_structured_data(&blocks), Price::Amount(899));
        }

        #[test]
        fn test_invalid_blocks_skipped() {
            let blocks = ["not json", r#"{"name":"no price"}"#, r#"{"price":"450"}"#];
            assert_eq!(extractor().from_structured_data(&blocks), Price::Amount(450));
        }

        #[test]
        fn test_zero_price_falls_through() {
            let blocks = [r#"{"price":0}"#];
            assert_eq!(extractor().from_structured_data(&blocks), Price::NotAvailable);
        }
    }

    mod dom_scan_tests {
        use super::*;

        #[test]
        fn test_first_in_bounds_wins() {
            let texts = ["Call 18002089898", "4.4", "12", "₹7,999", "₹8,999"];
            assert_eq!(extractor().from_dom_texts(&texts), Price::Amount(7999));
        }

        #[test]
        fn test_bounds_are_configurable() {
            let ex = PriceExtractor::new(PriceBounds::new(10, 50));
            assert_eq!(ex.from_dom_texts(&["₹7,999", "₹45"]), Price::Amount(45));
        }

        #[test]
        fn test_scan_limit() {
            let mut texts = vec!["nothing".to_string(); MAX_DOM_SCAN_ELEMENTS];
            texts.push("₹999".to_string());
            assert_eq!(extractor().from_dom_texts(&texts), Price::NotAvailable);
        }
    }

    mod fold_tests {
        use super::*;

        const NONE: [&str; 0] = [];

        #[test]
        fn test_order_short_circuits() {
            let (price, source) =
                extractor().extract("₹1,499", &[r#"{"price":"999"}"#], &["₹555"]);
            assert_eq!(price, Price::Amount(1499));
            assert_eq!(source, Some(PriceSource::PrimaryText));
        }

        #[test]
        fn test_structured_when_text_empty() {
            let (price, source) = extractor().extract("", &[r#"{"price":"999"}"#], &["₹555"]);
            assert_eq!(price, Price::Amount(999));
            assert_eq!(source, Some(PriceSource::StructuredData));
        }

        #[test]
        fn test_dom_scan_last() {
            let (price, source) = extractor().extract("", &NONE, &["Buy now", "₹555"]);
            assert_eq!(price, Price::Amount(555));
            assert_eq!(source, Some(PriceSource::DomScan));
        }

        #[test]
        fn test_all_exhausted_is_not_available() {
            let (price, source) = extractor().extract("Coming soon", &NONE, &["Notify me"]);
            assert_eq!(price, Price::NotAvailable);
            assert!(source.is_none());
            assert_ne!(price.amount(), Some(0));
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn test_tile_price() {
            assert_eq!(parse_tile_price("Galaxy M14\n₹13,490\n₹17,990"), Some(13_490));
            assert_eq!(parse_tile_price("Currently unavailable"), None);
        }

        #[test]
        fn test_digits_only() {
            assert_eq!(digits_only("Cart (2)"), Some(2));
            assert_eq!(digits_only("empty"), None);
        }

        #[test]
        fn test_price_display() {
            assert_eq!(Price::Amount(1999).to_string(), "₹1999");
            assert_eq!(Price::NotAvailable.to_string(), "not available");
        }
    }

    mod fraction_tests {
        use super::*;

        #[test]
        fn test_paise_are_not_thousands() {
            assert_eq!(extractor().from_text("₹1,999.00"), Price::Amount(1999));
            assert_eq!(extractor().from_text("Rs. 74,999.50 only"), Price::Amount(75_000));
            assert_eq!(extractor().from_text("₹1.234.567"), Price::Amount(1_234_567));
        }
    }

    proptest! {
        #[test]
        fn prop_decimal_fraction_is_rounded_off(amount in 100u64..10_000_000, paise in 0u64..100) {
            let digits = amount.to_string();
            let mut grouped = String::new();
            for (i, ch) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push(',');
                }
                grouped.push(ch);
            }
            let expected = amount + u64::from(paise >= 50);
            prop_assert_eq!(extractor().from_text(&format!("₹{grouped}.{paise:02}")), Price::Amount(expected));
        }

        #[test]
        fn prop_separator_variants_round_trip(sep in prop::sample::select(vec![",", "\u{00A0}", "\u{202F}", " "])) {
            let text = format!("₹1{sep}234{sep}567");
            prop_assert_eq!(extractor().from_text(&text), Price::Amount(1_234_567));
        }

        #[test]
        fn prop_grouped_amounts_parse(amount in 100u64..10_000_000) {
            let digits = amount.to_string();
            let mut grouped = String::new();
            for (i, ch) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push('\u{202F}');
                }
                grouped.push(ch);
            }
            prop_assert_eq!(extractor().from_text(&format!("₹{grouped}")), Price::Amount(amount));
        }

        #[test]
        fn prop_letters_only_never_available(text in "[a-zA-Z :]{0,40}") {
            let (price, _) = extractor().extract(&text, &[text.as_str()], &[text.as_str()]);
            prop_assert_eq!(price, Price::NotAvailable);
        }
    }
}
