//! Locator chains for the storefront pages.
//!
//! Every chain lists the most semantic query first (role, label, visible
//! text) and the generated class names last. The class names change whenever
//! the site ships a new build.
//!
//! **Update process**: when a scenario starts failing on resolution, capture
//! the page, add the new query to the end of the affected chain, and keep the
//! old one until it is confirmed dead.

use crate::locator::{AriaRole, Locator, LocatorChain, TextMatch};
use std::time::Duration;

fn pattern(source: &str) -> TextMatch {
    TextMatch::pattern(source)
}

/// URL patterns matched against `page.url()`
pub mod urls {
    /// Search results page
    pub const SEARCH_RESULTS: &str = r"/search(\?|$)";
    /// Results sorted ascending by price
    pub const SORTED_PRICE_ASC: &str = r"[?&]sort=price_asc\b";
    /// Product detail page
    pub const PRODUCT: &str = r"/p/";
    /// Cart page
    pub const CART: &str = r"/viewcart(\?|$)";
    /// Checkout or the login gate in front of it
    pub const CHECKOUT_OR_LOGIN: &str = r"/(checkout|account/login)";
    /// Login route
    pub const LOGIN: &str = r"(?i)account/login";
}

/// Site paths navigated to directly
pub mod paths {
    /// Home
    pub const HOME: &str = "/";
    /// Results; takes a `q` query parameter
    pub const SEARCH: &str = "/search";
    /// Cart
    pub const CART: &str = "/viewcart";
    /// OTP login form
    pub const LOGIN: &str = "/account/login?ret=/";
}

/// Home page and global header
pub mod home {
    use super::*;

    /// Close button of the login modal shown on first visit
    pub fn close_login_modal() -> LocatorChain {
        LocatorChain::new(
            "close login modal",
            vec![
                Locator::css("button._30XB9F"),
                Locator::css("button").with_text(TextMatch::contains("✕")),
            ],
        )
    }

    /// The login modal itself
    pub fn login_modal() -> Locator {
        Locator::css("div._2MlkI1")
    }

    /// Header search box
    pub fn search_input() -> LocatorChain {
        LocatorChain::new(
            "search input",
            vec![
                Locator::role_named(
                    AriaRole::Textbox,
                    pattern("Search for products, brands and more"),
                ),
                Locator::css(r#"input[name="q"]"#),
            ],
        )
        .with_timeout(Duration::from_secs(3))
    }

    /// Queue page shown under heavy load
    pub fn surge_gate() -> Locator {
        Locator::text(pattern("Lot of rush|finding the best way"))
    }

    /// Header login link
    pub fn login_link() -> LocatorChain {
        LocatorChain::new(
            "header login link",
            vec![
                Locator::role_named(AriaRole::Link, pattern("^Login$")),
                Locator::text(pattern("^Login$")),
            ],
        )
    }
}

/// Search results page
pub mod search {
    use super::*;

    /// Stable signal that results rendered
    pub fn results_ready() -> Locator {
        Locator::text(TextMatch::exact("Sort By"))
    }

    /// The "Sort By" strip container
    pub fn sort_strip() -> Locator {
        Locator::css("div").with_text(TextMatch::contains("Sort By"))
    }

    /// "Price -- Low to High" option inside the sort strip
    pub fn sort_low_to_high() -> LocatorChain {
        LocatorChain::single(
            "sort low to high",
            Locator::text(TextMatch::exact("Price -- Low to High")).within(sort_strip()),
        )
        .with_timeout(Duration::from_secs(10))
    }

    /// Every link to a product detail page
    pub fn all_product_cards() -> Locator {
        Locator::css(r#"a[href*="/p/"]"#)
    }

    /// Product links that show a price and are in stock
    pub fn product_cards() -> Locator {
        all_product_cards()
            .with_text(pattern(r"₹\s*[\d,]+"))
            .without_text(pattern(r"Currently unavailable|Price:\s*Not Available"))
    }

    /// "Price" filter section toggle
    pub fn price_filter_toggle() -> Locator {
        Locator::text(TextMatch::contains("Price"))
    }

    /// Min price dropdown
    pub fn min_price_select() -> Locator {
        Locator::css("select").has(Locator::css("option").with_text(TextMatch::exact("Min")))
    }

    /// Max price dropdown
    pub fn max_price_select() -> Locator {
        Locator::css("select").has(Locator::css("option").with_text(TextMatch::exact("Max")))
    }

    /// Brand checkbox in the filter sidebar
    pub fn brand_checkbox(brand: &str) -> Locator {
        Locator::role_named(AriaRole::Checkbox, pattern(&regex::escape(brand)))
    }
}

/// Product detail page
pub mod product {
    use super::*;

    /// Product title
    pub fn title() -> LocatorChain {
        LocatorChain::new(
            "product title",
            vec![
                Locator::css("span.B_NuCI"),
                Locator::heading(1),
                Locator::role(AriaRole::Heading),
            ],
        )
        .with_timeout(Duration::from_secs(10))
    }

    /// OpenGraph title meta tag
    pub fn og_title() -> Locator {
        Locator::css(r#"meta[property="og:title"]"#)
    }

    /// Any visible price-like element
    pub fn price_hint() -> LocatorChain {
        LocatorChain::new(
            "price hint",
            vec![
                Locator::css("div._30jeq3._16Jk6d"),
                Locator::text(pattern(r"₹\s*[\d,]+")),
            ],
        )
        .with_timeout(Duration::from_secs(10))
    }

    /// Main price block, old and new class names
    pub fn price_block() -> LocatorChain {
        LocatorChain::new(
            "price block",
            vec![
                Locator::css("div._30jeq3._16Jk6d"),
                Locator::css(".Nx9bqj"),
                Locator::css(r#"div[class*="jeq3"], div[class*="Jk6d"]"#),
            ],
        )
        .with_timeout(Duration::from_secs(12))
    }

    /// Secondary places to read price text from, in order
    pub fn price_text_fallbacks() -> Vec<Locator> {
        vec![
            Locator::css(
                r#".Nx9bqj, [data-test-id="pdp-price"], [data-testid="pdp-price"], div[class*="jeq3"], div[class*="Jk6d"]"#,
            ),
            Locator::text(pattern(
                r"(?:₹|Rs\.?|INR)[\s\x{00A0}\x{202F}]*[\d,.\x{00A0}\x{202F}]+",
            )),
        ]
    }

    /// Icon-only add-to-cart control
    pub fn icon_add_to_cart() -> Locator {
        Locator::css(r#"button, a, [role="button"]"#).has(Locator::css("svg.KRzcNw"))
    }

    /// Add to cart control
    pub fn add_to_cart() -> LocatorChain {
        LocatorChain::new(
            "add to cart",
            vec![
                Locator::role_named(AriaRole::Button, pattern("Add to cart")),
                Locator::css("button._2KpZ6l._2U9uOA._3v1-ww"),
                icon_add_to_cart(),
            ],
        )
        .with_timeout(Duration::from_secs(15))
    }

    /// "Go to cart" link shown after adding
    pub fn go_to_cart() -> LocatorChain {
        LocatorChain::new(
            "go to cart",
            vec![
                Locator::role_named(AriaRole::Link, pattern("Go to cart")),
                Locator::css("a._3SkBxJ"),
            ],
        )
    }

    /// Confirmation toast
    pub fn added_toast() -> LocatorChain {
        LocatorChain::single(
            "added to cart toast",
            Locator::text(pattern("added to cart|cart has 1 item")),
        )
    }

    /// Controls that pick a variant, tried in order while add-to-cart is disabled
    pub fn variant_controls() -> Vec<Locator> {
        vec![
            Locator::css(r#"[role=radio]:not([aria-disabled="true"])"#),
            Locator::css(r#"[role=option]:not([aria-disabled="true"])"#),
            Locator::css(r#"button[aria-pressed="false"], [role="button"][aria-pressed="false"]"#),
            Locator::role_named(AriaRole::Button, pattern("(GB|RAM|Storage|Colour|Color)")),
        ]
    }

    /// Signals that the cart page rendered its contents
    pub fn cart_ready() -> Vec<LocatorChain> {
        vec![
            LocatorChain::single("remove button", Locator::role_named(AriaRole::Button, pattern("^remove$"))),
            LocatorChain::single("remove control", Locator::css("div._3dsJAO")),
            LocatorChain::single("place order", Locator::role_named(AriaRole::Button, pattern("place order"))),
            LocatorChain::single("cart product link", Locator::css(r#"main a[href*="/p/"]"#)),
        ]
    }
}

/// Cart page
pub mod cart {
    use super::*;

    /// Cart line items, counted by their product links
    pub fn items() -> Locator {
        Locator::css(r#"a.T2CNXf.QqLTQ-, a[href*="/p/"]"#)
    }

    /// Product link of the first item
    pub fn product_link() -> LocatorChain {
        LocatorChain::new(
            "cart product link",
            vec![Locator::css("a.T2CNXf.QqLTQ-"), Locator::css(r#"a[href*="/p/"]"#)],
        )
    }

    /// Remove control of a line item
    pub fn remove_button() -> LocatorChain {
        LocatorChain::new(
            "remove item",
            vec![
                Locator::css("div.sBxzFz"),
                Locator::role_named(AriaRole::Button, pattern("^remove$")),
                Locator::css("div._3dsJAO"),
                Locator::text(pattern("^Remove$")),
            ],
        )
    }

    /// Confirm button of the removal dialog
    ///
    /// Scoped to the dialog: the line items carry Remove buttons of their own.
    pub fn confirm_remove() -> LocatorChain {
        let dialog = Locator::role(AriaRole::Dialog);
        LocatorChain::new(
            "confirm remove",
            vec![
                Locator::role_named(AriaRole::Button, pattern("remove")).within(dialog.clone()),
                Locator::text(pattern("^Remove$")).within(dialog),
                Locator::css("div._3dsJAO._24d-qY"),
            ],
        )
        .with_timeout(Duration::from_secs(2))
    }

    /// Place order button
    pub fn place_order() -> LocatorChain {
        LocatorChain::new(
            "place order",
            vec![
                Locator::role_named(AriaRole::Button, pattern("place order")),
                Locator::css("button._2KpZ6l._2ObVJD._3AWRsL"),
            ],
        )
    }

    /// Login link shown to anonymous users
    pub fn login_link() -> LocatorChain {
        LocatorChain::single("cart login link", Locator::role_named(AriaRole::Link, pattern("^login$")))
    }

    /// Empty-cart or missing-items banner text
    pub fn gate_text() -> LocatorChain {
        LocatorChain::single(
            "cart gate text",
            Locator::text(pattern("Your cart is empty|Missing Cart items")),
        )
    }

    /// Explicit empty-state marker
    pub fn empty_marker() -> Locator {
        Locator::css("div.s2gOFd").with_text(TextMatch::contains("Missing Cart items?"))
    }

    /// Signals that checkout is asking for login or an address
    pub fn checkout_gate() -> Vec<LocatorChain> {
        vec![
            LocatorChain::single(
                "login heading",
                Locator::role_named(AriaRole::Heading, pattern("login|sign in|enter mobile")),
            ),
            LocatorChain::single("mobile or email label", Locator::label(pattern("mobile|email"))),
            LocatorChain::single("continue button", Locator::role_named(AriaRole::Button, pattern("^continue$"))),
            LocatorChain::single("address header", Locator::text(pattern("Delivery Address|Address|Deliver to"))),
        ]
    }
}

/// OTP login form
pub mod login {
    use super::*;

    fn request_otp_role() -> Locator {
        Locator::role_named(AriaRole::Button, pattern("request otp"))
    }

    /// The container holding the Request OTP button
    pub fn form() -> Locator {
        Locator::css("form, div").has(request_otp_role())
    }

    /// Form visibility signal
    pub fn form_chain() -> LocatorChain {
        LocatorChain::new(
            "otp form",
            vec![Locator::css("form").has(request_otp_role()), form()],
        )
        .with_timeout(Duration::from_secs(15))
    }

    /// Email or mobile input, scoped to the form
    pub fn identifier_input() -> LocatorChain {
        LocatorChain::new(
            "login identifier input",
            vec![
                Locator::label(pattern("(Enter )?(Email|Mobile)( number)?")).within(form()),
                Locator::placeholder(pattern(r"Enter Email/Mobile number")).within(form()),
                Locator::css("input._2IX_2-").within(form()),
                Locator::css(r#"input[type="tel"], input[type="email"], input[type="text"]"#)
                    .within(form()),
                Locator::role(AriaRole::Textbox).within(form()),
            ],
        )
        .with_timeout(Duration::from_secs(15))
    }

    /// Request OTP button
    pub fn request_otp() -> LocatorChain {
        LocatorChain::new(
            "request otp",
            vec![request_otp_role(), Locator::text(pattern("Request OTP"))],
        )
    }

    /// OTP boxes (one or several), scoped to the form
    pub fn otp_inputs() -> Locator {
        Locator::css(
            r#"input[autocomplete="one-time-code"], input[name*="otp" i], input[aria-label*="otp" i], input[type="tel"]"#,
        )
        .within(form())
    }

    /// Identifier validation message
    pub fn validation_error() -> Locator {
        Locator::text(pattern(r"Please enter valid Email ID/Mobile number"))
    }

    /// Any login error message
    pub fn error_message() -> LocatorChain {
        LocatorChain::new(
            "login error",
            vec![
                Locator::text(pattern(
                    r"Please enter valid Email ID/Mobile number|invalid otp|wrong otp|unable to verify|try again|incorrect",
                )),
                Locator::css(r#"span._2YULOR, div._2sKwjB, div[role="alert"]"#),
            ],
        )
    }

    /// Verify button
    pub fn verify_button() -> LocatorChain {
        LocatorChain::new(
            "verify",
            vec![
                Locator::role_named(AriaRole::Button, pattern("verify")),
                Locator::text(pattern("Verify")),
            ],
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::wait::UrlPattern;

    #[test]
    fn test_url_patterns() {
        assert!(UrlPattern::new(urls::SEARCH_RESULTS).matches("https://shop.test/search?q=phone"));
        assert!(UrlPattern::new(urls::SORTED_PRICE_ASC).matches("https://shop.test/search?q=phone&sort=price_asc"));
        assert!(!UrlPattern::new(urls::SORTED_PRICE_ASC).matches("https://shop.test/search?sort=price_ascending"));
        assert!(UrlPattern::new(urls::CART).matches("https://shop.test/viewcart?otracker=x"));
        assert!(UrlPattern::new(urls::CHECKOUT_OR_LOGIN).matches("https://shop.test/account/login?ret=/"));
        assert!(UrlPattern::new(urls::LOGIN).matches("https://shop.test/Account/Login"));
    }

    #[test]
    fn test_chains_prefer_semantic_queries() {
        use crate::locator::Query;
        for chain in [product::add_to_cart(), cart::place_order(), login::request_otp()] {
            assert!(matches!(chain.candidates[0].query, Query::Role { .. }), "{}", chain.name);
        }
    }

    #[test]
    fn test_confirm_remove_stays_inside_dialog() {
        let chain = cart::confirm_remove();
        for candidate in chain.candidates.iter().filter(|c| !matches!(c.query, crate::locator::Query::Css { .. })) {
            assert_eq!(candidate.within.as_deref(), Some(&Locator::role(AriaRole::Dialog)));
        }
    }

    #[test]
    fn test_brand_checkbox_escapes_input() {
        let loc = search::brand_checkbox("A+B (Pro)");
        let json = loc.to_json();
        assert_eq!(json["query"]["name"]["value"], r"A\+B \(Pro\)");
    }
}
