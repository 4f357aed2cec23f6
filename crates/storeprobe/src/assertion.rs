//! Assertions that tolerate a live, eventually-consistent storefront.

mod retry;
mod soft;

pub use retry::{
    poll_until, retry, PollConfig, Polled, RetryConfig, DEFAULT_ATTEMPTS,
    DEFAULT_POLL_INTERVALS_MS, DEFAULT_RETRY_DELAY_MS,
};
pub use soft::{
    soft_expect_visible, AssertionFailure, AssertionSummary, SoftAssertions,
    SOFT_EXPECT_TIMEOUT_MS,
};
