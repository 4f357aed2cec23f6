//! Retrying async operations and polling assertions.
//!
//! Two shapes of "try again":
//!
//! - [`retry`] re-runs a fallible operation a fixed number of times with a
//!   fixed delay, returning the last error if every attempt fails.
//! - [`poll_until`] samples a value on an interval ladder
//!   (250, 500, 750, 1000 ms, then 1000 ms repeatedly) until a predicate
//!   accepts it or the budget runs out.
//!
//! Both run on the tokio clock so paused-time tests finish instantly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Default attempts for [`retry`]
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
/// Default polling ladder, in milliseconds
pub const DEFAULT_POLL_INTERVALS_MS: [u64; 4] = [250, 500, 750, 1000];

/// Configuration for [`retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, at least one is always made
    pub attempts: u32,
    /// Pause between a failure and the next attempt
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryConfig {
    /// Set the attempt count
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the delay
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Run `op` until it succeeds or the attempts are used up
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry<T, E, F, Fut>(config: RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let attempts = config.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::debug!(attempt, attempts, error = %e, "attempt failed; retrying");
                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Budget and interval ladder for [`poll_until`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Total budget
    pub timeout: Duration,
    /// Pauses between samples; the last one repeats
    pub intervals: Vec<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl PollConfig {
    /// Default ladder with the given budget
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            intervals: DEFAULT_POLL_INTERVALS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }

    /// Replace the ladder
    #[must_use]
    pub fn with_intervals(mut self, intervals: Vec<Duration>) -> Self {
        self.intervals = intervals;
        self
    }

    /// Pause after the `n`th sample (zero-based)
    #[must_use]
    pub fn interval(&self, n: usize) -> Duration {
        self.intervals
            .get(n)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }
}

/// Outcome of [`poll_until`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    /// Last sampled value
    pub value: T,
    /// Whether the predicate accepted it
    pub satisfied: bool,
    /// Samples taken
    pub samples: usize,
    /// Time spent polling
    pub elapsed: Duration,
}

/// Sample `probe` until `accept` holds or the budget runs out
///
/// Always takes at least one sample. The returned value is the last one
/// sampled, accepted or not.
pub async fn poll_until<T, F, Fut, P>(config: &PollConfig, mut probe: F, accept: P) -> Polled<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut samples = 0;
    loop {
        let value = probe().await;
        samples += 1;
        let satisfied = accept(&value);
        let now = Instant::now();
        if satisfied || now >= deadline {
            return Polled {
                value,
                satisfied,
                samples,
                elapsed: now - start,
            };
        }
        tokio::time::sleep(config.interval(samples - 1).min(deadline - now)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    mod retry_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_succeeds_after_failures() {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);
            let start = Instant::now();
            let result: Result<u32, String> = retry(RetryConfig::default(), || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("flaky {n}"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
            assert_eq!(result.unwrap(), 3);
            assert_eq!(start.elapsed(), Duration::from_millis(1000));
        }

        #[tokio::test(start_paused = true)]
        async fn test_returns_last_error() {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);
            let result: Result<(), String> = retry(RetryConfig::default().with_attempts(2), || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("attempt {n}")) }
            })
            .await;
            assert_eq!(result.unwrap_err(), "attempt 2");
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_zero_attempts_still_runs_once() {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);
            let _: Result<(), String> = retry(RetryConfig::default().with_attempts(0), || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("no".to_string()) }
            })
            .await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    mod poll_tests {
        use super::*;

        #[test]
        fn test_ladder_repeats_last_interval() {
            let config = PollConfig::default();
            assert_eq!(config.interval(0), Duration::from_millis(250));
            assert_eq!(config.interval(3), Duration::from_millis(1000));
            assert_eq!(config.interval(10), Duration::from_millis(1000));
        }

        #[tokio::test(start_paused = true)]
        async fn test_follows_ladder_until_accepted() {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);
            let polled = poll_until(
                &PollConfig::new(Duration::from_secs(25)),
                || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { n }
                },
                |n| *n >= 3,
            )
            .await;
            assert!(polled.satisfied);
            assert_eq!(polled.value, 3);
            assert_eq!(polled.samples, 4);
            assert_eq!(polled.elapsed, Duration::from_millis(250 + 500 + 750));
        }

        #[tokio::test(start_paused = true)]
        async fn test_gives_up_at_deadline() {
            let polled = poll_until(
                &PollConfig::new(Duration::from_secs(2)),
                || async { "waiting-visible" },
                |s| *s == "ok",
            )
            .await;
            assert!(!polled.satisfied);
            assert_eq!(polled.value, "waiting-visible");
            assert_eq!(polled.elapsed, Duration::from_secs(2));
        }
    }
}
