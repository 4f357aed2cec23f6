//! OTP Login Page
//!
//! The storefront logs in with an email or mobile identifier followed by a
//! one-time code. [`LoginPage`] tracks where the flow stands:
//!
//! ```text
//!   Unopened ──open──► FormVisible ──request_otp──► OtpRequested
//!                                                      │
//!                                  ┌───────────────────┴───────────┐
//!                                  ▼                               ▼
//!                          ValidationError                    OtpVisible
//!                                                                  │ enter_otp + click_verify
//!                                                    ┌─────────────┴────────────┐
//!                                                    ▼                          ▼
//!                                                Verified              VerificationError
//! ```
//!
//! Only a missing identifier input is an error. Everything else is reported
//! as state so negative flows can assert on it.

use super::selectors::{login, paths, urls};
use super::{PageContext, PageObject};
use crate::locator::{self, LocatorChain, Resolved};
use crate::result::{ProbeError, ProbeResult};
use crate::wait::{self, LoadState, RaceOutcome, Signal, UrlPattern};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Budget for the form, the identifier input and the OTP/validation race
pub const LOGIN_FORM_TIMEOUT: Duration = Duration::from_secs(15);
/// Pause when no verify button shows and the code may auto-submit
pub const AUTO_VERIFY_GRACE: Duration = Duration::from_millis(1_500);
/// How long to wait for the flow to leave the form or show an error
pub const VERIFY_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

const MISSING_INPUT: &str = "Login input not found within OTP form.";

/// Where the login flow stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum LoginState {
    /// Not navigated yet
    #[default]
    Unopened,
    /// Form with identifier input showing
    FormVisible,
    /// Request OTP clicked, nothing rendered yet
    OtpRequested,
    /// The identifier was rejected before any code was sent
    ValidationError,
    /// Code boxes showing
    OtpVisible,
    /// The flow left the login form
    Verified,
    /// The code was rejected
    VerificationError,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a code submission counts as rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "camelCase")]
pub enum RejectionEvidence {
    /// An error message showed
    ErrorMessage(String),
    /// No message, but still on the login route with code boxes showing
    ///
    /// This is a heuristic: a slow site looks the same.
    StillOnForm,
}

/// Result of submitting a code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "evidence", rename_all = "camelCase")]
pub enum VerificationOutcome {
    /// The flow moved past the form
    Verified,
    /// The code was refused
    Rejected(RejectionEvidence),
    /// Neither a next screen nor rejection evidence showed
    Undetermined,
}

impl VerificationOutcome {
    /// Whether any rejection evidence was seen
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Login page
#[derive(Debug, Clone)]
pub struct LoginPage {
    ctx: PageContext,
    state: LoginState,
}

impl PageObject for LoginPage {
    fn url_pattern(&self) -> &str {
        urls::LOGIN
    }

    fn context(&self) -> &PageContext {
        &self.ctx
    }
}

impl LoginPage {
    /// Bind to a tab
    #[must_use]
    pub const fn new(ctx: PageContext) -> Self {
        Self {
            ctx,
            state: LoginState::Unopened,
        }
    }

    /// Current flow state
    #[must_use]
    pub const fn state(&self) -> LoginState {
        self.state
    }

    fn transition(&mut self, next: LoginState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "login state");
            self.state = next;
        }
    }

    /// Navigate to the login route and wait for the identifier input
    ///
    /// # Errors
    ///
    /// Navigation errors, or [`ProbeError::ElementNotFound`] when the OTP
    /// form has no identifier input.
    pub async fn open(&mut self) -> ProbeResult<()> {
        self.ctx.goto(paths::LOGIN).await?;
        let page = self.ctx.page();
        wait::wait_for_load_state(page, LoadState::DomContentLoaded, LOGIN_FORM_TIMEOUT).await;
        if !wait::wait_for_url(page, urls::LOGIN, LOGIN_FORM_TIMEOUT).await {
            tracing::warn!(url = %self.ctx.url().await, "login route did not settle");
        }
        self.identifier_input().await?;
        self.transition(LoginState::FormVisible);
        Ok(())
    }

    async fn identifier_input(&self) -> ProbeResult<Resolved> {
        if self.ctx.resolve(&login::form_chain()).await.is_none() {
            return Err(ProbeError::not_found(MISSING_INPUT));
        }
        locator::probe(self.ctx.page(), &login::identifier_input())
            .await
            .ok_or_else(|| ProbeError::not_found(MISSING_INPUT))
    }

    /// Fill the identifier, ask for a code and wait for code boxes or a validation error
    ///
    /// # Errors
    ///
    /// [`ProbeError::ElementNotFound`] when the identifier input or the
    /// Request OTP button is missing; driver errors from filling.
    pub async fn request_otp(&mut self, identifier: &str) -> ProbeResult<LoginState> {
        let input = self.identifier_input().await?;
        self.ctx.page().fill(&input.locator, input.nth, identifier).await?;

        let button = self
            .ctx
            .resolve(&login::request_otp())
            .await
            .ok_or_else(|| ProbeError::not_found("request otp button"))?;
        self.ctx.click(&button).await?;
        self.transition(LoginState::OtpRequested);

        let signals = [
            Signal::visible(LocatorChain::single("otp inputs", login::otp_inputs())),
            Signal::visible(LocatorChain::single("validation error", login::validation_error())),
        ];
        wait::first_of(self.ctx.page(), &signals, LOGIN_FORM_TIMEOUT).await;

        if self.validation_error_visible().await {
            self.transition(LoginState::ValidationError);
        } else if self.otp_visible().await {
            self.transition(LoginState::OtpVisible);
        }
        tracing::info!(state = %self.state, "otp requested");
        Ok(self.state)
    }

    /// Identifier validation message showing
    pub async fn validation_error_visible(&self) -> bool {
        locator::is_visible(self.ctx.page(), &login::validation_error()).await
    }

    /// Code boxes showing
    pub async fn otp_visible(&self) -> bool {
        locator::is_visible(self.ctx.page(), &login::otp_inputs()).await
    }

    /// Wait for code boxes
    pub async fn wait_otp_visible(&self, timeout: Duration) -> bool {
        locator::wait_visible(self.ctx.page(), &login::otp_inputs(), timeout).await
    }

    /// Type the code, one character per box when the form splits it
    ///
    /// Returns how many boxes were filled; zero when no box shows.
    ///
    /// # Errors
    ///
    /// Driver errors from filling.
    pub async fn enter_otp(&self, otp: &str) -> ProbeResult<usize> {
        let page = self.ctx.page();
        let boxes = login::otp_inputs();
        let found = page.query(&boxes).await.unwrap_or_default();
        let Some(first) = found.iter().position(|e| e.visible) else {
            tracing::debug!("no otp input showing; skipping code entry");
            return Ok(0);
        };

        if found.len() > 1 && !otp.is_empty() {
            let mut filled = 0;
            for (nth, digit) in otp.chars().take(found.len()).enumerate() {
                page.fill(&boxes, nth, &digit.to_string()).await?;
                filled += 1;
            }
            Ok(filled)
        } else {
            page.fill(&boxes, first, otp).await?;
            Ok(1)
        }
    }

    /// Click Verify, or give an auto-submitting form a moment
    ///
    /// Returns whether a button was clicked.
    ///
    /// # Errors
    ///
    /// Driver errors from clicking.
    pub async fn click_verify(&self) -> ProbeResult<bool> {
        match locator::probe(self.ctx.page(), &login::verify_button()).await {
            Some(hit) => {
                self.ctx.click(&hit).await?;
                Ok(true)
            }
            None => {
                tokio::time::sleep(AUTO_VERIFY_GRACE).await;
                Ok(false)
            }
        }
    }

    /// Text of the first visible error message, trimmed; empty when none
    pub async fn error_text(&self) -> String {
        let page = self.ctx.page();
        match locator::probe(page, &login::error_message()).await {
            Some(hit) => locator::text_of(page, &hit.locator, hit.nth)
                .await
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Wait for the outcome of a submitted code
    ///
    /// Races leaving the login route against an error message. When neither
    /// fires, staying on the route with code boxes showing counts as a
    /// rejection.
    pub async fn verification_outcome(&mut self, timeout: Duration) -> VerificationOutcome {
        let page = self.ctx.page();
        let login_route = UrlPattern::new(urls::LOGIN);
        let left_form: BoxFuture<'_, bool> = async {
            loop {
                if page.current_url().await.is_ok_and(|url| !login_route.matches(&url)) {
                    return true;
                }
                if page.is_closed().await {
                    return false;
                }
                tokio::time::sleep(Duration::from_millis(wait::SIGNAL_POLL_INTERVAL_MS)).await;
            }
        }
        .boxed();
        let error = Signal::visible(login::error_message());
        let outcome = wait::race_first(vec![left_form, wait::watch(page, &error)], timeout).await;

        let verdict = match outcome {
            RaceOutcome::Won(0) => VerificationOutcome::Verified,
            RaceOutcome::Won(_) => {
                VerificationOutcome::Rejected(RejectionEvidence::ErrorMessage(self.error_text().await))
            }
            RaceOutcome::None => {
                if self.is_current().await && self.otp_visible().await {
                    VerificationOutcome::Rejected(RejectionEvidence::StillOnForm)
                } else {
                    VerificationOutcome::Undetermined
                }
            }
        };
        match &verdict {
            VerificationOutcome::Verified => self.transition(LoginState::Verified),
            VerificationOutcome::Rejected(_) => self.transition(LoginState::VerificationError),
            VerificationOutcome::Undetermined => {}
        }
        tracing::info!(outcome = ?verdict, "otp verification");
        verdict
    }
}
