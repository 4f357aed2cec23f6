//! LLM sanity checks.
//!
//! A check sends one prompt to a [`ChatBackend`] and expects a JSON object
//! somewhere in the reply, e.g. `{"expected": true}`. Model prose around the
//! object is tolerated.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

/// Text of the first choice plus usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    /// `choices[0].message.content`, empty when missing
    pub text: String,
    /// Token usage, if reported
    pub usage: Option<Usage>,
}

/// Errors from the LLM client.
#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    /// HTTP request failed.
    #[error("HTTP error: {message}")]
    Http {
        /// Error message
        message: String,
    },
    /// Server returned an error status.
    #[error("API error {status}: {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Response body was not a chat completion.
    #[error("malformed response: {message}")]
    Malformed {
        /// Error message
        message: String,
    },
}

/// A chat completion service
#[async_trait]
pub trait ChatBackend: Send + Sync + fmt::Debug {
    /// Model requests are sent with
    fn model(&self) -> &str;

    /// Send one user message
    async fn complete(&self, prompt: &str, temperature: f64) -> Result<ChatCompletion, LlmClientError>;
}

/// Outcome of one traced LLM call, attached verbatim to the scenario
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCallResult {
    /// Whether the call returned a completion
    pub ok: bool,
    /// Completion text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Trace the call was recorded under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Wall time of the call
    pub latency_ms: u64,
}

/// A completed check
#[derive(Debug, Clone, PartialEq)]
pub struct LlmCheck {
    /// Whether the call itself succeeded
    pub ok: bool,
    /// JSON object found in the reply
    pub parsed: Option<Value>,
    /// The call as made
    pub raw: LlmCallResult,
}

impl LlmCheck {
    /// Boolean field of the parsed reply
    #[must_use]
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.parsed.as_ref()?.get(key)?.as_bool()
    }

    /// String field of the parsed reply
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.parsed.as_ref()?.get(key)?.as_str()
    }
}

fn object_span() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// Parse the outermost `{...}` span of `text`, or all of it when there is none
#[must_use]
pub fn safe_parse_json(text: &str) -> Option<Value> {
    let candidate = object_span()
        .and_then(|re| re.find(text))
        .map_or(text, |m| m.as_str());
    serde_json::from_str(candidate).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_object_inside_prose() {
            let text = "Sure! Here you go:\n```json\n{\"ascending\": true,\n \"reason\": \"1999 <= 2499\"}\n```";
            assert_eq!(safe_parse_json(text).unwrap()["ascending"], true);
        }

        #[test]
        fn test_bare_values_and_garbage() {
            assert_eq!(safe_parse_json("[1, 2]"), Some(json!([1, 2])));
            assert_eq!(safe_parse_json("I think yes"), None);
            assert_eq!(safe_parse_json(""), None);
            assert_eq!(safe_parse_json("{not json}"), None);
        }
    }

    #[test]
    fn test_check_accessors() {
        let check = LlmCheck {
            ok: true,
            parsed: Some(json!({"expected": true, "reason": "invalid email"})),
            raw: LlmCallResult::default(),
        };
        assert_eq!(check.flag("expected"), Some(true));
        assert_eq!(check.text("reason"), Some("invalid email"));
        assert_eq!(check.flag("missing"), None);
    }

    #[test]
    fn test_call_result_omits_empty_fields() {
        let json = serde_json::to_value(LlmCallResult {
            ok: false,
            error: Some("timeout".into()),
            ..LlmCallResult::default()
        })
        .unwrap();
        assert_eq!(json, json!({"ok": false, "error": "timeout", "latencyMs": 0}));
    }
}
