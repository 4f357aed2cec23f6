//! OpenAI-compatible chat completion client.
//!
//! Talks to any server exposing `POST /v1/chat/completions` with a bearer
//! key. Only single-turn user prompts are sent.

use super::llm::{ChatBackend, ChatCompletion, LlmClientError, Usage};
use crate::config::OpenAiSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// User message with `content`
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Parameters for a chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// The messages for the chat completion.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f64,
}

/// A single completion choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponseChoice {
    /// Index of this choice.
    #[serde(default)]
    pub index: u32,
    /// The generated message.
    pub message: ChatMessage,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
}

/// Response from a chat completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,
    /// Model used.
    #[serde(default)]
    pub model: String,
    /// Generated choices.
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
    /// Token usage statistics.
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Content of the first choice, empty when there is none
    #[must_use]
    pub fn first_text(&self) -> &str {
        self.choices
            .first()
            .map_or("", |c| c.message.content.as_str())
    }
}

/// A chat response with timing metadata.
#[derive(Debug, Clone)]
pub struct TimedChatResponse {
    /// The API response.
    pub response: ChatResponse,
    /// Total request duration.
    pub latency: Duration,
}

impl From<reqwest::Error> for LlmClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed {
                message: e.to_string(),
            }
        } else {
            Self::Http {
                message: e.to_string(),
            }
        }
    }
}

/// OpenAI chat completions over HTTPS.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl OpenAiClient {
    /// Create a new client pointing at the given base URL.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            model: model.into(),
        }
    }

    /// Client for the configured endpoint, or `None` without a key
    #[must_use]
    pub fn from_settings(settings: &OpenAiSettings) -> Option<Self> {
        settings.is_configured().then(|| {
            Self::new(
                settings.effective_base_url(),
                settings.api_key.clone(),
                settings.model.clone(),
            )
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/v1/chat/completions`
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Send a chat completion request and return the response with timing.
    ///
    /// # Errors
    ///
    /// [`LlmClientError::Http`] when the request fails,
    /// [`LlmClientError::ApiError`] on a non-success status and
    /// [`LlmClientError::Malformed`] when the body is not a completion.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
    ) -> Result<TimedChatResponse, LlmClientError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
        };

        let start = Instant::now();
        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = resp.json().await?;
        Ok(TimedChatResponse {
            response,
            latency: start.elapsed(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f64) -> Result<ChatCompletion, LlmClientError> {
        let timed = self
            .chat_completion(vec![ChatMessage::user(prompt)], temperature)
            .await?;
        tracing::debug!(
            model = %self.model,
            latency_ms = u64::try_from(timed.latency.as_millis()).unwrap_or(u64::MAX),
            "chat completion"
        );
        Ok(ChatCompletion {
            text: timed.response.first_text().to_string(),
            usage: timed.response.usage,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = OpenAiClient::new("https://api.openai.com/", "sk-test", "gpt-4o-mini");
        assert_eq!(client.base_url(), "https://api.openai.com");
        assert_eq!(client.completions_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(ChatBackend::model(&client), "gpt-4o-mini");
    }

    #[test]
    fn test_from_settings_requires_key() {
        assert!(OpenAiClient::from_settings(&OpenAiSettings::default()).is_none());
        let client = OpenAiClient::from_settings(&OpenAiSettings {
            api_key: "sk-test".into(),
            base_url: Some("http://localhost:8081".into()),
            model: "local".into(),
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8081");
    }

    #[test]
    fn test_chat_request_serialization() {
        let req = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::user("Hi")],
            temperature: 0.0,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"Hi\""));
        assert!(json.contains("\"temperature\":0.0"));
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"expected\": true}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_text(), "{\"expected\": true}");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_chat_response_without_choices() {
        let resp: ChatResponse = serde_json::from_str(r#"{"id": "abc", "choices": []}"#).unwrap();
        assert!(resp.usage.is_none());
        assert_eq!(resp.first_text(), "");
    }

    #[test]
    fn test_role_serialization() {
        for (role, expected) in [
            (Role::System, "\"system\""),
            (Role::User, "\"user\""),
            (Role::Assistant, "\"assistant\""),
        ] {
            assert_eq!(serde_json::to_string(&role).unwrap(), expected);
        }
    }
}
