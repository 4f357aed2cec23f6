//! Trace records and the sinks that receive them.
//!
//! Traces are write-only. A sink either accepts a record or reports a
//! [`TraceError`]; the bridge logs the error and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Identifier of one trace, e.g. `llm-1718000000000-a1b2c3`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// `{prefix}-{unix millis}-{6 random hex chars}`
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{prefix}-{}-{}",
            Utc::now().timestamp_millis(),
            &random[..6]
        ))
    }

    /// Wrap an existing id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One trace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    /// Trace id
    pub id: TraceId,
    /// Event name, e.g. a scenario title or `openai.chat.completions`
    pub name: String,
    /// Session grouping retries of one worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// What was asked
    pub input: Value,
    /// What came back or was expected
    pub output: Value,
    /// Free-form context
    pub metadata: Value,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
}

impl TraceRecord {
    /// Record stamped now with empty payloads
    #[must_use]
    pub fn new(id: TraceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            session_id: None,
            input: Value::Null,
            output: Value::Null,
            metadata: Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Set the session
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the input payload
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Set the output payload
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Set the metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Errors from a trace sink
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The request never got a response
    #[error("trace transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },
    /// The service answered with a non-success status
    #[error("trace service returned {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Destination for trace records
#[async_trait]
pub trait TraceSink: Send + Sync + fmt::Debug {
    /// Whether records go anywhere
    fn is_enabled(&self) -> bool {
        true
    }

    /// Deliver one record
    async fn record(&self, record: &TraceRecord) -> Result<(), TraceError>;
}

/// Sink used when no trace service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl TraceSink for NoopSink {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn record(&self, _record: &TraceRecord) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Sink keeping records in memory; optionally failing every delivery
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
    fail: bool,
}

impl MemorySink {
    /// Accepting sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every record with a transport error
    #[must_use]
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Accepted records, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TraceSink for MemorySink {
    async fn record(&self, record: &TraceRecord) -> Result<(), TraceError> {
        if self.fail {
            return Err(TraceError::Transport {
                message: "connection refused".into(),
            });
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

// =============================================================================
// LANGFUSE
// =============================================================================

#[cfg(feature = "llm")]
pub use langfuse::LangfuseSink;

#[cfg(feature = "llm")]
mod langfuse {
    use super::{TraceError, TraceRecord, TraceSink};
    use crate::config::LangfuseSettings;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Sink posting to the Langfuse ingestion API with basic auth
    #[derive(Debug, Clone)]
    pub struct LangfuseSink {
        client: reqwest::Client,
        base_url: String,
        public_key: String,
        secret_key: String,
    }

    impl LangfuseSink {
        /// Sink for the configured project
        #[must_use]
        pub fn new(settings: &LangfuseSettings) -> Self {
            let client = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default();
            Self {
                client,
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                public_key: settings.public_key.clone(),
                secret_key: settings.secret_key.clone(),
            }
        }

        /// `{base}/api/public/ingestion`
        #[must_use]
        pub fn ingestion_url(&self) -> String {
            format!("{}/api/public/ingestion", self.base_url)
        }

        /// One-event ingestion batch
        #[must_use]
        pub fn ingestion_body(record: &TraceRecord) -> Value {
            json!({
                "batch": [{
                    "id": uuid::Uuid::new_v4().to_string(),
                    "type": "trace-create",
                    "timestamp": record.timestamp.to_rfc3339(),
                    "body": record,
                }]
            })
        }
    }

    #[async_trait]
    impl TraceSink for LangfuseSink {
        async fn record(&self, record: &TraceRecord) -> Result<(), TraceError> {
            let resp = self
                .client
                .post(self.ingestion_url())
                .basic_auth(&self.public_key, Some(&self.secret_key))
                .json(&Self::ingestion_body(record))
                .send()
                .await
                .map_err(|e| TraceError::Transport {
                    message: e.to_string(),
                })?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TraceError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        }
    }
}
