//! Observability Bridge
//!
//! Trace creation and advisory LLM checks. Both collaborators are optional
//! and the bridge fails open: a missing key, a refused connection or a
//! non-JSON reply is logged and turned into `None`, never an error.
//!
//! ```text
//!   scenario ──create_trace──► TraceSink (Langfuse | Noop)
//!      │
//!      └──llm_json_check──► call_llm ──► ChatBackend (OpenAI)
//!                              │  └───► TraceSink  (.result / .error)
//!                              └──► Attachments (trace ref, raw result, note)
//! ```

pub mod llm;
pub mod trace;

#[cfg(feature = "llm")]
pub mod client;

pub use llm::{safe_parse_json, ChatBackend, ChatCompletion, LlmCallResult, LlmCheck, LlmClientError, Usage};
pub use trace::{MemorySink, NoopSink, TraceError, TraceId, TraceRecord, TraceSink};

#[cfg(feature = "llm")]
pub use client::OpenAiClient;
#[cfg(feature = "llm")]
pub use trace::LangfuseSink;

use crate::attachments::Attachments;
use crate::config::ProbeConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Default name of a scenario's trace reference attachment
pub const TRACE_REF_ATTACHMENT: &str = "langfuse-trace";
/// Name of the trace reference attached by an LLM check
pub const LLM_CALL_ATTACHMENT: &str = "langfuse-llm-call";
/// Default name of an LLM check's result attachment
pub const LLM_RESPONSE_ATTACHMENT: &str = "llm-response";

const MISSING_KEY: &str = "OPENAI_API_KEY not set";
const TRACE_NOTE: &str =
    "Use this traceId to correlate in Langfuse. UI linking depends on your project configuration.";
const SOFT_FAILURE_NOTE: &str = "LLM check failed or returned non-JSON; continuing without failing the test (LLM_STRICT_ASSERT=false).";

/// Settings the bridge reports or obeys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Shown in trace references
    pub langfuse_base_url: String,
    /// Whether a Langfuse public key is set
    pub project_key_configured: bool,
    /// Return failed or non-JSON checks instead of skipping them
    pub strict: bool,
    /// Raise bridge notes to warnings
    pub debug: bool,
}

impl BridgeSettings {
    /// Settings from the run configuration
    #[must_use]
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            langfuse_base_url: config.langfuse.base_url.clone(),
            project_key_configured: !config.langfuse.public_key.is_empty(),
            strict: config.llm_strict_assert,
            debug: config.langfuse.debug,
        }
    }
}

/// Inputs of a scenario trace
#[derive(Debug, Clone, PartialEq)]
pub struct TestTrace {
    /// Session grouping retries
    pub session_id: String,
    /// What the scenario does, in words
    pub prompt: String,
    /// What it expects
    pub expected_output: Value,
    /// Trace name
    pub test_name: String,
    /// Scenario id
    pub test_id: Option<String>,
    /// Extra context, merged into the trace metadata
    pub metadata: Value,
}

impl TestTrace {
    /// Trace named `llm.test` with no extra metadata
    #[must_use]
    pub fn new(session_id: impl Into<String>, prompt: impl Into<String>, expected_output: Value) -> Self {
        Self {
            session_id: session_id.into(),
            prompt: prompt.into(),
            expected_output,
            test_name: "llm.test".to_string(),
            test_id: None,
            metadata: json!({}),
        }
    }

    /// Set the trace name
    #[must_use]
    pub fn named(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = test_name.into();
        self
    }

    /// Set the scenario id
    #[must_use]
    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }

    /// Set extra metadata; non-object values are ignored
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Attachment pointing at a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRef {
    /// Trace id
    pub trace_id: String,
    /// Trace service the id lives in
    pub langfuse_base_url: String,
    /// `[configured]` or `[unset]`; the key itself is never attached
    pub project_key: String,
    /// How to use the id
    pub note: String,
}

// =============================================================================
// BRIDGE
// =============================================================================

/// Trace sink and chat backend, constructed once per run
#[derive(Debug, Clone)]
pub struct Observability {
    traces: Arc<dyn TraceSink>,
    chat: Option<Arc<dyn ChatBackend>>,
    settings: BridgeSettings,
}

impl Observability {
    /// Bridge over explicit collaborators
    #[must_use]
    pub fn new(
        traces: Arc<dyn TraceSink>,
        chat: Option<Arc<dyn ChatBackend>>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            traces,
            chat,
            settings,
        }
    }

    /// Bridge with tracing and LLM checks off
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopSink), None, BridgeSettings::default())
    }

    /// Langfuse and OpenAI clients for whichever keys are configured
    #[cfg(feature = "llm")]
    #[must_use]
    pub fn from_config(config: &ProbeConfig) -> Self {
        let settings = BridgeSettings::from_config(config);
        let traces: Arc<dyn TraceSink> = if config.langfuse.is_configured() {
            Arc::new(LangfuseSink::new(&config.langfuse))
        } else {
            Arc::new(NoopSink)
        };
        let chat = OpenAiClient::from_settings(&config.openai)
            .map(|client| Arc::new(client) as Arc<dyn ChatBackend>);
        let bridge = Self::new(traces, chat, settings);
        tracing::info!(
            tracing = bridge.tracing_enabled(),
            llm = bridge.llm_enabled(),
            strict = bridge.settings.strict,
            "observability configured"
        );
        bridge
    }

    /// Without the `llm` feature every collaborator is a no-op
    #[cfg(not(feature = "llm"))]
    #[must_use]
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(Arc::new(NoopSink), None, BridgeSettings::from_config(config))
    }

    /// Whether traces go anywhere
    #[must_use]
    pub fn tracing_enabled(&self) -> bool {
        self.traces.is_enabled()
    }

    /// Whether LLM checks run
    #[must_use]
    pub fn llm_enabled(&self) -> bool {
        self.chat.is_some()
    }

    /// Bridge settings
    #[must_use]
    pub const fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    fn note(&self, message: &str) {
        if self.settings.debug {
            tracing::warn!(target: "storeprobe::observability", "{message}");
        } else {
            tracing::debug!(target: "storeprobe::observability", "{message}");
        }
    }

    async fn deliver(&self, record: &TraceRecord) {
        if let Err(e) = self.traces.record(record).await {
            tracing::warn!(trace = %record.id, name = %record.name, error = %e, "trace delivery failed");
        }
    }

    /// Record a scenario trace
    ///
    /// Returns the trace id, or `None` when tracing is disabled. A failed
    /// delivery is logged and the id is still returned.
    pub async fn create_trace(&self, trace: TestTrace) -> Option<TraceId> {
        if !self.tracing_enabled() {
            self.note("tracing disabled; missing Langfuse keys");
            return None;
        }
        let id = TraceId::generate("llm");
        let mut metadata = match trace.metadata {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(test_id) = &trace.test_id {
            metadata.insert("testId".into(), json!(test_id));
        }
        metadata.insert("sessionId".into(), json!(trace.session_id));
        metadata.insert("kind".into(), json!("llm-test"));
        metadata.insert("traceId".into(), json!(id.as_str()));

        let record = TraceRecord::new(id.clone(), trace.test_name)
            .with_session(trace.session_id)
            .with_input(json!({ "prompt": trace.prompt }))
            .with_output(json!({ "expected": trace.expected_output }))
            .with_metadata(Value::Object(metadata));
        self.deliver(&record).await;
        Some(id)
    }

    /// Reference to `id` as attached to scenario results
    #[must_use]
    pub fn trace_ref(&self, id: &TraceId) -> TraceRef {
        TraceRef {
            trace_id: id.to_string(),
            langfuse_base_url: self.settings.langfuse_base_url.clone(),
            project_key: if self.settings.project_key_configured {
                "[configured]"
            } else {
                "[unset]"
            }
            .to_string(),
            note: TRACE_NOTE.to_string(),
        }
    }

    /// Attach a reference to `id` as JSON; nothing without an id
    pub fn attach_trace_ref(&self, attachments: &mut Attachments, id: Option<&TraceId>, name: &str) -> bool {
        let Some(id) = id else {
            return false;
        };
        attachments.attach_json(name, &self.trace_ref(id));
        true
    }

    /// One traced chat completion at temperature 0
    ///
    /// Never fails: errors are reported in the result.
    pub async fn call_llm(&self, prompt: &str, session_id: &str) -> LlmCallResult {
        let Some(chat) = &self.chat else {
            return LlmCallResult {
                error: Some(MISSING_KEY.to_string()),
                ..LlmCallResult::default()
            };
        };
        let model = chat.model().to_string();
        let trace_id = self.tracing_enabled().then(|| TraceId::generate("llm"));
        if let Some(id) = &trace_id {
            let record = TraceRecord::new(id.clone(), "openai.chat.completions")
                .with_session(session_id)
                .with_input(json!({ "prompt": prompt, "model": model, "options": { "temperature": 0 } }))
                .with_metadata(json!({ "provider": "openai", "kind": "llm-call" }));
            self.deliver(&record).await;
        }

        let start = Instant::now();
        let outcome = chat.complete(prompt, 0.0).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (suffix, output, metadata, result) = match outcome {
            Ok(completion) => (
                "result",
                json!({ "text": completion.text }),
                json!({ "provider": "openai", "latencyMs": latency_ms, "usage": completion.usage }),
                LlmCallResult {
                    ok: true,
                    text: Some(completion.text),
                    usage: completion.usage,
                    latency_ms,
                    ..LlmCallResult::default()
                },
            ),
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "LLM call failed");
                let message = e.to_string();
                (
                    "error",
                    json!({ "error": message }),
                    json!({ "provider": "openai", "latencyMs": latency_ms }),
                    LlmCallResult {
                        error: Some(message),
                        latency_ms,
                        ..LlmCallResult::default()
                    },
                )
            }
        };

        if let Some(id) = &trace_id {
            let record = TraceRecord::new(id.clone(), format!("openai.chat.completions.{suffix}"))
                .with_session(session_id)
                .with_input(json!({ "prompt": prompt, "model": model }))
                .with_output(output)
                .with_metadata(metadata);
            self.deliver(&record).await;
        }
        LlmCallResult {
            trace_id: trace_id.map(|id| id.to_string()),
            ..result
        }
    }

    /// Ask for a JSON verdict and attach what happened
    ///
    /// Without a key, attaches a skip marker under `attach_name` and returns
    /// `None`. Otherwise attaches the call's trace reference and raw result.
    /// A failed call or non-JSON reply returns `None` with a
    /// `{attach_name}-note` text unless strict mode is on, in which case the
    /// check is returned for the caller to assert on.
    pub async fn llm_json_check(
        &self,
        attachments: &mut Attachments,
        prompt: &str,
        session_id: &str,
        attach_name: &str,
    ) -> Option<LlmCheck> {
        if !self.llm_enabled() {
            attachments.attach_json(attach_name, &json!({ "skipped": true, "reason": MISSING_KEY }));
            self.note("LLM check skipped; OPENAI_API_KEY not set");
            return None;
        }

        let raw = self.call_llm(prompt, session_id).await;
        let trace_id = raw.trace_id.clone().map(TraceId::new);
        self.attach_trace_ref(attachments, trace_id.as_ref(), LLM_CALL_ATTACHMENT);
        attachments.attach_json(attach_name, &raw);

        let parsed = raw.text.as_deref().and_then(safe_parse_json);
        let ok = raw.ok;
        if !self.settings.strict && (!ok || parsed.is_none()) {
            attachments.attach_text(format!("{attach_name}-note"), SOFT_FAILURE_NOTE);
            tracing::info!(attach_name, ok, "LLM check inconclusive; skipped");
            return None;
        }
        Some(LlmCheck { ok, parsed, raw })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Reply {
        ValidJson,
        InvalidText,
        HttpError,
    }

    #[derive(Debug)]
    struct ScriptedChat(Reply);

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str, _temperature: f64) -> Result<ChatCompletion, LlmClientError> {
            match self.0 {
                Reply::ValidJson => Ok(ChatCompletion {
                    text: "Verdict: {\"expected\": true, \"reason\": \"ok\"}".into(),
                    usage: Some(Usage {
                        prompt_tokens: 12,
                        completion_tokens: 6,
                        total_tokens: 18,
                    }),
                }),
                Reply::InvalidText => Ok(ChatCompletion {
                    text: "I believe so".into(),
                    usage: None,
                }),
                Reply::HttpError => Err(LlmClientError::Http {
                    message: "connection reset".into(),
                }),
            }
        }
    }

    fn settings(strict: bool) -> BridgeSettings {
        BridgeSettings {
            langfuse_base_url: "https://cloud.langfuse.com".into(),
            project_key_configured: true,
            strict,
            debug: false,
        }
    }

    fn bridge(sink: Arc<dyn TraceSink>, reply: Option<Reply>, strict: bool) -> Observability {
        let chat = reply.map(|r| Arc::new(ScriptedChat(r)) as Arc<dyn ChatBackend>);
        Observability::new(sink, chat, settings(strict))
    }

    mod trace_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_trace_records_metadata() {
            let sink = Arc::new(MemorySink::new());
            let obs = bridge(sink.clone(), None, false);
            let trace = TestTrace::new("chromium-w0-r0", "Open home and close modal", json!("modal hidden"))
                .named("A1 dismiss login modal")
                .with_test_id("A1")
                .with_metadata(json!({"file": "login", "area": "auth"}));

            let id = obs.create_trace(trace).await.unwrap();
            let records = sink.records();
            assert_eq!(records.len(), 1);
            let record = &records[0];
            assert_eq!(record.id, id);
            assert_eq!(record.name, "A1 dismiss login modal");
            assert_eq!(record.input["prompt"], "Open home and close modal");
            assert_eq!(record.output["expected"], "modal hidden");
            assert_eq!(record.metadata["file"], "login");
            assert_eq!(record.metadata["testId"], "A1");
            assert_eq!(record.metadata["kind"], "llm-test");
            assert_eq!(record.metadata["traceId"], id.as_str());
        }

        #[tokio::test]
        async fn test_disabled_tracing_returns_none() {
            let obs = Observability::disabled();
            assert!(obs
                .create_trace(TestTrace::new("s", "p", json!(null)))
                .await
                .is_none());
            let mut attachments = Attachments::new();
            assert!(!obs.attach_trace_ref(&mut attachments, None, TRACE_REF_ATTACHMENT));
            assert!(attachments.is_empty());
        }

        #[tokio::test]
        async fn test_failed_delivery_keeps_id() {
            let obs = bridge(Arc::new(MemorySink::failing()), None, false);
            assert!(obs.create_trace(TestTrace::new("s", "p", json!(1))).await.is_some());
        }

        #[test]
        fn test_trace_ref_hides_key() {
            let mut obs = Observability::disabled();
            let id = TraceId::new("llm-1-abcdef");
            assert_eq!(obs.trace_ref(&id).project_key, "[unset]");

            obs.settings = settings(false);
            let mut attachments = Attachments::new();
            assert!(obs.attach_trace_ref(&mut attachments, Some(&id), TRACE_REF_ATTACHMENT));
            let attached = attachments.json(TRACE_REF_ATTACHMENT).unwrap();
            assert_eq!(attached["traceId"], "llm-1-abcdef");
            assert_eq!(attached["projectKey"], "[configured]");
            assert_eq!(attached["langfuseBaseUrl"], "https://cloud.langfuse.com");
        }
    }

    mod call_tests {
        use super::*;

        #[tokio::test]
        async fn test_call_traces_start_and_result() {
            let sink = Arc::new(MemorySink::new());
            let obs = bridge(sink.clone(), Some(Reply::ValidJson), false);
            let result = obs.call_llm("is it sorted?", "chromium-w1-r0").await;
            assert!(result.ok);
            assert_eq!(result.usage.unwrap().total_tokens, 18);

            let names: Vec<String> = sink.records().into_iter().map(|r| r.name).collect();
            assert_eq!(names, vec!["openai.chat.completions", "openai.chat.completions.result"]);
            assert_eq!(sink.records()[0].id.as_str(), result.trace_id.unwrap());
        }

        #[tokio::test]
        async fn test_call_error_is_reported_not_raised() {
            let sink = Arc::new(MemorySink::new());
            let obs = bridge(sink.clone(), Some(Reply::HttpError), false);
            let result = obs.call_llm("prompt", "s").await;
            assert!(!result.ok);
            assert!(result.error.unwrap().contains("connection reset"));
            assert_eq!(sink.records()[1].name, "openai.chat.completions.error");
        }
    }

    mod check_tests {
        use super::*;

        #[tokio::test]
        async fn test_missing_key_attaches_skip() {
            let obs = bridge(Arc::new(NoopSink), None, true);
            let mut attachments = Attachments::new();
            assert!(obs.llm_json_check(&mut attachments, "p", "s", "llm-relevance").await.is_none());
            let skipped = attachments.json("llm-relevance").unwrap();
            assert_eq!(skipped, json!({"skipped": true, "reason": "OPENAI_API_KEY not set"}));
        }

        #[tokio::test]
        async fn test_valid_json_is_parsed() {
            let obs = bridge(Arc::new(MemorySink::new()), Some(Reply::ValidJson), false);
            let mut attachments = Attachments::new();
            let check = obs
                .llm_json_check(&mut attachments, "p", "s", LLM_RESPONSE_ATTACHMENT)
                .await
                .unwrap();
            assert!(check.ok);
            assert_eq!(check.flag("expected"), Some(true));
            assert_eq!(attachments.names(), vec![LLM_CALL_ATTACHMENT, LLM_RESPONSE_ATTACHMENT]);
        }

        #[tokio::test]
        async fn test_soft_mode_notes_invalid_text() {
            let obs = bridge(Arc::new(NoopSink), Some(Reply::InvalidText), false);
            let mut attachments = Attachments::new();
            assert!(obs.llm_json_check(&mut attachments, "p", "s", "llm-brand").await.is_none());
            assert_eq!(attachments.names(), vec!["llm-brand", "llm-brand-note"]);
        }

        #[tokio::test]
        async fn test_strict_mode_returns_failed_check() {
            let obs = bridge(Arc::new(NoopSink), Some(Reply::HttpError), true);
            let mut attachments = Attachments::new();
            let check = obs.llm_json_check(&mut attachments, "p", "s", "llm").await.unwrap();
            assert!(!check.ok);
            assert!(check.parsed.is_none());
        }

        #[tokio::test]
        async fn test_never_raises_across_collaborator_states() {
            let sinks: [fn() -> Arc<dyn TraceSink>; 3] = [
                || Arc::new(NoopSink) as Arc<dyn TraceSink>,
                || Arc::new(MemorySink::new()) as Arc<dyn TraceSink>,
                || Arc::new(MemorySink::failing()) as Arc<dyn TraceSink>,
            ];
            let replies = [None, Some(Reply::ValidJson), Some(Reply::InvalidText), Some(Reply::HttpError)];
            for sink in sinks {
                for reply in replies {
                    for strict in [false, true] {
                        let obs = bridge(sink(), reply, strict);
                        let mut attachments = Attachments::new();
                        obs.create_trace(TestTrace::new("s", "p", json!(true))).await;
                        let check = obs.llm_json_check(&mut attachments, "p", "s", "llm").await;
                        let expect_some = match reply {
                            None => false,
                            Some(Reply::ValidJson) => true,
                            Some(_) => strict,
                        };
                        assert_eq!(check.is_some(), expect_some, "{reply:?} strict={strict}");
                        assert!(attachments.get("llm").is_some());
                    }
                }
            }
        }
    }
}
