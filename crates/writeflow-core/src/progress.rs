//! Progress events reported to the caller while a run is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;
use writeflow_ai_harness::{ErrorClass, TokenSink, TokenUsage};

use crate::collaborators::ContentMetrics;
use crate::definition::{ContentBrief, StageShape};
use crate::error::PipelineError;
use crate::run::{StageRecord, StageUsage};

/// Receiver of progress events. Returns `false` once the consumer is gone.
#[async_trait::async_trait]
pub trait EventSink<E: Send + 'static>: Send {
    async fn emit(&mut self, event: E) -> bool;
}

#[async_trait::async_trait]
impl<E: Send + 'static> EventSink<E> for mpsc::Sender<E> {
    async fn emit(&mut self, event: E) -> bool {
        self.send(event).await.is_ok()
    }
}

#[async_trait::async_trait]
impl<E: Send + 'static> EventSink<E> for mpsc::UnboundedSender<E> {
    async fn emit(&mut self, event: E) -> bool {
        self.send(event).is_ok()
    }
}

#[async_trait::async_trait]
impl<E: Send + 'static> EventSink<E> for Vec<E> {
    async fn emit(&mut self, event: E) -> bool {
        Vec::push(self, event);
        true
    }
}

/// Named event with a JSON payload, as framed on the wire.
pub trait WireEvent {
    fn name(&self) -> &'static str;
    fn data(&self) -> serde_json::Value;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStart {
    pub stage_index: usize,
    pub agent_name: String,
    pub agent_icon: String,
    pub total_stages: usize,
    pub stage_shape: StageShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChunk {
    pub chunk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageComplete {
    pub stage_index: usize,
    pub agent_name: String,
    pub token_usage: StageUsage,
}

/// Aggregate usage of a run or chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUsage {
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub token_usage: RunUsage,
    pub metrics: ContentMetrics,
    pub tips: Vec<String>,
    /// Present only for workflow runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_pipeline: Option<Vec<StageRecord>>,
}

/// Final payload of a successful run; also the non-streaming response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunComplete {
    pub id: Uuid,
    pub input: ContentBrief,
    pub output: RunOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub class: ErrorClass,
    /// Internal detail, only filled in diagnostics mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorPayload {
    pub fn from_error(err: &PipelineError, diagnostics: bool) -> Self {
        Self {
            message: err.user_message(),
            class: err.class(),
            detail: diagnostics.then(|| format!("{err:?}")),
        }
    }
}

/// Events of the pipeline progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStart(StageStart),
    Token(TokenChunk),
    StageComplete(StageComplete),
    RunComplete(Box<RunComplete>),
    Error(ErrorPayload),
}

impl ProgressEvent {
    pub(crate) fn token(chunk: String) -> Self {
        Self::Token(TokenChunk { chunk })
    }
}

impl WireEvent for ProgressEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::StageStart(_) => "stage-start",
            Self::Token(_) => "token",
            Self::StageComplete(_) => "stage-complete",
            Self::RunComplete(_) => "run-complete",
            Self::Error(_) => "error",
        }
    }

    fn data(&self) -> serde_json::Value {
        let value = match self {
            Self::StageStart(p) => serde_json::to_value(p),
            Self::Token(p) => serde_json::to_value(p),
            Self::StageComplete(p) => serde_json::to_value(p),
            Self::RunComplete(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
        };
        value.unwrap_or_default()
    }
}

/// Events of the single-turn chat channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    ChatStart { provider: String, model: String },
    Token(TokenChunk),
    ChatComplete { content: String, token_usage: RunUsage },
    Error(ErrorPayload),
}

impl ChatEvent {
    pub(crate) fn token(chunk: String) -> Self {
        Self::Token(TokenChunk { chunk })
    }
}

impl WireEvent for ChatEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::ChatStart { .. } => "chat-start",
            Self::Token(_) => "token",
            Self::ChatComplete { .. } => "chat-complete",
            Self::Error(_) => "error",
        }
    }

    fn data(&self) -> serde_json::Value {
        match self {
            Self::ChatStart { provider, model } => {
                serde_json::json!({ "provider": provider, "model": model })
            }
            Self::Token(p) => serde_json::to_value(p).unwrap_or_default(),
            Self::ChatComplete {
                content,
                token_usage,
            } => serde_json::json!({ "content": content, "tokenUsage": token_usage }),
            Self::Error(p) => serde_json::to_value(p).unwrap_or_default(),
        }
    }
}

/// Adapts an [`EventSink`] to the harness token sink, wrapping each fragment
/// as a `token` event.
pub(crate) struct TokenForwarder<'a, E: Send + 'static> {
    sink: &'a mut dyn EventSink<E>,
    wrap: fn(String) -> E,
}

impl<'a, E: Send + 'static> TokenForwarder<'a, E> {
    pub(crate) fn new(sink: &'a mut dyn EventSink<E>, wrap: fn(String) -> E) -> Self {
        Self { sink, wrap }
    }
}

#[async_trait::async_trait]
impl<'a, E: Send + 'static> TokenSink for TokenForwarder<'a, E> {
    async fn push(&mut self, chunk: &str) -> bool {
        let event = (self.wrap)(chunk.to_string());
        self.sink.emit(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_start_payload_uses_camel_case() {
        let event = ProgressEvent::StageStart(StageStart {
            stage_index: 1,
            agent_name: "Editor".into(),
            agent_icon: "📝".into(),
            total_stages: 3,
            stage_shape: StageShape::Text,
        });
        assert_eq!(event.name(), "stage-start");
        assert_eq!(
            event.data(),
            serde_json::json!({
                "stageIndex": 1,
                "agentName": "Editor",
                "agentIcon": "📝",
                "totalStages": 3,
                "stageShape": "text"
            })
        );
    }

    #[test]
    fn error_detail_only_in_diagnostics_mode() {
        let err = PipelineError::Invalid("topic must not be empty".into());
        let quiet = ErrorPayload::from_error(&err, false);
        assert!(serde_json::to_value(&quiet).expect("json").get("detail").is_none());
        let verbose = ErrorPayload::from_error(&err, true);
        assert!(verbose.detail.is_some());
        assert_eq!(verbose.class, ErrorClass::Upstream);
    }

    #[test]
    fn chat_complete_carries_usage() {
        let event = ChatEvent::ChatComplete {
            content: "hi".into(),
            token_usage: RunUsage {
                usage: TokenUsage::new(1, 0, 1),
                cost_usd: 0.0,
            },
        };
        assert_eq!(event.name(), "chat-complete");
        assert_eq!(event.data()["tokenUsage"]["totalTokens"], 2);
    }

    #[tokio::test]
    async fn forwarder_wraps_chunks_as_token_events() {
        let mut events: Vec<ProgressEvent> = Vec::new();
        {
            let mut forwarder = TokenForwarder::new(&mut events, ProgressEvent::token);
            assert!(forwarder.push("abc").await);
        }
        assert_eq!(
            events,
            vec![ProgressEvent::Token(TokenChunk { chunk: "abc".into() })]
        );
    }

    #[tokio::test]
    async fn closed_channel_reports_consumer_gone() {
        let (mut tx, rx) = mpsc::channel::<ProgressEvent>(1);
        drop(rx);
        assert!(!tx.emit(ProgressEvent::token("x".into())).await);
    }
}
