//! Single-turn chat over the same progress channel as pipeline runs.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use writeflow_ai_harness::GenerationRequest;

use crate::collaborators::{ResolvedModel, UsageRecord};
use crate::definition::{ChatRequest, TaskType};
use crate::error::PipelineError;
use crate::orchestrator::Orchestrator;
use crate::progress::{ChatEvent, ErrorPayload, EventSink, RunUsage, TokenForwarder};
use crate::prompts;

/// Chat turn whose model has been resolved.
#[derive(Debug, Clone)]
pub struct PreparedChat {
    request: ChatRequest,
    resolved: ResolvedModel,
}

impl PreparedChat {
    pub fn model(&self) -> &writeflow_ai_harness::ModelRef {
        &self.resolved.model
    }
}

/// Finished chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub token_usage: RunUsage,
}

impl Orchestrator {
    pub async fn prepare_chat(&self, request: ChatRequest) -> Result<PreparedChat, PipelineError> {
        if request.content.trim().is_empty() {
            return Err(PipelineError::Invalid("content must not be empty".into()));
        }
        let resolved = self
            .resolve_default(
                TaskType::TextWriting,
                request.provider.as_ref(),
                request.model_id.as_deref(),
            )
            .await?;
        Ok(PreparedChat { request, resolved })
    }

    /// Streams one chat reply. Failures are emitted as a terminal `error`
    /// event before being returned; cancellation emits nothing.
    pub async fn run_chat(
        &self,
        prepared: PreparedChat,
        sink: &mut dyn EventSink<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, PipelineError> {
        let id = Uuid::new_v4();
        let outcome = self.drive_chat(id, &prepared, sink, cancel).await;
        match &outcome {
            Ok(reply) => info!(
                event = "chat.completed",
                domain = "chat",
                chat_id = %id,
                model = %prepared.resolved.model,
                total_tokens = reply.token_usage.usage.total_tokens
            ),
            Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                info!(event = "chat.aborted", domain = "chat", chat_id = %id);
            }
            Err(err) => {
                warn!(
                    event = "chat.failed",
                    domain = "chat",
                    chat_id = %id,
                    class = err.class().as_str(),
                    error = %err
                );
                let payload = ErrorPayload::from_error(err, self.settings.diagnostics);
                sink.emit(ChatEvent::Error(payload)).await;
            }
        }
        outcome
    }

    async fn drive_chat(
        &self,
        id: Uuid,
        prepared: &PreparedChat,
        sink: &mut dyn EventSink<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, PipelineError> {
        let model = &prepared.resolved.model;
        let start = ChatEvent::ChatStart {
            provider: model.provider.to_string(),
            model: model.model.clone(),
        };
        if !sink.emit(start).await {
            cancel.cancel();
            return Err(PipelineError::Cancelled);
        }

        let request = GenerationRequest::new(
            model.clone(),
            prepared.resolved.credential.clone(),
            prepared.request.content.trim(),
        )
        .system_prompt(prompts::chat_system_prompt(
            prepared.request.context.as_deref(),
        ));
        let result = {
            let mut forwarder = TokenForwarder::new(&mut *sink, ChatEvent::token);
            self.harness
                .call_streaming(&request, &mut forwarder, cancel)
                .await
        };
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                if err.is_cancelled() {
                    cancel.cancel();
                }
                return Err(err.into());
            }
        };
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let token_usage = RunUsage {
            usage: result.usage,
            cost_usd: self.cost.cost_usd(model, &result.usage),
        };
        self.recorder
            .save_usage(&UsageRecord {
                run_id: id,
                kind: "chat".to_string(),
                provider: model.provider.to_string(),
                model: model.model.clone(),
                usage: token_usage.usage,
                cost_usd: token_usage.cost_usd,
                created_at: Utc::now(),
            })
            .await?;

        let reply = ChatReply {
            content: result.text,
            token_usage,
        };
        sink.emit(ChatEvent::ChatComplete {
            content: reply.content.clone(),
            token_usage,
        })
        .await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryRecorder, MemoryCredentialStore};
    use crate::stage::testing::{Reply, ScriptedProvider};
    use std::sync::Arc;
    use writeflow_ai_harness::Harness;

    fn orchestrator(replies: Vec<Reply>) -> (Orchestrator, Arc<ScriptedProvider>, Arc<InMemoryRecorder>) {
        let provider = ScriptedProvider::new("openai", replies);
        let harness = Harness::builder()
            .register_provider(provider.clone())
            .build()
            .expect("harness");
        let recorder = Arc::new(InMemoryRecorder::new());
        let orchestrator = Orchestrator::builder(harness)
            .credentials(Arc::new(MemoryCredentialStore::new().with_key("openai", "sk")))
            .recorder(recorder.clone())
            .build();
        (orchestrator, provider, recorder)
    }

    fn request(content: &str) -> ChatRequest {
        ChatRequest {
            content: content.into(),
            context: Some("The user is drafting a newsletter.".into()),
            model_id: None,
            provider: None,
        }
    }

    #[tokio::test]
    async fn chat_streams_between_start_and_complete() {
        let (orchestrator, provider, recorder) = orchestrator(vec![Reply::Text("Sure thing")]);
        let prepared = orchestrator.prepare_chat(request("Help me")).await.expect("prepare");
        let mut events: Vec<ChatEvent> = Vec::new();
        let reply = orchestrator
            .run_chat(prepared, &mut events, &CancellationToken::new())
            .await
            .expect("chat");

        assert_eq!(
            events.first(),
            Some(&ChatEvent::ChatStart {
                provider: "openai".into(),
                model: "gpt-4o-mini".into()
            })
        );
        assert!(matches!(events.last(), Some(ChatEvent::ChatComplete { .. })));
        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Token(t) => Some(t.chunk.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "Sure thing");
        assert_eq!(reply.content, "Sure thing");

        let seen = provider.seen();
        assert!(seen[0].system.as_deref().is_some_and(|s| s.contains("newsletter")));
        let usage = recorder.usage();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].kind, "chat");
    }

    #[tokio::test]
    async fn chat_failure_is_a_single_error_event() {
        let (orchestrator, _, recorder) = orchestrator(vec![Reply::Fail(401, "bad key")]);
        let prepared = orchestrator.prepare_chat(request("Hi")).await.expect("prepare");
        let mut events: Vec<ChatEvent> = Vec::new();
        let err = orchestrator
            .run_chat(prepared, &mut events, &CancellationToken::new())
            .await
            .expect_err("401");
        assert_eq!(err.class(), writeflow_ai_harness::ErrorClass::Configuration);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ChatEvent::Error(_)));
        assert!(recorder.usage().is_empty());
    }

    #[tokio::test]
    async fn blank_chat_is_rejected_before_streaming() {
        let (orchestrator, _, _) = orchestrator(vec![]);
        let err = orchestrator
            .prepare_chat(request("   "))
            .await
            .expect_err("blank");
        assert_eq!(err.http_status(), 400);
    }
}
