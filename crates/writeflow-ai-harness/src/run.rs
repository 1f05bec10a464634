use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::content::{GenerationResult, TokenUsage};
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::{ProviderEvent, ProviderStreamHandle};

/// Receiver of incremental text fragments.
#[async_trait::async_trait]
pub trait TokenSink: Send {
    /// Delivers one fragment. Returns `false` once the consumer is gone.
    async fn push(&mut self, chunk: &str) -> bool;
}

#[async_trait::async_trait]
impl TokenSink for mpsc::Sender<String> {
    async fn push(&mut self, chunk: &str) -> bool {
        self.send(chunk.to_string()).await.is_ok()
    }
}

#[async_trait::async_trait]
impl TokenSink for mpsc::UnboundedSender<String> {
    async fn push(&mut self, chunk: &str) -> bool {
        self.send(chunk.to_string()).is_ok()
    }
}

#[async_trait::async_trait]
impl TokenSink for Vec<String> {
    async fn push(&mut self, chunk: &str) -> bool {
        Vec::push(self, chunk.to_string());
        true
    }
}

/// Drains a vendor stream into `sink` and returns the aggregate result.
///
/// Once `cancel` fires no further fragment reaches the sink and the call
/// settles as [`ProviderError::Cancelled`]. A sink that reports its consumer
/// gone is treated the same way.
pub(crate) async fn drive_stream(
    provider_id: ProviderId,
    mut handle: ProviderStreamHandle,
    sink: &mut dyn TokenSink,
    cancel: &CancellationToken,
) -> Result<GenerationResult, ProviderError> {
    let mut seq = 0_u64;
    let mut aggregated = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::cancelled(provider_id)),
            next = handle.stream.next() => next,
        };
        match next {
            Some(Ok(ProviderEvent::TextDelta { text })) => {
                if text.is_empty() {
                    continue;
                }
                debug!(provider = %provider_id, seq, len = text.len(), "provider text delta");
                aggregated.push_str(&text);
                seq = seq.saturating_add(1);
                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProviderError::cancelled(provider_id)),
                    delivered = sink.push(&text) => delivered,
                };
                if !delivered {
                    return Err(ProviderError::cancelled(provider_id));
                }
            }
            Some(Ok(ProviderEvent::Completed {
                text,
                usage,
                finish_reason,
            })) => {
                return Ok(finalize_result(aggregated, text, usage, finish_reason));
            }
            Some(Err(err)) => return Err(err),
            None => {
                return Err(ProviderError::protocol(
                    provider_id.clone(),
                    format!("provider stream ended without completion ({provider_id})"),
                ));
            }
        }
    }
}

fn finalize_result(
    aggregated: String,
    provider_text: Option<String>,
    usage: TokenUsage,
    finish_reason: Option<String>,
) -> GenerationResult {
    let text = if aggregated.is_empty() {
        provider_text.unwrap_or_default()
    } else {
        aggregated
    };
    GenerationResult {
        text,
        usage,
        finish_reason,
    }
}
