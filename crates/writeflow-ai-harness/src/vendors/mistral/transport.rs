use crate::content::TokenUsage;
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;
use crate::vendors::sse::{FrameMapper, SseFrame};

pub(super) struct MistralFrameMapper {
    provider: ProviderId,
    usage: TokenUsage,
    finish_reason: Option<String>,
    completed: bool,
}

impl MistralFrameMapper {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            usage: TokenUsage::default(),
            finish_reason: None,
            completed: false,
        }
    }

    fn completed(&mut self) -> Vec<ProviderEvent> {
        if self.completed {
            return Vec::new();
        }
        self.completed = true;
        vec![ProviderEvent::Completed {
            text: None,
            usage: self.usage,
            finish_reason: self.finish_reason.take(),
        }]
    }
}

impl FrameMapper for MistralFrameMapper {
    fn map_frame(&mut self, frame: &SseFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        if frame.is_terminal_marker() {
            return Ok(self.completed());
        }
        let Some(value) = frame.json(&self.provider)? else {
            return Ok(Vec::new());
        };
        if value.get("object").and_then(|v| v.as_str()) == Some("error") {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Mistral stream error");
            return Err(ProviderError::provider(&self.provider, message, None));
        }
        if let Some(usage) = extract_usage(&value) {
            self.usage = usage;
        }
        let (text, finish_reason) = extract_choice(&value, "delta");
        if finish_reason.is_some() {
            self.finish_reason = finish_reason;
        }
        match text {
            Some(text) if !text.is_empty() => Ok(vec![ProviderEvent::TextDelta { text }]),
            _ => Ok(Vec::new()),
        }
    }

    fn finish(&mut self) -> Result<Vec<ProviderEvent>, ProviderError> {
        // Some proxies drop the [DONE] sentinel after the final chunk.
        if self.finish_reason.is_some() {
            return Ok(self.completed());
        }
        Ok(Vec::new())
    }
}

/// Text and finish reason of the first choice. `field` is `message` for
/// single-shot bodies and `delta` for stream chunks.
pub(super) fn extract_choice(value: &serde_json::Value, field: &str) -> (Option<String>, Option<String>) {
    let choice = value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|c| c.first());
    let text = choice
        .and_then(|c| c.get(field))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned);
    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned);
    (text, finish_reason)
}

pub(super) fn extract_usage(value: &serde_json::Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    let count = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    Some(TokenUsage::new(
        count("prompt_tokens"),
        0,
        count("completion_tokens"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(raw: &str) -> SseFrame {
        SseFrame {
            event: None,
            data: raw.to_string(),
        }
    }

    #[test]
    fn done_marker_completes_with_usage_from_last_chunk() {
        let mut mapper = MistralFrameMapper::new(ProviderId::new("mistral"));
        let chunk = data(
            r#"{"choices":[{"delta":{"content":"Bonjour"},"finish_reason":null}]}"#,
        );
        let last = data(
            r#"{"choices":[{"delta":{"content":""},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
        );
        assert_eq!(
            mapper.map_frame(&chunk).expect("chunk"),
            vec![ProviderEvent::TextDelta { text: "Bonjour".into() }]
        );
        assert!(mapper.map_frame(&last).expect("last").is_empty());
        assert_eq!(
            mapper.map_frame(&data("[DONE]")).expect("done"),
            vec![ProviderEvent::Completed {
                text: None,
                usage: TokenUsage::new(5, 0, 2),
                finish_reason: Some("stop".into()),
            }]
        );
        assert!(mapper.finish().expect("finish").is_empty());
    }

    #[test]
    fn single_shot_choice_reads_message() {
        let value = serde_json::json!({
            "choices":[{"message":{"content":"hi"},"finish_reason":"length"}]
        });
        assert_eq!(
            extract_choice(&value, "message"),
            (Some("hi".to_string()), Some("length".to_string()))
        );
    }
}
