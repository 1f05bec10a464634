use crate::content::TokenUsage;
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;
use crate::vendors::client::status_for_error_code;
use crate::vendors::sse::{FrameMapper, SseFrame};

pub(super) struct GoogleFrameMapper {
    provider: ProviderId,
    usage: TokenUsage,
    finish_reason: Option<String>,
    saw_chunk: bool,
}

impl GoogleFrameMapper {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            usage: TokenUsage::default(),
            finish_reason: None,
            saw_chunk: false,
        }
    }
}

impl FrameMapper for GoogleFrameMapper {
    fn map_frame(&mut self, frame: &SseFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        let Some(value) = frame.json(&self.provider)? else {
            return Ok(Vec::new());
        };
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Gemini stream error");
            let status = error
                .get("code")
                .and_then(|v| v.as_u64())
                .and_then(|c| u16::try_from(c).ok())
                .or_else(|| {
                    error
                        .get("status")
                        .and_then(|v| v.as_str())
                        .and_then(status_for_error_code)
                });
            return Err(ProviderError::provider(&self.provider, message, status));
        }

        self.saw_chunk = true;
        // Every chunk repeats the running usage totals; the last one wins.
        if let Some(usage) = extract_usage(&value) {
            self.usage = usage;
        }
        if let Some(reason) = extract_finish_reason(&value) {
            self.finish_reason = Some(reason);
        }
        let text = extract_text(&value);
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ProviderEvent::TextDelta { text }])
    }

    fn finish(&mut self) -> Result<Vec<ProviderEvent>, ProviderError> {
        if !self.saw_chunk {
            return Ok(Vec::new());
        }
        Ok(vec![ProviderEvent::Completed {
            text: None,
            usage: self.usage,
            finish_reason: self.finish_reason.take(),
        }])
    }
}

pub(super) fn extract_text(value: &serde_json::Value) -> String {
    value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

pub(super) fn extract_finish_reason(value: &serde_json::Value) -> Option<String> {
    value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("finishReason"))
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

pub(super) fn extract_usage(value: &serde_json::Value) -> Option<TokenUsage> {
    let usage = value.get("usageMetadata")?;
    let count = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    Some(TokenUsage::new(
        count("promptTokenCount"),
        0,
        count("candidatesTokenCount"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(value: serde_json::Value) -> SseFrame {
        SseFrame {
            event: None,
            data: value.to_string(),
        }
    }

    #[test]
    fn completion_is_emitted_on_finish_with_last_usage() {
        let mut mapper = GoogleFrameMapper::new(ProviderId::new("google"));
        let first = data(serde_json::json!({
            "candidates":[{"content":{"parts":[{"text":"Hel"}]}}],
            "usageMetadata":{"promptTokenCount":8,"candidatesTokenCount":1}
        }));
        let second = data(serde_json::json!({
            "candidates":[{"content":{"parts":[{"text":"lo"}]},"finishReason":"STOP"}],
            "usageMetadata":{"promptTokenCount":8,"candidatesTokenCount":4}
        }));
        assert_eq!(
            mapper.map_frame(&first).expect("first"),
            vec![ProviderEvent::TextDelta { text: "Hel".into() }]
        );
        assert_eq!(mapper.map_frame(&second).expect("second").len(), 1);
        assert_eq!(
            mapper.finish().expect("finish"),
            vec![ProviderEvent::Completed {
                text: None,
                usage: TokenUsage::new(8, 0, 4),
                finish_reason: Some("STOP".into()),
            }]
        );
    }

    #[test]
    fn empty_body_produces_no_completion() {
        let mut mapper = GoogleFrameMapper::new(ProviderId::new("google"));
        assert!(mapper.finish().expect("finish").is_empty());
    }

    #[test]
    fn error_chunk_carries_numeric_status() {
        let mut mapper = GoogleFrameMapper::new(ProviderId::new("google"));
        let err = mapper
            .map_frame(&data(serde_json::json!({
                "error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}
            })))
            .expect_err("error chunk");
        assert_eq!(err.status(), Some(429));
    }
}
