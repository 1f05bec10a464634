use crate::content::TokenUsage;
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;
use crate::vendors::client::status_for_error_code;
use crate::vendors::sse::{FrameMapper, SseFrame};

pub(crate) struct OpenAiFrameMapper {
    provider: ProviderId,
}

impl OpenAiFrameMapper {
    pub fn new(provider: ProviderId) -> Self {
        Self { provider }
    }
}

impl FrameMapper for OpenAiFrameMapper {
    fn map_frame(&mut self, frame: &SseFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        match frame.json(&self.provider)? {
            Some(value) => map_openai_json_to_events(&self.provider, &value),
            None => Ok(Vec::new()),
        }
    }
}

pub(crate) fn map_openai_json_to_events(
    provider: &ProviderId,
    value: &serde_json::Value,
) -> Result<Vec<ProviderEvent>, ProviderError> {
    let Some(event_type) = value.get("type").and_then(|v| v.as_str()) else {
        return Ok(Vec::new());
    };
    match event_type {
        "response.output_text.delta" => {
            if let Some(delta) = value.get("delta").and_then(|v| v.as_str()) {
                Ok(vec![ProviderEvent::TextDelta {
                    text: delta.to_string(),
                }])
            } else {
                Ok(Vec::new())
            }
        }
        "response.completed" | "response.incomplete" => {
            let response = value.get("response").unwrap_or(value);
            Ok(vec![ProviderEvent::Completed {
                text: extract_output_text(response),
                usage: extract_usage(response),
                finish_reason: finish_reason(response),
            }])
        }
        "error" | "response.error" | "response.failed" => {
            let error = value
                .get("error")
                .or_else(|| value.get("response").and_then(|r| r.get("error")));
            let message = error
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .or_else(|| value.get("message").and_then(|v| v.as_str()))
                .unwrap_or("OpenAI stream error");
            let status = error
                .and_then(|e| e.get("code"))
                .and_then(|v| v.as_str())
                .and_then(status_for_error_code);
            Err(ProviderError::provider(provider, message, status))
        }
        _ => Ok(Vec::new()),
    }
}

pub(crate) fn finish_reason(response: &serde_json::Value) -> Option<String> {
    response
        .get("incomplete_details")
        .and_then(|d| d.get("reason"))
        .and_then(|v| v.as_str())
        .or_else(|| response.get("status").and_then(|v| v.as_str()))
        .map(ToOwned::to_owned)
}

/// Responses API usage: `input_tokens` includes the cached part.
pub(crate) fn extract_usage(response: &serde_json::Value) -> TokenUsage {
    let Some(usage) = response.get("usage") else {
        return TokenUsage::default();
    };
    let count = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_u64()).unwrap_or(0);
    TokenUsage::from_prompt_including_cached(
        count(usage.get("input_tokens")),
        count(
            usage
                .get("input_tokens_details")
                .and_then(|d| d.get("cached_tokens")),
        ),
        count(usage.get("output_tokens")),
    )
}

pub(crate) fn extract_output_text(response: &serde_json::Value) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(items) = response.get("output").and_then(|v| v.as_array()) {
        for item in items {
            if item.get("type").and_then(|v| v.as_str()) != Some("message") {
                continue;
            }
            if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
                for c in content {
                    if let Some(text) = c.get("text").and_then(|v| v.as_str()) {
                        parts.push(text.to_string());
                    }
                }
            }
        }
    }
    if !parts.is_empty() {
        return Some(parts.join(""));
    }
    response
        .get("output_text")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}
