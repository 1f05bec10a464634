use crate::content::TokenUsage;
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::ProviderEvent;
use crate::vendors::client::status_for_error_code;
use crate::vendors::sse::{FrameMapper, SseFrame};

/// Anthropic reports input tokens in `message_start` and output tokens in
/// `message_delta`, so the mapper carries both until `message_stop`.
pub(super) struct AnthropicFrameMapper {
    provider: ProviderId,
    input_tokens: u64,
    output_tokens: u64,
    stop_reason: Option<String>,
    completed: bool,
}

impl AnthropicFrameMapper {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: None,
            completed: false,
        }
    }

    fn completed(&mut self) -> ProviderEvent {
        self.completed = true;
        ProviderEvent::Completed {
            text: None,
            usage: TokenUsage::new(self.input_tokens, 0, self.output_tokens),
            finish_reason: self.stop_reason.clone(),
        }
    }
}

impl FrameMapper for AnthropicFrameMapper {
    fn map_frame(&mut self, frame: &SseFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        let Some(value) = frame.json(&self.provider)? else {
            return Ok(Vec::new());
        };
        let event_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .or(frame.event.as_deref())
            .unwrap_or_default();
        match event_type {
            "message_start" => {
                if let Some(usage) = value.get("message").and_then(|m| m.get("usage")) {
                    self.input_tokens = count(usage, "input_tokens");
                    self.output_tokens = count(usage, "output_tokens");
                }
                Ok(Vec::new())
            }
            "content_block_delta" => {
                let delta = value.get("delta");
                let is_text = delta
                    .and_then(|d| d.get("type"))
                    .and_then(|v| v.as_str())
                    .is_none_or(|t| t == "text_delta");
                match delta.and_then(|d| d.get("text")).and_then(|v| v.as_str()) {
                    Some(text) if is_text => Ok(vec![ProviderEvent::TextDelta {
                        text: text.to_string(),
                    }]),
                    _ => Ok(Vec::new()),
                }
            }
            "message_delta" => {
                if let Some(usage) = value.get("usage") {
                    self.output_tokens = count(usage, "output_tokens");
                }
                if let Some(reason) = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|v| v.as_str())
                {
                    self.stop_reason = Some(reason.to_string());
                }
                Ok(Vec::new())
            }
            "message_stop" => Ok(vec![self.completed()]),
            "error" => {
                let error = value.get("error");
                let message = error
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("Anthropic stream error");
                let status = error
                    .and_then(|e| e.get("type"))
                    .and_then(|v| v.as_str())
                    .and_then(status_for_error_code);
                Err(ProviderError::provider(&self.provider, message, status))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn finish(&mut self) -> Result<Vec<ProviderEvent>, ProviderError> {
        // A stream cut after the final delta still carries usable accounting.
        if !self.completed && self.stop_reason.is_some() {
            return Ok(vec![self.completed()]);
        }
        Ok(Vec::new())
    }
}

fn count(usage: &serde_json::Value, key: &str) -> u64 {
    usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

pub(super) fn extract_text(value: &serde_json::Value) -> String {
    value
        .get("content")
        .and_then(|v| v.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

pub(super) fn extract_usage(value: &serde_json::Value) -> TokenUsage {
    match value.get("usage") {
        Some(usage) => TokenUsage::new(
            count(usage, "input_tokens"),
            0,
            count(usage, "output_tokens"),
        ),
        None => TokenUsage::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: serde_json::Value) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn accumulates_usage_across_events() {
        let mut mapper = AnthropicFrameMapper::new(ProviderId::new("anthropic"));
        let start = frame(
            "message_start",
            serde_json::json!({"type":"message_start","message":{"usage":{"input_tokens":12,"output_tokens":1}}}),
        );
        assert!(mapper.map_frame(&start).expect("start").is_empty());

        let delta = frame(
            "content_block_delta",
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hey"}}),
        );
        assert_eq!(
            mapper.map_frame(&delta).expect("delta"),
            vec![ProviderEvent::TextDelta { text: "Hey".into() }]
        );

        let message_delta = frame(
            "message_delta",
            serde_json::json!({"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":9}}),
        );
        assert!(mapper.map_frame(&message_delta).expect("message_delta").is_empty());

        let stop = frame("message_stop", serde_json::json!({"type":"message_stop"}));
        assert_eq!(
            mapper.map_frame(&stop).expect("stop"),
            vec![ProviderEvent::Completed {
                text: None,
                usage: TokenUsage::new(12, 0, 9),
                finish_reason: Some("end_turn".into()),
            }]
        );
        assert!(mapper.finish().expect("finish").is_empty());
    }

    #[test]
    fn overloaded_error_maps_to_retry_status() {
        let mut mapper = AnthropicFrameMapper::new(ProviderId::new("anthropic"));
        let err = mapper
            .map_frame(&frame(
                "error",
                serde_json::json!({"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}),
            ))
            .expect_err("error frame");
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.message(), "Overloaded");
    }

    #[test]
    fn single_shot_text_joins_text_blocks() {
        let value = serde_json::json!({
            "content":[{"type":"text","text":"a"},{"type":"tool_use"},{"type":"text","text":"b"}],
            "usage":{"input_tokens":3,"output_tokens":2}
        });
        assert_eq!(extract_text(&value), "ab");
        assert_eq!(extract_usage(&value).total_tokens, 5);
    }
}
