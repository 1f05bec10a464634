use tracing::debug;

use crate::content::{GenerationRequest, GenerationResult};
use crate::errors::{HarnessError, ProviderError};
use crate::model::{Credential, ProviderId};
use crate::provider::{ProviderAdapter, ProviderStreamHandle};
use crate::vendors::client::{self, VendorClientConfig};
use crate::vendors::sse::sse_event_stream;

use super::transport::{AnthropicFrameMapper, extract_text, extract_usage};

const ANTHROPIC_PROVIDER: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider adapter for Anthropic's Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    config: VendorClientConfig,
}

impl AnthropicProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";

    pub fn new(config: VendorClientConfig) -> Result<Self, HarnessError> {
        let client = config.build_client(ANTHROPIC_PROVIDER)?;
        Ok(Self { client, config })
    }

    fn provider_id() -> ProviderId {
        ProviderId::new(ANTHROPIC_PROVIDER)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder, credential: &Credential) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn id(&self) -> ProviderId {
        Self::provider_id()
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        let provider_id = Self::provider_id();
        let http_req = self.authorized(
            self.client
                .post(self.config.endpoint("/v1/messages"))
                .json(&build_request_body(req, false)),
            &req.credential,
        );
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        Ok(GenerationResult {
            text: extract_text(&value),
            usage: extract_usage(&value),
            finish_reason: value
                .get("stop_reason")
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned),
        })
    }

    async fn start_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = Self::provider_id();
        debug!(model = %req.model.model, "starting Anthropic messages stream");
        let http_req = self.authorized(
            self.client
                .post(self.config.endpoint("/v1/messages"))
                .json(&build_request_body(req, true)),
            &req.credential,
        );
        let response = client::send(&provider_id, http_req).await?;
        Ok(ProviderStreamHandle::new(sse_event_stream(
            provider_id.clone(),
            client::byte_stream(response),
            AnthropicFrameMapper::new(provider_id),
        )))
    }

    async fn list_models(&self, credential: &Credential) -> Result<Vec<String>, ProviderError> {
        let provider_id = Self::provider_id();
        let http_req = self.authorized(
            self.client.get(self.config.endpoint("/v1/models")),
            credential,
        );
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        Ok(client::model_ids(&value))
    }
}

fn build_request_body(req: &GenerationRequest, stream: bool) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": req.model.model,
        "max_tokens": req.max_output_tokens,
        "messages": [{ "role": "user", "content": req.user_prompt }],
        "stream": stream,
    });
    if let Some(system) = req.system_text() {
        body["system"] = serde_json::json!(system);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRef;

    #[test]
    fn system_prompt_is_top_level_field() {
        let req = GenerationRequest::new(
            ModelRef::new("anthropic", "claude-3-5-haiku-latest"),
            Credential::new("k"),
            "hi",
        )
        .system_prompt("be terse")
        .max_output_tokens(1000);
        let body = build_request_body(&req, true);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn system_field_absent_without_system_prompt() {
        let req = GenerationRequest::new(
            ModelRef::new("anthropic", "claude-3-5-haiku-latest"),
            Credential::new("k"),
            "hi",
        );
        assert!(build_request_body(&req, false).get("system").is_none());
    }
}
