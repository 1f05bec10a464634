use tracing::debug;

use crate::content::{GenerationRequest, GenerationResult};
use crate::errors::{HarnessError, ProviderError};
use crate::model::{Credential, ProviderId};
use crate::provider::{ProviderAdapter, ProviderStreamHandle};
use crate::vendors::client::{self, VendorClientConfig};
use crate::vendors::sse::sse_event_stream;

use super::transport::{MistralFrameMapper, extract_choice, extract_usage};

const MISTRAL_PROVIDER: &str = "mistral";

/// Provider adapter for Mistral's chat-completions API.
pub struct MistralProvider {
    client: reqwest::Client,
    config: VendorClientConfig,
}

impl MistralProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.mistral.ai";

    pub fn new(config: VendorClientConfig) -> Result<Self, HarnessError> {
        let client = config.build_client(MISTRAL_PROVIDER)?;
        Ok(Self { client, config })
    }

    fn provider_id() -> ProviderId {
        ProviderId::new(MISTRAL_PROVIDER)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MistralProvider {
    fn id(&self) -> ProviderId {
        Self::provider_id()
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        let provider_id = Self::provider_id();
        let http_req = self
            .client
            .post(self.config.endpoint("/v1/chat/completions"))
            .bearer_auth(req.credential.expose())
            .json(&build_request_body(req, false));
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        let (text, finish_reason) = extract_choice(&value, "message");
        Ok(GenerationResult {
            text: text.unwrap_or_default(),
            usage: extract_usage(&value).unwrap_or_default(),
            finish_reason,
        })
    }

    async fn start_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = Self::provider_id();
        debug!(model = %req.model.model, "starting Mistral chat stream");
        let http_req = self
            .client
            .post(self.config.endpoint("/v1/chat/completions"))
            .bearer_auth(req.credential.expose())
            .json(&build_request_body(req, true));
        let response = client::send(&provider_id, http_req).await?;
        Ok(ProviderStreamHandle::new(sse_event_stream(
            provider_id.clone(),
            client::byte_stream(response),
            MistralFrameMapper::new(provider_id),
        )))
    }

    async fn list_models(&self, credential: &Credential) -> Result<Vec<String>, ProviderError> {
        let provider_id = Self::provider_id();
        let http_req = self
            .client
            .get(self.config.endpoint("/v1/models"))
            .bearer_auth(credential.expose());
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        Ok(client::model_ids(&value))
    }
}

fn build_request_body(req: &GenerationRequest, stream: bool) -> serde_json::Value {
    let mut messages = Vec::new();
    if let Some(system) = req.system_text() {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": req.user_prompt }));
    serde_json::json!({
        "model": req.model.model,
        "messages": messages,
        "max_tokens": req.max_output_tokens,
        "stream": stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRef;

    #[test]
    fn request_body_is_chat_completions_shape() {
        let req = GenerationRequest::new(
            ModelRef::new("mistral", "mistral-small-latest"),
            Credential::new("k"),
            "hello",
        )
        .system_prompt("sys");
        let body = build_request_body(&req, true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], GenerationRequest::DEFAULT_MAX_OUTPUT_TOKENS);
        assert_eq!(body["stream"], true);
    }
}
