use tracing::debug;

use crate::content::{GeneratedImage, GenerationRequest, GenerationResult, ImageRequest};
use crate::errors::{HarnessError, ProviderError};
use crate::model::{Credential, ProviderId};
use crate::provider::{ProviderAdapter, ProviderStreamHandle};
use crate::vendors::client::{self, VendorClientConfig};
use crate::vendors::sse::sse_event_stream;

use super::images;
use super::transport::{OpenAiFrameMapper, extract_output_text, extract_usage, finish_reason};

pub(crate) const OPENAI_PROVIDER: &str = "openai";

/// Provider adapter for OpenAI's Responses API plus image generation.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: VendorClientConfig,
}

impl OpenAiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(config: VendorClientConfig) -> Result<Self, HarnessError> {
        let client = config.build_client(OPENAI_PROVIDER)?;
        Ok(Self { client, config })
    }

    fn provider_id() -> ProviderId {
        ProviderId::new(OPENAI_PROVIDER)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn id(&self) -> ProviderId {
        Self::provider_id()
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        let provider_id = Self::provider_id();
        let body = build_request_body(req, false);
        let http_req = self
            .client
            .post(self.config.endpoint("/v1/responses"))
            .bearer_auth(req.credential.expose())
            .json(&body);
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        Ok(GenerationResult {
            text: extract_output_text(&value).unwrap_or_default(),
            usage: extract_usage(&value),
            finish_reason: finish_reason(&value),
        })
    }

    async fn start_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = Self::provider_id();
        debug!(model = %req.model.model, "starting OpenAI responses stream");
        let body = build_request_body(req, true);
        let http_req = self
            .client
            .post(self.config.endpoint("/v1/responses"))
            .bearer_auth(req.credential.expose())
            .json(&body);
        let response = client::send(&provider_id, http_req).await?;
        Ok(ProviderStreamHandle::new(sse_event_stream(
            provider_id.clone(),
            client::byte_stream(response),
            OpenAiFrameMapper::new(provider_id),
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

    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, ProviderError> {
        images::generate(&self.client, &self.config, req).await
    }
}

pub(crate) fn build_request_body(req: &GenerationRequest, stream: bool) -> serde_json::Value {
    let mut input = Vec::new();
    if let Some(system_prompt) = req.system_text() {
        input.push(serde_json::json!({
            "role": "system",
            "content": system_prompt,
        }));
    }
    input.push(serde_json::json!({
        "role": "user",
        "content": req.user_prompt,
    }));

    serde_json::json!({
        "model": req.model.model,
        "input": input,
        "max_output_tokens": req.max_output_tokens,
        "stream": stream,
        "store": false,
    })
}
