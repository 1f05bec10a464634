use tracing::debug;

use crate::content::{GenerationRequest, GenerationResult};
use crate::errors::{HarnessError, ProviderError};
use crate::model::{Credential, ProviderId};
use crate::provider::{ProviderAdapter, ProviderStreamHandle};
use crate::vendors::client::{self, VendorClientConfig};
use crate::vendors::sse::sse_event_stream;

use super::transport::{GoogleFrameMapper, extract_finish_reason, extract_text, extract_usage};

const GOOGLE_PROVIDER: &str = "google";

/// Provider adapter for the Gemini `generateContent` API.
pub struct GoogleProvider {
    client: reqwest::Client,
    config: VendorClientConfig,
}

impl GoogleProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(config: VendorClientConfig) -> Result<Self, HarnessError> {
        let client = config.build_client(GOOGLE_PROVIDER)?;
        Ok(Self { client, config })
    }

    fn provider_id() -> ProviderId {
        ProviderId::new(GOOGLE_PROVIDER)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for GoogleProvider {
    fn id(&self) -> ProviderId {
        Self::provider_id()
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        let provider_id = Self::provider_id();
        let url = self
            .config
            .endpoint(&format!("/v1beta/models/{}:generateContent", req.model.model));
        let http_req = self
            .client
            .post(url)
            .header("x-goog-api-key", req.credential.expose())
            .json(&build_request_body(req));
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        Ok(GenerationResult {
            text: extract_text(&value),
            usage: extract_usage(&value).unwrap_or_default(),
            finish_reason: extract_finish_reason(&value),
        })
    }

    async fn start_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = Self::provider_id();
        debug!(model = %req.model.model, "starting Gemini content stream");
        let url = self.config.endpoint(&format!(
            "/v1beta/models/{}:streamGenerateContent?alt=sse",
            req.model.model
        ));
        let http_req = self
            .client
            .post(url)
            .header("x-goog-api-key", req.credential.expose())
            .json(&build_request_body(req));
        let response = client::send(&provider_id, http_req).await?;
        Ok(ProviderStreamHandle::new(sse_event_stream(
            provider_id.clone(),
            client::byte_stream(response),
            GoogleFrameMapper::new(provider_id),
        )))
    }

    async fn list_models(&self, credential: &Credential) -> Result<Vec<String>, ProviderError> {
        let provider_id = Self::provider_id();
        let http_req = self
            .client
            .get(self.config.endpoint("/v1beta/models"))
            .header("x-goog-api-key", credential.expose());
        let response = client::send(&provider_id, http_req).await?;
        let value = client::read_json(&provider_id, response).await?;
        Ok(model_names(&value))
    }
}

fn build_request_body(req: &GenerationRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": req.user_prompt }] }],
        "generationConfig": { "maxOutputTokens": req.max_output_tokens },
    });
    if let Some(system) = req.system_text() {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
    }
    body
}

fn model_names(value: &serde_json::Value) -> Vec<String> {
    value
        .get("models")
        .and_then(|v| v.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(|v| v.as_str()))
                .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRef;

    #[test]
    fn request_body_uses_gemini_field_names() {
        let req = GenerationRequest::new(
            ModelRef::new("google", "gemini-1.5-flash"),
            Credential::new("k"),
            "hello",
        )
        .system_prompt("sys")
        .max_output_tokens(4000);
        let body = build_request_body(&req);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
    }

    #[test]
    fn model_names_drop_resource_prefix() {
        let value = serde_json::json!({"models":[{"name":"models/gemini-1.5-pro"},{"name":"gemini-2.0-flash"}]});
        assert_eq!(model_names(&value), vec!["gemini-1.5-pro", "gemini-2.0-flash"]);
    }
}
