use base64::Engine as _;

use crate::content::{GeneratedImage, ImageRequest};
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::vendors::client::{self, VendorClientConfig};

use super::adapter::OPENAI_PROVIDER;

pub(super) async fn generate(
    http: &reqwest::Client,
    config: &VendorClientConfig,
    req: &ImageRequest,
) -> Result<GeneratedImage, ProviderError> {
    let provider_id = ProviderId::new(OPENAI_PROVIDER);
    let http_req = http
        .post(config.endpoint("/v1/images/generations"))
        .bearer_auth(req.credential.expose())
        .json(&build_image_body(req));
    let response = client::send(&provider_id, http_req).await?;
    let value = client::read_json(&provider_id, response).await?;

    let item = value
        .get("data")
        .and_then(|v| v.as_array())
        .and_then(|items| items.first())
        .ok_or_else(|| ProviderError::protocol(&provider_id, "image response contained no data"))?;
    let revised_prompt = item
        .get("revised_prompt")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned);

    let bytes = if let Some(encoded) = item.get("b64_json").and_then(|v| v.as_str()) {
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::protocol(&provider_id, format!("invalid image payload: {e}")))?
    } else if let Some(url) = item.get("url").and_then(|v| v.as_str()) {
        let response = client::send(&provider_id, http.get(url)).await?;
        response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(&provider_id, format!("image download failed: {e}")))?
            .to_vec()
    } else {
        return Err(ProviderError::protocol(
            &provider_id,
            "image response had neither b64_json nor url",
        ));
    };

    Ok(GeneratedImage {
        bytes,
        mime_type: "image/png".to_string(),
        revised_prompt,
    })
}

pub(crate) fn build_image_body(req: &ImageRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": req.model.model,
        "prompt": req.prompt,
        "size": req.size,
        "n": 1,
    });
    // gpt-image models always return base64 and reject the field.
    if req.model.model.starts_with("dall-e") {
        body["response_format"] = serde_json::json!("b64_json");
    }
    body
}
