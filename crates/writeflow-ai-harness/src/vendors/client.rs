use std::pin::Pin;
use std::time::Duration;

use crate::errors::{HarnessError, ProviderError};
use crate::model::ProviderId;

pub(crate) type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// HTTP settings for one vendor binding.
#[derive(Clone, Debug)]
pub struct VendorClientConfig {
    /// Base URL of the vendor endpoint. Useful for proxies or local test servers.
    pub base_url: String,
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
}

impl VendorClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn build_client(&self, vendor: &str) -> Result<reqwest::Client, HarnessError> {
        if self.base_url.trim().is_empty() {
            return Err(HarnessError::Config(format!(
                "{vendor} base_url must not be empty"
            )));
        }
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build {vendor} client: {e}")))
    }
}

/// Sends a request and turns non-success statuses into [`ProviderError`].
pub(crate) async fn send(
    provider: &ProviderId,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(|e| {
        ProviderError::transport(provider, format!("{provider} request failed: {e}"))
    })?;
    if response.status().is_success() {
        return Ok(response);
    }
    Err(error_from_response(provider, response).await)
}

pub(crate) async fn read_json(
    provider: &ProviderId,
    response: reqwest::Response,
) -> Result<serde_json::Value, ProviderError> {
    let body = response.text().await.map_err(|e| {
        ProviderError::transport(provider, format!("{provider} response read failed: {e}"))
    })?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::protocol(provider, format!("invalid JSON response: {e}")))
}

pub(crate) fn byte_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream())
}

async fn error_from_response(provider: &ProviderId, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or_else(|| {
        format!("{provider} request failed with status {}", status.as_u16())
    });
    ProviderError::provider(provider, message, Some(status.as_u16()))
}

/// Pulls a human-readable message out of the error body shapes the bundled
/// vendors use.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let value = match value {
        serde_json::Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    let candidates = [
        value.get("error").and_then(|e| e.get("message")),
        value.get("error").filter(|e| e.is_string()),
        value.get("message"),
        value.get("detail").filter(|d| d.is_string()),
        value
            .get("detail")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|d| d.get("msg")),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

/// Maps a vendor error code found inside a stream to the HTTP status it
/// would have carried as a plain response.
pub(crate) fn status_for_error_code(code: &str) -> Option<u16> {
    let code = code.to_ascii_lowercase();
    if code.contains("rate_limit") || code.contains("resource_exhausted") || code.contains("overloaded") {
        return Some(429);
    }
    if code.contains("auth") || code.contains("api_key") || code.contains("permission") {
        return Some(401);
    }
    if code.contains("invalid") {
        return Some(400);
    }
    None
}

/// `{"data":[{"id":..}]}` as returned by OpenAI-compatible model listings.
pub(crate) fn model_ids(value: &serde_json::Value) -> Vec<String> {
    value
        .get("data")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(|v| v.as_str()))
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_error_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("Incorrect API key provided")
        );
    }

    #[test]
    fn extracts_flat_and_detail_messages() {
        assert_eq!(
            extract_error_message(r#"{"object":"error","message":"Unauthorized"}"#).as_deref(),
            Some("Unauthorized")
        );
        assert_eq!(
            extract_error_message(r#"{"detail":[{"msg":"field required"}]}"#).as_deref(),
            Some("field required")
        );
        assert_eq!(
            extract_error_message(r#"[{"error":{"code":400,"message":"API key not valid"}}]"#)
                .as_deref(),
            Some("API key not valid")
        );
    }

    #[test]
    fn unparseable_bodies_yield_none() {
        assert_eq!(extract_error_message("<html>bad gateway</html>"), None);
        assert_eq!(extract_error_message(r#"{"error":{"message":"  "}}"#), None);
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let config = VendorClientConfig::new("http://localhost:9000/");
        assert_eq!(
            config.endpoint("/v1/models"),
            "http://localhost:9000/v1/models"
        );
    }

    #[test]
    fn stream_error_codes_map_to_statuses() {
        assert_eq!(status_for_error_code("rate_limit_error"), Some(429));
        assert_eq!(status_for_error_code("authentication_error"), Some(401));
        assert_eq!(status_for_error_code("server_error"), None);
    }

    #[test]
    fn model_ids_reads_data_array() {
        let value = serde_json::json!({"data":[{"id":"gpt-4o"},{"id":"dall-e-3"},{"object":"x"}]});
        assert_eq!(model_ids(&value), vec!["gpt-4o", "dall-e-3"]);
    }
}
