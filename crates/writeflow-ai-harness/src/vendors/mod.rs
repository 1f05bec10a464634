/// Anthropic Messages API binding.
pub mod anthropic;
mod client;
/// Google Gemini `generateContent` binding.
pub mod google;
/// Mistral chat-completions binding.
pub mod mistral;
/// OpenAI Responses and Images API binding.
pub mod openai;
pub(crate) mod sse;

use std::sync::Arc;

pub use client::VendorClientConfig;

use crate::errors::HarnessError;
use crate::provider::ProviderAdapter;

pub const OPENAI: &str = "openai";
pub const ANTHROPIC: &str = "anthropic";
pub const GOOGLE: &str = "google";
pub const MISTRAL: &str = "mistral";

/// Per-vendor HTTP settings for the bundled bindings.
#[derive(Clone, Debug)]
pub struct VendorSettings {
    pub openai: VendorClientConfig,
    pub anthropic: VendorClientConfig,
    pub google: VendorClientConfig,
    pub mistral: VendorClientConfig,
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            openai: VendorClientConfig::new(openai::OpenAiProvider::DEFAULT_BASE_URL),
            anthropic: VendorClientConfig::new(anthropic::AnthropicProvider::DEFAULT_BASE_URL),
            google: VendorClientConfig::new(google::GoogleProvider::DEFAULT_BASE_URL),
            mistral: VendorClientConfig::new(mistral::MistralProvider::DEFAULT_BASE_URL),
        }
    }
}

/// Builds one adapter per bundled vendor.
pub fn default_adapters(
    settings: &VendorSettings,
) -> Result<Vec<Arc<dyn ProviderAdapter>>, HarnessError> {
    Ok(vec![
        Arc::new(openai::OpenAiProvider::new(settings.openai.clone())?),
        Arc::new(anthropic::AnthropicProvider::new(settings.anthropic.clone())?),
        Arc::new(google::GoogleProvider::new(settings.google.clone())?),
        Arc::new(mistral::MistralProvider::new(settings.mistral.clone())?),
    ])
}
