use std::ops::{Add, AddAssign};

use crate::errors::ProviderError;
use crate::model::{Credential, ModelRef};

/// Canonical input to one adapter call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub model: ModelRef,
    pub credential: Credential,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2_000;

    pub fn new(model: ModelRef, credential: Credential, user_prompt: impl Into<String>) -> Self {
        Self {
            model,
            credential,
            system_prompt: None,
            user_prompt: user_prompt.into(),
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Sets the system prompt. Blank prompts are dropped.
    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.system_prompt = (!text.trim().is_empty()).then_some(text);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }

    /// Returns the trimmed system prompt when one is set.
    pub fn system_text(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub(crate) fn validate(&self) -> Result<(), ProviderError> {
        let provider = &self.model.provider;
        if self.model.model.trim().is_empty() {
            return Err(ProviderError::invalid(provider, "model must not be empty"));
        }
        if self.credential.is_blank() {
            return Err(ProviderError::provider(
                provider,
                format!("no credential supplied for {provider}"),
                Some(401),
            ));
        }
        if self.user_prompt.trim().is_empty() {
            return Err(ProviderError::invalid(provider, "user prompt must not be empty"));
        }
        if self.max_output_tokens == 0 {
            return Err(ProviderError::invalid(
                provider,
                "max_output_tokens must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Token accounting normalized across vendors.
///
/// `input_tokens` counts only the uncached part of the prompt, so
/// `total_tokens == input_tokens + cached_input_tokens + output_tokens` always
/// holds. Vendors that do not report cached tokens contribute zero.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, cached_input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            cached_input_tokens,
            output_tokens,
            total_tokens: input_tokens + cached_input_tokens + output_tokens,
        }
    }

    /// Builds usage from a prompt count that already includes the cached part.
    pub fn from_prompt_including_cached(prompt_tokens: u64, cached: u64, output: u64) -> Self {
        let cached = cached.min(prompt_tokens);
        Self::new(prompt_tokens - cached, cached, output)
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage::new(
            self.input_tokens + rhs.input_tokens,
            self.cached_input_tokens + rhs.cached_input_tokens,
            self.output_tokens + rhs.output_tokens,
        )
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

/// Aggregate output of one adapter call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub usage: TokenUsage,
    /// Vendor-specific finish reason when available (for example `stop`).
    pub finish_reason: Option<String>,
}

/// Input to an image-generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRequest {
    pub model: ModelRef,
    pub credential: Credential,
    pub prompt: String,
    /// Resolution such as `1024x1024`.
    pub size: String,
}

impl ImageRequest {
    pub const DEFAULT_SIZE: &'static str = "1024x1024";

    pub fn new(model: ModelRef, credential: Credential, prompt: impl Into<String>) -> Self {
        Self {
            model,
            credential,
            prompt: prompt.into(),
            size: Self::DEFAULT_SIZE.to_string(),
        }
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

/// Raw image produced by a vendor.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Prompt as rewritten by the vendor, when it reports one.
    pub revised_prompt: Option<String>,
}
