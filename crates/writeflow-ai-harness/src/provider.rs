use std::pin::Pin;

use crate::content::{GeneratedImage, GenerationRequest, GenerationResult, ImageRequest, TokenUsage};
use crate::errors::ProviderError;
use crate::model::{Credential, ProviderId};

/// Normalized events produced by a vendor stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    /// Incremental text output chunk.
    TextDelta { text: String },
    /// Terminal event carrying final accounting.
    ///
    /// `text` is the vendor's own aggregate when it sends one; deltas win when
    /// both are present.
    Completed {
        text: Option<String>,
        usage: TokenUsage,
        finish_reason: Option<String>,
    },
}

pub type ProviderEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<ProviderEvent, ProviderError>> + Send + 'static>>;

/// Open vendor stream returned by [`ProviderAdapter::start_stream`].
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
}

impl ProviderStreamHandle {
    pub fn new(stream: ProviderEventStream) -> Self {
        Self { stream }
    }
}

/// Contract every vendor binding implements.
///
/// Adding a vendor means implementing this trait and registering the adapter
/// on a [`crate::HarnessBuilder`]; nothing upstream changes.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Single-shot generation.
    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, ProviderError>;

    /// Opens an incremental stream. Status errors surface here, before any
    /// event is produced.
    async fn start_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<ProviderStreamHandle, ProviderError>;

    /// Model ids the credential can use.
    async fn list_models(&self, credential: &Credential) -> Result<Vec<String>, ProviderError>;

    async fn generate_image(&self, _req: &ImageRequest) -> Result<GeneratedImage, ProviderError> {
        Err(ProviderError::unsupported(self.id(), "image generation"))
    }
}
