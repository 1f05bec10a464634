use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::content::{GeneratedImage, GenerationRequest, GenerationResult, ImageRequest};
use crate::errors::{HarnessError, ProviderError};
use crate::model::{Credential, ProviderId};
use crate::provider::ProviderAdapter;
use crate::run::{TokenSink, drive_stream};
use crate::vendors::{self, VendorSettings};

pub(crate) struct HarnessInner {
    providers: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

/// Registry of vendor adapters and the single entry point for calls.
#[derive(Clone)]
pub struct Harness {
    pub(crate) inner: Arc<HarnessInner>,
}

impl Harness {
    /// Starts a builder for registering providers and creating a `Harness`.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Looks up the adapter for `id`. Unknown ids are a 400-class error.
    pub fn provider(&self, id: &ProviderId) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        self.inner
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::unknown_provider(id))
    }

    pub fn supports(&self, id: &ProviderId) -> bool {
        self.inner.providers.contains_key(id)
    }

    /// Registered provider ids in stable order.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.inner.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Single-shot generation.
    pub async fn call(
        &self,
        req: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        let provider = self.provider(&req.model.provider)?;
        req.validate()?;
        debug!(provider = %req.model.provider, model = %req.model.model, max_output_tokens = req.max_output_tokens, "starting generation call");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::cancelled(&req.model.provider)),
            result = provider.generate(req) => result,
        }
    }

    /// Streaming generation. Fragments go to `sink` as they arrive; the return
    /// value matches what [`Harness::call`] would have produced.
    pub async fn call_streaming(
        &self,
        req: &GenerationRequest,
        sink: &mut dyn TokenSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError> {
        let provider = self.provider(&req.model.provider)?;
        req.validate()?;
        debug!(provider = %req.model.provider, model = %req.model.model, max_output_tokens = req.max_output_tokens, "starting streaming generation call");
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::cancelled(&req.model.provider)),
            handle = provider.start_stream(req) => handle?,
        };
        drive_stream(req.model.provider.clone(), handle, sink, cancel).await
    }

    pub async fn list_models(
        &self,
        id: &ProviderId,
        credential: &Credential,
    ) -> Result<Vec<String>, ProviderError> {
        let provider = self.provider(id)?;
        provider.list_models(credential).await
    }

    pub async fn generate_image(
        &self,
        req: &ImageRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedImage, ProviderError> {
        let provider = self.provider(&req.model.provider)?;
        if req.prompt.trim().is_empty() {
            return Err(ProviderError::invalid(
                &req.model.provider,
                "image prompt must not be empty",
            ));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::cancelled(&req.model.provider)),
            result = provider.generate_image(req) => result,
        }
    }
}

/// Builder used to register provider adapters before creating a `Harness`.
#[derive(Default)]
pub struct HarnessBuilder {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl HarnessBuilder {
    /// Registers a provider adapter. One adapter per provider id.
    pub fn register_provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Registers the bundled `openai`, `anthropic`, `google` and `mistral` bindings.
    pub fn with_default_vendors(mut self, settings: &VendorSettings) -> Result<Self, HarnessError> {
        self.providers.extend(vendors::default_adapters(settings)?);
        Ok(self)
    }

    /// Builds the harness and rejects duplicate registrations.
    pub fn build(self) -> Result<Harness, HarnessError> {
        let mut map: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = HashMap::new();
        for provider in self.providers {
            let id = provider.id();
            if map.contains_key(&id) {
                return Err(HarnessError::Config(format!(
                    "duplicate provider registration: {id}"
                )));
            }
            map.insert(id, provider);
        }
        Ok(Harness {
            inner: Arc::new(HarnessInner { providers: map }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TokenUsage;
    use crate::model::ModelRef;
    use crate::provider::{ProviderEvent, ProviderStreamHandle};
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DummyProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for DummyProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("dummy")
        }

        async fn generate(
            &self,
            req: &GenerationRequest,
        ) -> Result<GenerationResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerationResult {
                text: format!("echo: {}", req.user_prompt),
                usage: TokenUsage::new(2, 0, 2),
                finish_reason: Some("stop".into()),
            })
        }

        async fn start_stream(
            &self,
            _req: &GenerationRequest,
        ) -> Result<ProviderStreamHandle, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderStreamHandle::new(Box::pin(stream::iter(vec![
                Ok(ProviderEvent::TextDelta { text: "ec".into() }),
                Ok(ProviderEvent::TextDelta { text: "ho".into() }),
                Ok(ProviderEvent::Completed {
                    text: None,
                    usage: TokenUsage::new(2, 0, 2),
                    finish_reason: None,
                }),
            ]))))
        }

        async fn list_models(&self, _credential: &Credential) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["dummy-1".into()])
        }
    }

    fn harness(calls: Arc<AtomicUsize>) -> Harness {
        Harness::builder()
            .register_provider(Arc::new(DummyProvider { calls }))
            .build()
            .expect("build harness")
    }

    fn request(provider: &str) -> GenerationRequest {
        GenerationRequest::new(ModelRef::new(provider, "m"), Credential::new("k"), "hi")
    }

    #[test]
    fn build_rejects_duplicate_provider_ids() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = Harness::builder()
            .register_provider(Arc::new(DummyProvider {
                calls: calls.clone(),
            }))
            .register_provider(Arc::new(DummyProvider { calls }))
            .build();
        assert!(
            matches!(result, Err(HarnessError::Config(message)) if message.contains("duplicate provider"))
        );
    }

    #[tokio::test]
    async fn unknown_vendor_is_a_400_provider_error() {
        let harness = harness(Arc::new(AtomicUsize::new(0)));
        let err = harness
            .call(&request("cohere"), &CancellationToken::new())
            .await
            .expect_err("unknown vendor");
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn streaming_and_single_shot_agree_on_text() {
        let harness = harness(Arc::new(AtomicUsize::new(0)));
        let single = harness
            .call(&request("dummy"), &CancellationToken::new())
            .await
            .expect("call");
        let mut sink: Vec<String> = Vec::new();
        let streamed = harness
            .call_streaming(&request("dummy"), &mut sink, &CancellationToken::new())
            .await
            .expect("stream");
        assert_eq!(single.text, "echo: hi");
        assert_eq!(streamed.text, "echo");
        assert_eq!(sink.concat(), streamed.text);
        assert_eq!(single.usage, streamed.usage);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_vendor_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let harness = harness(calls.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = harness
            .call(&request("dummy"), &cancel)
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn image_generation_defaults_to_unsupported() {
        let harness = harness(Arc::new(AtomicUsize::new(0)));
        let err = harness
            .generate_image(
                &ImageRequest::new(ModelRef::new("dummy", "img"), Credential::new("k"), "a cat"),
                &CancellationToken::new(),
            )
            .await
            .expect_err("unsupported");
        assert!(err.message().contains("image generation"));
    }
}
