//! Common imports for typical harness usage.
pub use crate::{
    Credential, ErrorClass, GenerationRequest, GenerationResult, Harness, HarnessBuilder,
    HarnessError, ModelRef, ProviderError, ProviderId, TokenSink, TokenUsage,
};
