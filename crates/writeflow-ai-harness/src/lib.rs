//! Vendor-neutral generation harness with a builder-first async API.
//!
//! One [`GenerationRequest`] shape goes in, one [`GenerationResult`] shape
//! comes out, regardless of which vendor serves the call. Vendor bindings
//! live under `vendors::*` and are registered on a [`Harness`].
//!
//! # Usage
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use writeflow_ai_harness::prelude::*;
//! use writeflow_ai_harness::vendors::VendorSettings;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let harness = Harness::builder()
//!     .with_default_vendors(&VendorSettings::default())?
//!     .build()?;
//!
//! let request = GenerationRequest::new(
//!     ModelRef::new("openai", "gpt-4o-mini"),
//!     Credential::new(std::env::var("OPENAI_API_KEY")?),
//!     "Say hello",
//! )
//! .system_prompt("Answer briefly.")
//! .max_output_tokens(64);
//!
//! let mut chunks: Vec<String> = Vec::new();
//! let result = harness
//!     .call_streaming(&request, &mut chunks, &CancellationToken::new())
//!     .await?;
//! println!("{} ({} tokens)", result.text, result.usage.total_tokens);
//! # Ok(())
//! # }
//! ```

/// Model catalog cache (available models per vendor).
pub mod catalog;
/// Request/response types shared by every vendor.
pub mod content;
/// Public error types used by the harness API.
pub mod errors;
/// Harness registry and builder.
pub mod harness;
/// Model, provider and credential identifiers.
pub mod model;
/// Common imports for typical usage.
pub mod prelude;
/// Provider adapter contract implemented by vendor bindings.
pub mod provider;
/// Streaming driver and token sinks.
pub mod run;
/// Vendor-specific wire bindings.
pub mod vendors;

pub use catalog::ModelCatalog;
pub use content::{GeneratedImage, GenerationRequest, GenerationResult, ImageRequest, TokenUsage};
pub use errors::{ErrorClass, HarnessError, ProviderError};
pub use harness::{Harness, HarnessBuilder};
pub use model::{Credential, ModelRef, ProviderId};
pub use provider::{ProviderAdapter, ProviderEvent, ProviderEventStream, ProviderStreamHandle};
pub use run::TokenSink;
