//! Seams to systems outside the pipeline, each with a small default
//! implementation so the service runs end to end without them.

mod analysis;
mod credentials;
mod routing;
mod storage;
mod workflows;

pub use analysis::{ContentAnalyzer, ContentMetrics, DefaultContentAnalyzer, StaticWritingTips, WritingTips};
pub use credentials::{CredentialStore, MemoryCredentialStore, VENDOR_KEY_ENVS};
pub use routing::{DefaultModelRouter, ModelRouter, ResolvedModel, infer_vendor};
pub use storage::{
    BlobStore, InMemoryBlobStore, InMemoryRecorder, MemoryRecord, RunRecorder, StoredBlob,
    UsageRecord,
};
pub use workflows::{StaticWorkflowStore, WorkflowStore};
