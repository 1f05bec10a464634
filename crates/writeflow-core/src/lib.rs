//! Content generation pipeline built on `writeflow-ai-harness`.
//!
//! A request names a content brief and optionally a workflow of agent stages.
//! The [`Orchestrator`] resolves a model and credential per stage, runs the
//! stages in order (each stage's output becomes the next stage's input), and
//! reports progress as [`ProgressEvent`]s through an [`EventSink`].

pub mod chat;
pub mod collaborators;
pub mod definition;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod pricing;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod stage;

pub use chat::{ChatReply, PreparedChat};
pub use definition::{
    Agent, ChatRequest, CodeRequest, ContentBrief, ContentLength, PipelineRequest, Stage,
    StageShape, TaskType, WorkflowDefinition,
};
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorSettings, PreparedRun};
pub use progress::{ChatEvent, EventSink, ProgressEvent, RunComplete, WireEvent};
pub use run::{PipelineRun, RunState, StageRecord};
pub use stage::ImageSettings;
