//! Stage executors: run exactly one stage of a pipeline.
//!
//! Every shape returns a [`StageOutput`] with the produced text, the token
//! breakdown and its cost. Only the last stage of a run is given a token sink;
//! earlier stages use single-shot calls.

mod code;
mod image;
mod text;

pub use image::ImageSettings;

use tokio_util::sync::CancellationToken;
use writeflow_ai_harness::{GenerationRequest, Harness, ModelRef, TokenSink, TokenUsage};

use crate::collaborators::{BlobStore, ResolvedModel};
use crate::definition::{ContentBrief, Stage, StageShape};
use crate::error::PipelineError;
use crate::pricing::CostAccumulator;

/// Everything one stage needs to run.
pub struct StageContext<'a> {
    pub harness: &'a Harness,
    pub cost: &'a dyn CostAccumulator,
    pub blobs: &'a dyn BlobStore,
    pub images: &'a ImageSettings,
    pub brief: &'a ContentBrief,
    pub stage: &'a Stage,
    pub resolved: &'a ResolvedModel,
    /// Initial prompt for the first stage, previous output afterwards.
    pub input: &'a str,
    /// Name of the agent that produced `input`; `None` for the first stage.
    pub previous_agent: Option<&'a str>,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub text: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub model: ModelRef,
}

/// Runs the stage's shape. With a sink the output is streamed into it.
pub async fn execute(
    ctx: &StageContext<'_>,
    sink: Option<&mut dyn TokenSink>,
) -> Result<StageOutput, PipelineError> {
    match ctx.stage.shape {
        StageShape::Text => text::run(ctx, sink).await,
        StageShape::Code => code::run(ctx, sink).await,
        StageShape::Image => image::run(ctx, sink).await,
    }
}

/// Shared single-shot or streaming call used by the text-like shapes.
pub(crate) async fn generate(
    ctx: &StageContext<'_>,
    request: GenerationRequest,
    sink: Option<&mut dyn TokenSink>,
) -> Result<StageOutput, PipelineError> {
    let result = match sink {
        Some(sink) => {
            ctx.harness
                .call_streaming(&request, sink, ctx.cancel)
                .await?
        }
        None => ctx.harness.call(&request, ctx.cancel).await?,
    };
    let cost_usd = ctx.cost.cost_usd(&request.model, &result.usage);
    Ok(StageOutput {
        text: result.text,
        usage: result.usage,
        cost_usd,
        model: request.model,
    })
}
