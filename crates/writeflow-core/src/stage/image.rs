use serde::{Deserialize, Serialize};
use tracing::debug;
use writeflow_ai_harness::{GenerationRequest, ImageRequest, ModelRef, TokenSink};

use super::{StageContext, StageOutput};
use crate::error::PipelineError;
use crate::pricing::image_cost;
use crate::prompts;

/// Output bound of the prompt-derivation call.
pub const IMAGE_PROMPT_MAX_OUTPUT_TOKENS: u32 = 300;

/// Knobs for image stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSettings {
    /// Text model, on the image vendor, that writes the image prompt.
    pub prompt_model: String,
    pub size: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            prompt_model: "gpt-4o-mini".to_string(),
            size: ImageRequest::DEFAULT_SIZE.to_string(),
        }
    }
}

pub(super) async fn run(
    ctx: &StageContext<'_>,
    sink: Option<&mut dyn TokenSink>,
) -> Result<StageOutput, PipelineError> {
    let topic = ctx.brief.topic.trim();
    let vendor = &ctx.resolved.model.provider;
    let prompt_model = ModelRef::new(vendor, ctx.images.prompt_model.as_str());

    let previous = ctx.previous_agent.map(|_| ctx.input);
    let derive = GenerationRequest::new(
        prompt_model.clone(),
        ctx.resolved.credential.clone(),
        prompts::image_prompt_request(topic, previous),
    )
    .system_prompt(prompts::image_prompt_system())
    .max_output_tokens(IMAGE_PROMPT_MAX_OUTPUT_TOKENS);
    let derived = ctx.harness.call(&derive, ctx.cancel).await?;
    let image_prompt = match derived.text.trim() {
        "" => topic.to_string(),
        text => text.to_string(),
    };
    debug!(
        event = "stage.image_prompt_derived",
        domain = "pipeline",
        agent = ctx.stage.agent.id.as_str(),
        prompt_len = image_prompt.len() as u64
    );

    let request = ImageRequest::new(
        ctx.resolved.model.clone(),
        ctx.resolved.credential.clone(),
        image_prompt.as_str(),
    )
    .size(ctx.images.size.as_str());
    let image = ctx.harness.generate_image(&request, ctx.cancel).await?;
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let url = ctx.blobs.put(image.bytes, &image.mime_type).await?;
    debug!(
        event = "stage.image_stored",
        domain = "pipeline",
        agent = ctx.stage.agent.id.as_str(),
        model = %ctx.resolved.model,
        url = url.as_str()
    );

    let text = prompts::image_markdown(topic, &url, &image_prompt);
    if let Some(sink) = sink {
        // Single fragment: the image has no incremental output.
        if !sink.push(&text).await {
            return Err(PipelineError::Cancelled);
        }
    }
    let cost_usd = ctx.cost.cost_usd(&prompt_model, &derived.usage)
        + image_cost(&ctx.resolved.model.model, &request.size);
    Ok(StageOutput {
        text,
        usage: derived.usage,
        cost_usd,
        model: ctx.resolved.model.clone(),
    })
}
