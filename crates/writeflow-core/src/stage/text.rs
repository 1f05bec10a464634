use tracing::debug;
use writeflow_ai_harness::{GenerationRequest, TokenSink};

use super::{StageContext, StageOutput, generate};
use crate::error::PipelineError;
use crate::prompts;

pub(super) async fn run(
    ctx: &StageContext<'_>,
    sink: Option<&mut dyn TokenSink>,
) -> Result<StageOutput, PipelineError> {
    let system = prompts::text_system_prompt(ctx.stage, ctx.brief);
    let user = match ctx.previous_agent {
        Some(previous) => prompts::continuation_user_prompt(previous, ctx.input, ctx.brief),
        None => ctx.input.to_string(),
    };
    let max_output_tokens = ctx.brief.max_output_tokens();
    debug!(
        event = "stage.text_call",
        domain = "pipeline",
        agent = ctx.stage.agent.id.as_str(),
        model = %ctx.resolved.model,
        system_len = system.len() as u64,
        user_len = user.len() as u64,
        max_output_tokens,
        streamed = sink.is_some()
    );
    let request = GenerationRequest::new(
        ctx.resolved.model.clone(),
        ctx.resolved.credential.clone(),
        user,
    )
    .system_prompt(system)
    .max_output_tokens(max_output_tokens);
    generate(ctx, request, sink).await
}
