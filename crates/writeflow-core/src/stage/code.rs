use tracing::debug;
use writeflow_ai_harness::{GenerationRequest, TokenSink};

use super::{StageContext, StageOutput, generate};
use crate::error::PipelineError;
use crate::prompts;

/// Output bound for code stages, independent of the requested length.
pub const CODE_MAX_OUTPUT_TOKENS: u32 = 8_192;

pub(super) async fn run(
    ctx: &StageContext<'_>,
    sink: Option<&mut dyn TokenSink>,
) -> Result<StageOutput, PipelineError> {
    let mut system = prompts::code_system_prompt(ctx.brief.language.as_deref());
    let agent_prompt = ctx.stage.agent.system_prompt.trim();
    if !agent_prompt.is_empty() {
        system = format!("{agent_prompt}\n\n{system}");
    }
    if !ctx.stage.instructions.trim().is_empty() {
        system.push_str("\n\n");
        system.push_str(ctx.stage.instructions.trim());
    }
    let user = match ctx.previous_agent {
        Some(_) => prompts::code_user_prompt(ctx.brief, Some(ctx.input)),
        None => ctx.input.to_string(),
    };
    debug!(
        event = "stage.code_call",
        domain = "pipeline",
        agent = ctx.stage.agent.id.as_str(),
        model = %ctx.resolved.model,
        language = ctx.brief.language.as_deref().unwrap_or("unspecified"),
        streamed = sink.is_some()
    );
    let request = GenerationRequest::new(
        ctx.resolved.model.clone(),
        ctx.resolved.credential.clone(),
        user,
    )
    .system_prompt(system)
    .max_output_tokens(CODE_MAX_OUTPUT_TOKENS);
    generate(ctx, request, sink).await
}
