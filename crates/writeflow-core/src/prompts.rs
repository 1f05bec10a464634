//! Prompt construction for each stage shape and for chat.

use crate::definition::{ContentBrief, Stage};

/// Feedback excerpts quoted verbatim in a text system prompt.
pub const MAX_FEEDBACK_EXCERPTS: usize = 5;
/// Memory summaries included in a text system prompt.
pub const MAX_MEMORIES: usize = 10;

const DEFAULT_WRITER_PROMPT: &str =
    "You are a professional content writer. Produce clear, well-structured content in markdown.";

const CODE_SYSTEM_PROMPT: &str = "You are an expert software engineer. Write correct, idiomatic, \
well-documented code. Return the code in fenced markdown blocks followed by a short explanation.";

const IMAGE_PROMPT_SYSTEM: &str = "You write prompts for an image generation model. Reply with a \
single vivid description of one image, under 100 words, with no preamble.";

const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful writing assistant. Answer concisely and use markdown when it helps.";

fn push_section(out: &mut String, title: &str, body: &str) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str("## ");
    out.push_str(title);
    out.push('\n');
    out.push_str(body);
}

/// Bulleted summary of the content brief.
pub fn brief_section(brief: &ContentBrief) -> String {
    let mut lines = vec![
        format!("- Content type: {}", brief.content_type),
        format!("- Topic: {}", brief.topic),
    ];
    if !brief.tone.trim().is_empty() {
        lines.push(format!("- Tone: {}", brief.tone));
    }
    if !brief.audience.trim().is_empty() {
        lines.push(format!("- Audience: {}", brief.audience));
    }
    lines.push(format!("- Length: {}", brief.length_hint()));
    lines.join("\n")
}

/// System prompt for a text stage.
pub fn text_system_prompt(stage: &Stage, brief: &ContentBrief) -> String {
    let agent = &stage.agent;
    let mut out = String::new();
    let base = if agent.system_prompt.trim().is_empty() {
        DEFAULT_WRITER_PROMPT
    } else {
        agent.system_prompt.trim()
    };
    out.push_str(base);

    push_section(&mut out, "Stage instructions", &stage.instructions);
    if let Some(knowledge) = &agent.knowledge {
        push_section(&mut out, "Knowledge", knowledge);
    }
    for doc in &agent.documents {
        push_section(&mut out, &format!("Reference document: {}", doc.name), &doc.content);
    }
    push_section(&mut out, "Content brief", &brief_section(brief));

    if let Some(feedback) = &stage.feedback {
        let mut body = String::new();
        if let Some(rating) = feedback.average_rating {
            body.push_str(&format!("Average rating of previous outputs: {rating:.1}/5\n"));
        }
        for excerpt in feedback
            .excerpts
            .iter()
            .filter(|e| !e.trim().is_empty())
            .take(MAX_FEEDBACK_EXCERPTS)
        {
            body.push_str(&format!("- \"{}\"\n", excerpt.trim()));
        }
        push_section(&mut out, "Reader feedback on earlier work", &body);
    }

    if !stage.memories.is_empty() {
        let mut memories: Vec<_> = stage.memories.iter().collect();
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let body = memories
            .into_iter()
            .take(MAX_MEMORIES)
            .map(|m| format!("- {}", m.summary.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        push_section(&mut out, "What you wrote before", &body);
    }
    out
}

/// User prompt for the first stage of a run.
pub fn initial_user_prompt(brief: &ContentBrief) -> String {
    if let Some(draft) = brief.refine_content.as_deref().filter(|d| !d.trim().is_empty()) {
        return format!(
            "Refine the following {} about \"{}\". Keep its intent and improve clarity, flow and structure.\n\n{}",
            brief.content_type,
            brief.topic,
            draft.trim()
        );
    }
    let mut prompt = format!("Write a {} about \"{}\".", brief.content_type, brief.topic);
    if !brief.tone.trim().is_empty() {
        prompt.push_str(&format!(" Use a {} tone.", brief.tone.trim()));
    }
    if !brief.audience.trim().is_empty() {
        prompt.push_str(&format!(" The audience is {}.", brief.audience.trim()));
    }
    prompt.push_str(&format!(" Target length: {}.", brief.length_hint()));
    prompt
}

/// User prompt for a later stage, wrapping the previous stage's output.
pub fn continuation_user_prompt(
    previous_agent: &str,
    previous_output: &str,
    brief: &ContentBrief,
) -> String {
    format!(
        "You are continuing a multi-agent content pipeline about \"{}\". \
The previous agent ({previous_agent}) produced the output below. \
Apply your own role to it and return the complete updated result.\n\n---\n{}\n---",
        brief.topic,
        previous_output.trim()
    )
}

/// System prompt for a code stage.
pub fn code_system_prompt(language: Option<&str>) -> String {
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(language) => format!("{CODE_SYSTEM_PROMPT}\nWrite the solution in {language}."),
        None => CODE_SYSTEM_PROMPT.to_string(),
    }
}

/// User prompt for a code stage.
pub fn code_user_prompt(brief: &ContentBrief, previous_output: Option<&str>) -> String {
    let mut prompt = match previous_output {
        Some(previous) => format!(
            "Implement the following as code.\n\n---\n{}\n---",
            previous.trim()
        ),
        None => brief.topic.trim().to_string(),
    };
    if let Some(context) = brief.context.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(context.trim());
    }
    prompt
}

pub fn image_prompt_system() -> &'static str {
    IMAGE_PROMPT_SYSTEM
}

/// Request for turning the previous output and topic into an image prompt.
pub fn image_prompt_request(topic: &str, previous_output: Option<&str>) -> String {
    match previous_output.map(str::trim).filter(|p| !p.is_empty()) {
        Some(previous) => format!(
            "Write an image prompt for an illustration of \"{topic}\" that fits this content:\n\n{previous}"
        ),
        None => format!("Write an image prompt for an illustration of \"{topic}\"."),
    }
}

/// Markdown output of an image stage.
pub fn image_markdown(topic: &str, url: &str, prompt: &str) -> String {
    format!("![{topic}]({url})\n\n**Prompt:** {prompt}")
}

pub fn chat_system_prompt(context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{CHAT_SYSTEM_PROMPT}\n\n## Context\n{context}"),
        None => CHAT_SYSTEM_PROMPT.to_string(),
    }
}
