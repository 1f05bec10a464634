//! Agents, stages, workflows and the inbound request shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use writeflow_ai_harness::{ModelRef, ProviderId};

use crate::error::PipelineError;

/// Output shape of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageShape {
    #[default]
    Text,
    Code,
    Image,
}

impl StageShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Image => "image",
        }
    }
}

/// Key used by the auto-routing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    TextWriting,
    Code,
    Image,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextWriting => "text-writing",
            Self::Code => "code",
            Self::Image => "image",
        }
    }

    pub fn for_content_type(content_type: &str) -> Self {
        match content_type.trim().to_ascii_lowercase().as_str() {
            "code" => Self::Code,
            "image" => Self::Image,
            _ => Self::TextWriting,
        }
    }

    /// Shape of the implicit stage for runs without a workflow.
    pub fn implicit_shape(&self) -> StageShape {
        match self {
            Self::TextWriting => StageShape::Text,
            Self::Code => StageShape::Code,
            Self::Image => StageShape::Image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    pub name: String,
    pub content: String,
}

/// Agent identity and configuration bound to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub knowledge: Option<String>,
    #[serde(default)]
    pub documents: Vec<ReferenceDocument>,
    /// Preferred model; the run default is used when absent.
    #[serde(default)]
    pub model: Option<ModelRef>,
}

impl Agent {
    /// Built-in agent used when a run has no workflow.
    pub fn implicit(shape: StageShape) -> Self {
        let (id, name, icon, description) = match shape {
            StageShape::Text => ("writer", "Writer", "✍️", "General-purpose content writer"),
            StageShape::Code => ("coder", "Coder", "💻", "Source code generator"),
            StageShape::Image => ("illustrator", "Illustrator", "🎨", "Image generator"),
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            system_prompt: String::new(),
            knowledge: None,
            documents: Vec::new(),
            model: None,
        }
    }
}

/// Ratings and comments left on earlier outputs of an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBundle {
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub excerpts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// One node of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub agent: Agent,
    #[serde(default)]
    pub shape: StageShape,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub feedback: Option<FeedbackBundle>,
    #[serde(default)]
    pub memories: Vec<MemoryEntry>,
}

impl Stage {
    pub fn new(agent: Agent, shape: StageShape) -> Self {
        Self {
            agent,
            shape,
            instructions: String::new(),
            feedback: None,
            memories: Vec::new(),
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// Ordered list of stages stored under an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentLength {
    Short,
    #[default]
    Medium,
    Long,
    Custom,
}

/// What the caller wants written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBrief {
    pub content_type: String,
    pub topic: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub length: ContentLength,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_word_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_percent: Option<u32>,
    /// Existing draft to refine instead of writing from scratch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine_content: Option<String>,
    /// Target language for code runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ContentBrief {
    pub const DEFAULT_TOLERANCE_PERCENT: u32 = 10;
    const MIN_CUSTOM_TOKENS: u32 = 256;
    const MAX_CUSTOM_TOKENS: u32 = 16_000;

    pub fn new(content_type: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            topic: topic.into(),
            tone: String::new(),
            audience: String::new(),
            length: ContentLength::default(),
            custom_word_count: None,
            tolerance_percent: None,
            refine_content: None,
            language: None,
            context: None,
        }
    }

    pub fn task_type(&self) -> TaskType {
        TaskType::for_content_type(&self.content_type)
    }

    /// Output bound for text stages.
    pub fn max_output_tokens(&self) -> u32 {
        match self.length {
            ContentLength::Short => 1_000,
            ContentLength::Medium => 2_000,
            ContentLength::Long => 4_000,
            ContentLength::Custom => match self.custom_word_count {
                Some(words) => {
                    let tolerance = self
                        .tolerance_percent
                        .unwrap_or(Self::DEFAULT_TOLERANCE_PERCENT);
                    let tokens =
                        (f64::from(words) * (1.0 + f64::from(tolerance) / 100.0) * 1.5).ceil();
                    (tokens as u32).clamp(Self::MIN_CUSTOM_TOKENS, Self::MAX_CUSTOM_TOKENS)
                }
                None => 2_000,
            },
        }
    }

    /// Human description of the requested length used in prompts.
    pub fn length_hint(&self) -> String {
        match (self.length, self.custom_word_count) {
            (ContentLength::Short, _) => "short (around 300-500 words)".to_string(),
            (ContentLength::Medium, _) => "medium (around 800-1200 words)".to_string(),
            (ContentLength::Long, _) => "long (around 1500-2500 words)".to_string(),
            (ContentLength::Custom, Some(words)) => format!(
                "{words} words (within {}%)",
                self.tolerance_percent
                    .unwrap_or(Self::DEFAULT_TOLERANCE_PERCENT)
            ),
            (ContentLength::Custom, None) => "medium (around 800-1200 words)".to_string(),
        }
    }
}

/// Inbound pipeline request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub input: ContentBrief,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderId>,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl PipelineRequest {
    pub fn new(input: ContentBrief) -> Self {
        Self {
            input,
            workflow_id: None,
            provider: None,
            model_id: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if self.input.topic.trim().is_empty() && self.input.refine_content.is_none() {
            return Err(PipelineError::Invalid("topic must not be empty".into()));
        }
        if self.input.length == ContentLength::Custom && self.input.custom_word_count == Some(0) {
            return Err(PipelineError::Invalid(
                "customWordCount must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Single-turn chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderId>,
}

/// Code-only request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub prompt: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderId>,
}

impl From<CodeRequest> for PipelineRequest {
    /// A code request runs as an implicit single code stage.
    fn from(req: CodeRequest) -> Self {
        let mut brief = ContentBrief::new("code", req.prompt);
        brief.language = req.language.filter(|l| !l.trim().is_empty());
        brief.context = req.context.filter(|c| !c.trim().is_empty());
        Self {
            input: brief,
            workflow_id: None,
            provider: req.provider,
            model_id: req.model_id,
        }
    }
}
