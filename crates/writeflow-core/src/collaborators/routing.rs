use std::collections::HashMap;
use std::sync::Arc;

use writeflow_ai_harness::{Credential, ModelRef, ProviderId, vendors};

use super::credentials::CredentialStore;
use crate::definition::TaskType;
use crate::error::PipelineError;

/// A model together with the credential to call it with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub model: ModelRef,
    pub credential: Credential,
}

/// Auto-routing policy: picks a default model for a task type.
#[async_trait::async_trait]
pub trait ModelRouter: Send + Sync {
    async fn route(&self, task: TaskType) -> Result<ResolvedModel, PipelineError>;
}

/// Walks a preference list per task type and returns the first entry whose
/// vendor has a credential.
pub struct DefaultModelRouter {
    credentials: Arc<dyn CredentialStore>,
    preferences: HashMap<TaskType, Vec<ModelRef>>,
}

impl DefaultModelRouter {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            credentials,
            preferences: default_preferences(),
        }
    }

    /// Replaces the preference list for one task type.
    pub fn with_preferences(mut self, task: TaskType, models: Vec<ModelRef>) -> Self {
        self.preferences.insert(task, models);
        self
    }
}

fn default_preferences() -> HashMap<TaskType, Vec<ModelRef>> {
    HashMap::from([
        (
            TaskType::TextWriting,
            vec![
                ModelRef::new(vendors::OPENAI, "gpt-4o-mini"),
                ModelRef::new(vendors::ANTHROPIC, "claude-3-5-sonnet-latest"),
                ModelRef::new(vendors::GOOGLE, "gemini-1.5-pro"),
                ModelRef::new(vendors::MISTRAL, "mistral-large-latest"),
            ],
        ),
        (
            TaskType::Code,
            vec![
                ModelRef::new(vendors::ANTHROPIC, "claude-3-5-sonnet-latest"),
                ModelRef::new(vendors::OPENAI, "gpt-4o"),
                ModelRef::new(vendors::MISTRAL, "codestral-latest"),
                ModelRef::new(vendors::GOOGLE, "gemini-1.5-pro"),
            ],
        ),
        (
            TaskType::Image,
            vec![ModelRef::new(vendors::OPENAI, "dall-e-3")],
        ),
    ])
}

/// Guesses the vendor of a bare model id from its family prefix.
pub fn infer_vendor(model_id: &str) -> Option<ProviderId> {
    let id = model_id.trim().to_ascii_lowercase();
    let vendor = if ["gpt", "o1", "o3", "o4", "dall-e", "chatgpt"]
        .iter()
        .any(|p| id.starts_with(p))
    {
        vendors::OPENAI
    } else if id.starts_with("claude") {
        vendors::ANTHROPIC
    } else if id.starts_with("gemini") || id.starts_with("models/gemini") {
        vendors::GOOGLE
    } else if ["mistral", "codestral", "open-mistral", "ministral", "pixtral"]
        .iter()
        .any(|p| id.starts_with(p))
    {
        vendors::MISTRAL
    } else {
        return None;
    };
    Some(ProviderId::new(vendor))
}

#[async_trait::async_trait]
impl ModelRouter for DefaultModelRouter {
    async fn route(&self, task: TaskType) -> Result<ResolvedModel, PipelineError> {
        for model in self.preferences.get(&task).into_iter().flatten() {
            if let Some(credential) = self.credentials.credential(&model.provider).await {
                return Ok(ResolvedModel {
                    model: model.clone(),
                    credential,
                });
            }
        }
        Err(PipelineError::resolution(
            None,
            format!(
                "no credential is configured for any vendor that can handle {} tasks",
                task.as_str()
            ),
        ))
    }
}
