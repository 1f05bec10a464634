use std::collections::HashMap;
use std::path::Path;

use crate::definition::WorkflowDefinition;
use crate::error::PipelineError;

/// Source of configured workflows.
#[async_trait::async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>, PipelineError>;
}

/// Workflows fixed at startup, optionally loaded from a JSON array file.
#[derive(Debug, Default, Clone)]
pub struct StaticWorkflowStore {
    workflows: HashMap<String, WorkflowDefinition>,
}

impl StaticWorkflowStore {
    pub fn new(workflows: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        Self {
            workflows: workflows.into_iter().map(|w| (w.id.clone(), w)).collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let workflows: Vec<WorkflowDefinition> = serde_json::from_str(raw)
            .map_err(|e| PipelineError::Storage(format!("invalid workflow file: {e}")))?;
        Ok(Self::new(workflows))
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Storage(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[async_trait::async_trait]
impl WorkflowStore for StaticWorkflowStore {
    async fn workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>, PipelineError> {
        Ok(self.workflows.get(id).cloned())
    }
}
