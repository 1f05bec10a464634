use writeflow_ai_harness::{ErrorClass, ProviderError};

/// Failure of a pipeline, chat or code run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A vendor call failed or the vendor is unknown.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// No model or credential could be resolved.
    #[error("{message}")]
    Resolution {
        /// Agent whose stage could not be resolved; `None` for the run default.
        agent: Option<String>,
        message: String,
    },
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Blob storage or run recording failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// The task driving a run died without an outcome.
    #[error("internal error: {0}")]
    Internal(String),
    /// The run's cancellation token fired.
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn resolution(agent: Option<&str>, message: impl Into<String>) -> Self {
        Self::Resolution {
            agent: agent.map(ToOwned::to_owned),
            message: message.into(),
        }
    }

    /// Missing credential for the vendor a stage's agent points at.
    pub fn missing_credential(agent: &str, vendor: &str) -> Self {
        Self::resolution(
            Some(agent),
            format!("agent \"{agent}\" requires a {vendor} credential, but none is configured"),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Provider(err) => err.is_cancelled(),
            _ => false,
        }
    }

    /// Caller-facing category.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Provider(err) => err.class(),
            Self::Resolution { .. } => ErrorClass::Configuration,
            _ => ErrorClass::Upstream,
        }
    }

    /// HTTP status used when the error is returned before a stream opens.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Provider(err) => match err.status() {
                Some(400) => 400,
                // Rejected key: same answer as a missing one.
                Some(401 | 403) => 422,
                Some(429) => 429,
                _ => 502,
            },
            Self::Resolution { .. } => 422,
            Self::WorkflowNotFound(_) => 404,
            Self::Invalid(_) => 400,
            Self::Storage(_) | Self::Internal(_) => 500,
            // Client closed request.
            Self::Cancelled => 499,
        }
    }

    /// Single human-readable message shown to the caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(err) => err.message().to_string(),
            other => other.to_string(),
        }
    }
}
