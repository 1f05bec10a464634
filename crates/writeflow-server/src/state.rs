use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use writeflow_ai_harness::{Harness, ModelCatalog};
use writeflow_core::collaborators::{
    InMemoryBlobStore, InMemoryRecorder, MemoryCredentialStore, RunRecorder, StaticWorkflowStore,
};
use writeflow_core::{Orchestrator, OrchestratorSettings};

use crate::config::{ConfigError, ServerConfig};

/// Shared handles behind every route.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub credentials: Arc<MemoryCredentialStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub catalog: Arc<ModelCatalog>,
}

impl AppState {
    /// Wires the orchestrator around an already built harness.
    ///
    /// `credentials` is attached to a fresh model catalog so runtime key
    /// changes drop the cached model lists.
    pub fn new(
        harness: Harness,
        credentials: MemoryCredentialStore,
        workflows: StaticWorkflowStore,
        recorder: Arc<dyn RunRecorder>,
        settings: OrchestratorSettings,
        cache_ttl: Duration,
    ) -> Self {
        let catalog = Arc::new(ModelCatalog::new(harness.clone(), cache_ttl));
        let credentials = Arc::new(credentials.with_catalog(catalog.clone()));
        let blobs = Arc::new(InMemoryBlobStore::default());
        let orchestrator = Orchestrator::builder(harness)
            .credentials(credentials.clone())
            .workflows(Arc::new(workflows))
            .blobs(blobs.clone())
            .recorder(recorder)
            .settings(settings)
            .build();
        Self {
            orchestrator,
            credentials,
            blobs,
            catalog,
        }
    }

    /// Builds the bundled vendor bindings and seeds credentials from the
    /// environment.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let harness = Harness::builder()
            .with_default_vendors(&config.vendor_settings())?
            .build()?;
        let workflows = config.workflows()?;
        info!(
            event = "server.configured",
            domain = "http",
            workflows = workflows.len() as u64,
            diagnostics = config.diagnostics,
            cache_ttl_secs = config.model_cache_ttl_secs
        );
        Ok(Self::new(
            harness,
            MemoryCredentialStore::from_env(),
            workflows,
            Arc::new(InMemoryRecorder::new()),
            config.orchestrator_settings(),
            config.model_cache_ttl(),
        ))
    }

    pub fn diagnostics(&self) -> bool {
        self.orchestrator.settings().diagnostics
    }
}
