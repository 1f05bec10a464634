use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use writeflow_ai_harness::vendors::{VendorClientConfig, VendorSettings};
use writeflow_core::collaborators::StaticWorkflowStore;
use writeflow_core::{ImageSettings, OrchestratorSettings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load workflows from {path}: {message}")]
    Workflows { path: PathBuf, message: String },
    #[error("failed to build provider harness: {0}")]
    Harness(#[from] writeflow_ai_harness::HarnessError),
}

/// Loads `.env` from the crate directory, then from the working directory.
pub fn load_env() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Command-line and environment settings of the HTTP service.
#[derive(Parser, Debug, Clone)]
#[command(name = "writeflow", about = "Multi-vendor content generation service")]
pub struct ServerConfig {
    #[arg(long, env = "WRITEFLOW_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Include internal error detail in error payloads.
    #[arg(long, env = "WRITEFLOW_DIAGNOSTICS", default_value_t = false)]
    pub diagnostics: bool,

    /// JSON file holding the workflow definitions.
    #[arg(long, env = "WRITEFLOW_WORKFLOWS_PATH")]
    pub workflows_path: Option<PathBuf>,

    #[arg(long, env = "WRITEFLOW_MODEL_CACHE_TTL_SECS", default_value_t = 600)]
    pub model_cache_ttl_secs: u64,

    /// HTTP timeout applied to every vendor request.
    #[arg(long, env = "WRITEFLOW_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Text model that writes image prompts.
    #[arg(long, env = "WRITEFLOW_IMAGE_PROMPT_MODEL", default_value = "gpt-4o-mini")]
    pub image_prompt_model: String,

    #[arg(long, env = "WRITEFLOW_IMAGE_SIZE", default_value = "1024x1024")]
    pub image_size: String,

    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub anthropic_base_url: Option<String>,

    #[arg(long, env = "GOOGLE_BASE_URL")]
    pub google_base_url: Option<String>,

    #[arg(long, env = "MISTRAL_BASE_URL")]
    pub mistral_base_url: Option<String>,
}

impl ServerConfig {
    pub fn model_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.model_cache_ttl_secs)
    }

    /// Vendor bindings with the configured timeout and base-URL overrides.
    pub fn vendor_settings(&self) -> VendorSettings {
        let timeout = Duration::from_secs(self.request_timeout_secs);
        let apply = |config: VendorClientConfig, base_url: &Option<String>| {
            let config = config.timeout(timeout);
            match base_url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => config.base_url(url),
                _ => config,
            }
        };
        let defaults = VendorSettings::default();
        VendorSettings {
            openai: apply(defaults.openai, &self.openai_base_url),
            anthropic: apply(defaults.anthropic, &self.anthropic_base_url),
            google: apply(defaults.google, &self.google_base_url),
            mistral: apply(defaults.mistral, &self.mistral_base_url),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            diagnostics: self.diagnostics,
            images: ImageSettings {
                prompt_model: self.image_prompt_model.clone(),
                size: self.image_size.clone(),
            },
        }
    }

    /// Reads the workflow file, or returns an empty store when none is set.
    pub fn workflows(&self) -> Result<StaticWorkflowStore, ConfigError> {
        let Some(path) = &self.workflows_path else {
            return Ok(StaticWorkflowStore::default());
        };
        StaticWorkflowStore::load(path).map_err(|err| ConfigError::Workflows {
            path: path.clone(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        let mut argv = vec!["writeflow"];
        argv.extend_from_slice(args);
        ServerConfig::try_parse_from(argv).expect("config")
    }

    #[test]
    fn base_url_overrides_and_timeout_reach_vendor_settings() {
        let config = parse(&[
            "--openai-base-url",
            "http://localhost:9000/v1",
            "--request-timeout-secs",
            "30",
        ]);
        let settings = config.vendor_settings();
        assert_eq!(settings.openai.base_url, "http://localhost:9000/v1");
        assert_eq!(settings.openai.timeout, Duration::from_secs(30));
        assert_eq!(
            settings.anthropic.base_url,
            VendorSettings::default().anthropic.base_url
        );
    }

    #[test]
    fn image_flags_reach_orchestrator_settings() {
        let config = parse(&["--image-size", "1792x1024", "--diagnostics"]);
        let settings = config.orchestrator_settings();
        assert!(settings.diagnostics);
        assert_eq!(settings.images.size, "1792x1024");
        assert_eq!(settings.images.prompt_model, "gpt-4o-mini");
    }

    #[test]
    fn missing_workflow_file_is_a_config_error() {
        let config = parse(&["--workflows-path", "/nonexistent/writeflow/workflows.json"]);
        let err = config.workflows().expect_err("missing file");
        assert!(matches!(err, ConfigError::Workflows { .. }));
    }
}
