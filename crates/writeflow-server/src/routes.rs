use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use writeflow_ai_harness::{Credential, ProviderError, ProviderId};
use writeflow_core::collaborators::CredentialStore;
use writeflow_core::{
    ChatEvent, ChatRequest, CodeRequest, PipelineError, PipelineRequest, PreparedRun,
    ProgressEvent, RunComplete,
};

use crate::error::ApiError;
use crate::sse;
use crate::state::AppState;

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/generate/sync", post(generate_sync))
        .route("/api/code", post(code))
        .route("/api/chat", post(chat))
        .route("/api/models", get(models))
        .route("/api/credentials/{vendor}", put(set_credential))
        .route("/api/blobs/{id}", get(blob))
        .with_state(state)
}

impl AppState {
    fn api_error(&self, error: impl Into<PipelineError>) -> ApiError {
        ApiError::new(error.into(), self.diagnostics())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PipelineRequest>,
) -> Result<Response, ApiError> {
    let prepared = state
        .orchestrator
        .prepare(request)
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(stream_run(&state, prepared))
}

async fn code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CodeRequest>,
) -> Result<Response, ApiError> {
    let prepared = state
        .orchestrator
        .prepare(PipelineRequest::from(request))
        .await
        .map_err(|e| state.api_error(e))?;
    Ok(stream_run(&state, prepared))
}

fn stream_run(state: &AppState, prepared: PreparedRun) -> Response {
    info!(
        event = "http.stream_opened",
        domain = "http",
        channel = "pipeline",
        stages = prepared.stages().len() as u64,
        model = %prepared.default_model()
    );
    let orchestrator = state.orchestrator.clone();
    sse::spawn_stream::<ProgressEvent, _, _>(
        CancellationToken::new(),
        move |mut tx, cancel| async move {
            // Outcome is logged and emitted by the orchestrator.
            let _ = orchestrator.run(prepared, &mut tx, &cancel).await;
        },
    )
}

/// Same run without a stream; the body is the `run-complete` payload.
async fn generate_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<RunComplete>, ApiError> {
    let cancel = CancellationToken::new();
    // Dropped with the handler future when the client goes away.
    let _guard = cancel.clone().drop_guard();
    // A disconnect only fires the token; persistence is never cut partway.
    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.run_to_completion(request, &cancel).await });
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(err) => Err(PipelineError::Internal(format!("run task failed: {err}"))),
    };
    outcome.map(Json).map_err(|e| state.api_error(e))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let prepared = state
        .orchestrator
        .prepare_chat(request)
        .await
        .map_err(|e| state.api_error(e))?;
    info!(
        event = "http.stream_opened",
        domain = "http",
        channel = "chat",
        model = %prepared.model()
    );
    let orchestrator = state.orchestrator.clone();
    Ok(sse::spawn_stream::<ChatEvent, _, _>(
        CancellationToken::new(),
        move |mut tx, cancel| async move {
            let _ = orchestrator.run_chat(prepared, &mut tx, &cancel).await;
        },
    ))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorModels {
    pub provider: String,
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub providers: Vec<VendorModels>,
}

/// Model lists of every vendor with a configured credential.
async fn models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let harness = state.orchestrator.harness();
    let mut providers = Vec::new();
    for vendor in state.credentials.configured_vendors().await {
        if !harness.supports(&vendor) {
            continue;
        }
        let Some(credential) = state.credentials.credential(&vendor).await else {
            continue;
        };
        let entry = match state.catalog.models(&vendor, &credential).await {
            Ok(models) => VendorModels {
                provider: vendor.to_string(),
                models: models.as_ref().clone(),
                error: None,
            },
            Err(err) => {
                warn!(
                    event = "http.models_failed",
                    domain = "http",
                    vendor = %vendor,
                    class = err.class().as_str(),
                    error = %err
                );
                VendorModels {
                    provider: vendor.to_string(),
                    models: Vec::new(),
                    error: Some(err.message().to_string()),
                }
            }
        };
        providers.push(entry);
    }
    Json(ModelsResponse { providers })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialUpdate {
    #[serde(default)]
    api_key: String,
}

/// Stores a vendor key; a blank key removes it.
async fn set_credential(
    State(state): State<Arc<AppState>>,
    Path(vendor): Path<String>,
    Json(update): Json<CredentialUpdate>,
) -> Result<StatusCode, ApiError> {
    let vendor = ProviderId::new(vendor.trim().to_ascii_lowercase());
    if !state.orchestrator.harness().supports(&vendor) {
        return Err(state.api_error(ProviderError::unknown_provider(vendor)));
    }
    let credential = Credential::new(update.api_key.trim());
    if credential.is_blank() {
        state.credentials.remove(&vendor);
    } else {
        state.credentials.set(vendor, credential);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn blob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(blob) = state.blobs.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let content_type = HeaderValue::from_str(&blob.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    ([(CONTENT_TYPE, content_type)], blob.bytes).into_response()
}
