//! Pipeline orchestrator: resolves stages and credentials, runs the stages in
//! order threading each output into the next input, and finalizes the run.
//!
//! Work is split in two steps. [`Orchestrator::prepare`] does everything that
//! can fail before a progress stream is opened (request checks, workflow
//! lookup, run-level model resolution), so those failures surface as ordinary
//! error responses. [`Orchestrator::run`] then drives the stages and reports
//! through an [`EventSink`]; from that point failures are reported as a single
//! terminal `error` event.
//!
//! Cancellation is cooperative: the caller's [`CancellationToken`] is threaded
//! into every vendor call, and a sink that reports its consumer gone cancels
//! the token itself. An aborted run emits nothing further and persists nothing.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use writeflow_ai_harness::{Harness, ModelRef, ProviderError, ProviderId};

use crate::collaborators::{
    BlobStore, ContentAnalyzer, CredentialStore, DefaultContentAnalyzer, DefaultModelRouter,
    InMemoryBlobStore, InMemoryRecorder, MemoryCredentialStore, MemoryRecord, ModelRouter,
    ResolvedModel, RunRecorder, StaticWorkflowStore, StaticWritingTips, UsageRecord,
    WorkflowStore, WritingTips, infer_vendor,
};
use crate::definition::{Agent, PipelineRequest, Stage, StageShape, TaskType};
use crate::error::PipelineError;
use crate::pricing::{CostAccumulator, PricingTable};
use crate::progress::{
    ErrorPayload, EventSink, ProgressEvent, RunComplete, RunOutput, RunUsage, StageComplete,
    StageStart, TokenForwarder,
};
use crate::prompts;
use crate::run::{PipelineRun, RunState, StageRecord, StageUsage};
use crate::stage::{self, ImageSettings, StageContext};

/// Length of the per-stage memory summary.
const MEMORY_SUMMARY_CHARS: usize = 280;

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    /// Adds internal detail to `error` payloads.
    pub diagnostics: bool,
    pub images: ImageSettings,
}

/// Entry point for pipeline, code and chat runs.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) harness: Harness,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) router: Arc<dyn ModelRouter>,
    pub(crate) workflows: Arc<dyn WorkflowStore>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) recorder: Arc<dyn RunRecorder>,
    pub(crate) analyzer: Arc<dyn ContentAnalyzer>,
    pub(crate) tips: Arc<dyn WritingTips>,
    pub(crate) cost: Arc<dyn CostAccumulator>,
    pub(crate) settings: OrchestratorSettings,
}

/// Collaborators left unset fall back to the in-memory defaults.
pub struct OrchestratorBuilder {
    harness: Harness,
    credentials: Option<Arc<dyn CredentialStore>>,
    router: Option<Arc<dyn ModelRouter>>,
    workflows: Option<Arc<dyn WorkflowStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    recorder: Option<Arc<dyn RunRecorder>>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    tips: Option<Arc<dyn WritingTips>>,
    cost: Option<Arc<dyn CostAccumulator>>,
    settings: OrchestratorSettings,
}

impl OrchestratorBuilder {
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn router(mut self, router: Arc<dyn ModelRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn workflows(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.workflows = Some(store);
        self
    }

    pub fn blobs(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(store);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn tips(mut self, tips: Arc<dyn WritingTips>) -> Self {
        self.tips = Some(tips);
        self
    }

    pub fn cost(mut self, cost: Arc<dyn CostAccumulator>) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Orchestrator {
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let router = self
            .router
            .unwrap_or_else(|| Arc::new(DefaultModelRouter::new(credentials.clone())));
        Orchestrator {
            harness: self.harness,
            credentials,
            router,
            workflows: self
                .workflows
                .unwrap_or_else(|| Arc::new(StaticWorkflowStore::default())),
            blobs: self
                .blobs
                .unwrap_or_else(|| Arc::new(InMemoryBlobStore::default())),
            recorder: self
                .recorder
                .unwrap_or_else(|| Arc::new(InMemoryRecorder::new())),
            analyzer: self
                .analyzer
                .unwrap_or_else(|| Arc::new(DefaultContentAnalyzer)),
            tips: self.tips.unwrap_or_else(|| Arc::new(StaticWritingTips)),
            cost: self.cost.unwrap_or_else(|| Arc::new(PricingTable)),
            settings: self.settings,
        }
    }
}

/// Run whose workflow and default model have been resolved.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    request: PipelineRequest,
    task: TaskType,
    stages: Vec<Stage>,
    workflow_name: Option<String>,
    from_workflow: bool,
    default: ResolvedModel,
}

impl PreparedRun {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn default_model(&self) -> &ModelRef {
        &self.default.model
    }

    pub fn workflow_name(&self) -> Option<&str> {
        self.workflow_name.as_deref()
    }
}

/// Sink for runs nobody watches.
struct Discard;

#[async_trait::async_trait]
impl<E: Send + 'static> EventSink<E> for Discard {
    async fn emit(&mut self, _event: E) -> bool {
        true
    }
}

fn summarize(output: &str) -> String {
    let trimmed = output.trim();
    match trimmed.char_indices().nth(MEMORY_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

impl Orchestrator {
    pub fn builder(harness: Harness) -> OrchestratorBuilder {
        OrchestratorBuilder {
            harness,
            credentials: None,
            router: None,
            workflows: None,
            blobs: None,
            recorder: None,
            analyzer: None,
            tips: None,
            cost: None,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Resolves the workflow and the run-level default model.
    pub async fn prepare(&self, request: PipelineRequest) -> Result<PreparedRun, PipelineError> {
        request.validate()?;
        let task = request.input.task_type();

        let workflow = match request.workflow_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Some(
                self.workflows
                    .workflow(id)
                    .await?
                    .ok_or_else(|| PipelineError::WorkflowNotFound(id.to_string()))?,
            ),
            _ => None,
        };
        let (workflow_name, configured) = match workflow {
            Some(workflow) => (Some(workflow.name), workflow.stages),
            None => (None, Vec::new()),
        };
        let from_workflow = !configured.is_empty();
        let stages = if from_workflow {
            configured
        } else {
            let shape = task.implicit_shape();
            vec![Stage::new(Agent::implicit(shape), shape)]
        };

        let default = self
            .resolve_default(task, request.provider.as_ref(), request.model_id.as_deref())
            .await?;
        info!(
            event = "run.prepared",
            domain = "pipeline",
            task = task.as_str(),
            stages = stages.len() as u64,
            from_workflow,
            workflow = workflow_name.as_deref().unwrap_or(""),
            default_model = %default.model
        );
        Ok(PreparedRun {
            request,
            task,
            stages,
            workflow_name,
            from_workflow,
            default,
        })
    }

    /// Explicit `provider`/`modelId` when given, otherwise the router's pick.
    pub(crate) async fn resolve_default(
        &self,
        task: TaskType,
        provider: Option<&ProviderId>,
        model_id: Option<&str>,
    ) -> Result<ResolvedModel, PipelineError> {
        let Some(model_id) = model_id.map(str::trim).filter(|m| !m.is_empty()) else {
            return self.router.route(task).await;
        };
        let vendor = match provider {
            Some(vendor) => vendor.clone(),
            None => infer_vendor(model_id).ok_or_else(|| {
                PipelineError::Invalid(format!(
                    "cannot tell which vendor serves model \"{model_id}\"; pass provider"
                ))
            })?,
        };
        if !self.harness.supports(&vendor) {
            return Err(ProviderError::unknown_provider(&vendor).into());
        }
        let credential = self.credentials.credential(&vendor).await.ok_or_else(|| {
            PipelineError::resolution(None, format!("no credential is configured for {vendor}"))
        })?;
        Ok(ResolvedModel {
            model: ModelRef::new(vendor, model_id),
            credential,
        })
    }

    /// Model and credential for one stage.
    async fn resolve_stage(
        &self,
        stage: &Stage,
        task: TaskType,
        default: &ResolvedModel,
    ) -> Result<ResolvedModel, PipelineError> {
        let agent = &stage.agent;
        match &agent.model {
            Some(model) if model.provider == default.model.provider => Ok(ResolvedModel {
                model: model.clone(),
                credential: default.credential.clone(),
            }),
            Some(model) => {
                let credential = self
                    .credentials
                    .credential(&model.provider)
                    .await
                    .ok_or_else(|| {
                        PipelineError::missing_credential(&agent.name, model.provider.as_str())
                    })?;
                Ok(ResolvedModel {
                    model: model.clone(),
                    credential,
                })
            }
            None if stage.shape == StageShape::Image && task != TaskType::Image => {
                self.router.route(TaskType::Image).await.map_err(|_| {
                    PipelineError::resolution(
                        Some(&agent.name),
                        format!(
                            "agent \"{}\" needs an image model, but no image vendor has a credential",
                            agent.name
                        ),
                    )
                })
            }
            None => Ok(default.clone()),
        }
    }

    /// Drives a prepared run, reporting through `sink`.
    ///
    /// Failures are emitted as the terminal `error` event before being
    /// returned; cancellation emits nothing.
    pub async fn run(
        &self,
        prepared: PreparedRun,
        sink: &mut dyn EventSink<ProgressEvent>,
        cancel: &CancellationToken,
    ) -> Result<RunComplete, PipelineError> {
        let PreparedRun {
            request,
            task,
            stages,
            workflow_name,
            from_workflow,
            default,
        } = prepared;
        let initial_input = match task {
            TaskType::Code => prompts::code_user_prompt(&request.input, None),
            _ => prompts::initial_user_prompt(&request.input),
        };
        let mut run = PipelineRun::new(stages, initial_input);
        run.workflow_name = workflow_name;
        info!(
            event = "run.started",
            domain = "pipeline",
            run_id = %run.id,
            stages = run.stages().len() as u64
        );

        let outcome = self
            .drive(&mut run, &request, task, from_workflow, &default, sink, cancel)
            .await;
        match &outcome {
            Ok(_) => {
                run.set_state(RunState::Done);
                info!(
                    event = "run.completed",
                    domain = "pipeline",
                    run_id = %run.id,
                    total_tokens = run.totals().total_tokens,
                    cost_usd = run.total_cost_usd()
                );
            }
            Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                run.set_state(RunState::Aborted);
                info!(
                    event = "run.aborted",
                    domain = "pipeline",
                    run_id = %run.id,
                    stage = run.current_stage() as u64
                );
            }
            Err(err) => {
                run.set_state(RunState::Failed(err.user_message()));
                warn!(
                    event = "run.failed",
                    domain = "pipeline",
                    run_id = %run.id,
                    stage = run.current_stage() as u64,
                    class = err.class().as_str(),
                    error = %err
                );
                let payload = ErrorPayload::from_error(err, self.settings.diagnostics);
                sink.emit(ProgressEvent::Error(payload)).await;
            }
        }
        outcome
    }

    /// Prepares and runs without a progress stream, returning the final payload.
    pub async fn run_to_completion(
        &self,
        request: PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<RunComplete, PipelineError> {
        let prepared = self.prepare(request).await?;
        self.run(prepared, &mut Discard, cancel).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        run: &mut PipelineRun,
        request: &PipelineRequest,
        task: TaskType,
        from_workflow: bool,
        default: &ResolvedModel,
        sink: &mut dyn EventSink<ProgressEvent>,
        cancel: &CancellationToken,
    ) -> Result<RunComplete, PipelineError> {
        let total_stages = run.stages().len();
        for index in 0..total_stages {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let stage = run.stages()[index].clone();
            run.begin_stage(index);
            let start = ProgressEvent::StageStart(StageStart {
                stage_index: index,
                agent_name: stage.agent.name.clone(),
                agent_icon: stage.agent.icon.clone(),
                total_stages,
                stage_shape: stage.shape,
            });
            if !sink.emit(start).await {
                cancel.cancel();
                return Err(PipelineError::Cancelled);
            }

            let resolved = self.resolve_stage(&stage, task, default).await?;
            debug!(
                event = "stage.started",
                domain = "pipeline",
                run_id = %run.id,
                stage = index as u64,
                agent = stage.agent.id.as_str(),
                shape = stage.shape.as_str(),
                model = %resolved.model
            );
            let previous_agent =
                index.checked_sub(1).map(|i| run.stages()[i].agent.name.clone());
            let input = run.current_input().to_string();
            let ctx = StageContext {
                harness: &self.harness,
                cost: self.cost.as_ref(),
                blobs: self.blobs.as_ref(),
                images: &self.settings.images,
                brief: &request.input,
                stage: &stage,
                resolved: &resolved,
                input: &input,
                previous_agent: previous_agent.as_deref(),
                cancel,
            };
            let result = if run.is_last_stage(index) {
                let mut forwarder = TokenForwarder::new(&mut *sink, ProgressEvent::token);
                stage::execute(&ctx, Some(&mut forwarder)).await
            } else {
                stage::execute(&ctx, None).await
            };
            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    if err.is_cancelled() {
                        cancel.cancel();
                    }
                    return Err(err);
                }
            };
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let token_usage = StageUsage {
                usage: output.usage,
                cost_usd: output.cost_usd,
                model: output.model.model.clone(),
            };
            run.complete_stage(StageRecord {
                stage_index: index,
                agent_id: stage.agent.id.clone(),
                agent_name: stage.agent.name.clone(),
                agent_icon: stage.agent.icon.clone(),
                agent_description: stage.agent.description.clone(),
                stage_shape: stage.shape,
                provider: output.model.provider.to_string(),
                input,
                output: output.text,
                token_usage: token_usage.clone(),
            });
            let complete = ProgressEvent::StageComplete(StageComplete {
                stage_index: index,
                agent_name: stage.agent.name.clone(),
                token_usage,
            });
            if !sink.emit(complete).await {
                cancel.cancel();
                return Err(PipelineError::Cancelled);
            }
        }

        run.set_state(RunState::Finalizing);
        let complete = self.finalize(run, request, from_workflow)?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.persist(run, &complete).await?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !sink
            .emit(ProgressEvent::RunComplete(Box::new(complete.clone())))
            .await
        {
            debug!(
                event = "run.complete_undelivered",
                domain = "pipeline",
                run_id = %run.id
            );
        }
        Ok(complete)
    }

    fn finalize(
        &self,
        run: &PipelineRun,
        request: &PipelineRequest,
        from_workflow: bool,
    ) -> Result<RunComplete, PipelineError> {
        let last = run
            .last_output()
            .ok_or_else(|| PipelineError::Invalid("run finished without any stage".into()))?;
        let content = last.output.clone();
        let output = RunOutput {
            metrics: self.analyzer.analyze(&content),
            tips: self.tips.tips(&request.input.content_type),
            content,
            model: last.token_usage.model.clone(),
            provider: last.provider.clone(),
            token_usage: RunUsage {
                usage: run.totals(),
                cost_usd: run.total_cost_usd(),
            },
            agent_pipeline: from_workflow.then(|| run.records().to_vec()),
        };
        Ok(RunComplete {
            id: run.id,
            input: request.input.clone(),
            output,
            workflow_name: run.workflow_name.clone(),
            created_at: run.created_at,
        })
    }

    async fn persist(&self, run: &PipelineRun, complete: &RunComplete) -> Result<(), PipelineError> {
        self.recorder.save_history(complete).await?;
        self.recorder
            .save_usage(&UsageRecord {
                run_id: run.id,
                kind: "pipeline".to_string(),
                provider: complete.output.provider.clone(),
                model: complete.output.model.clone(),
                usage: run.totals(),
                cost_usd: run.total_cost_usd(),
                created_at: Utc::now(),
            })
            .await?;
        for record in run.records() {
            self.recorder
                .save_memory(&MemoryRecord {
                    run_id: run.id,
                    agent_id: record.agent_id.clone(),
                    stage_index: record.stage_index,
                    summary: summarize(&record.output),
                    created_at: Utc::now(),
                })
                .await?;
        }
        debug!(
            event = "run.persisted",
            domain = "pipeline",
            run_id = %run.id,
            memories = run.records().len() as u64
        );
        Ok(())
    }
}
