use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use writeflow_ai_harness::TokenUsage;

use crate::definition::{Stage, StageShape};

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Resolving,
    Running(usize),
    Finalizing,
    Done,
    /// Caller went away; nothing is emitted or persisted afterwards.
    Aborted,
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Failed(_))
    }
}

/// Token and cost breakdown for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageUsage {
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub model: String,
}

/// Completed stage as reported in `agentPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage_index: usize,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_icon: String,
    pub agent_description: String,
    pub stage_shape: StageShape,
    pub provider: String,
    pub input: String,
    pub output: String,
    pub token_usage: StageUsage,
}

/// Mutable accumulator for one request.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: Uuid,
    state: RunState,
    stages: Vec<Stage>,
    current_stage: usize,
    totals: TokenUsage,
    total_cost_usd: f64,
    current_input: String,
    records: Vec<StageRecord>,
    pub workflow_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(stages: Vec<Stage>, initial_input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Resolving,
            stages,
            current_stage: 0,
            totals: TokenUsage::default(),
            total_cost_usd: 0.0,
            current_input: initial_input.into(),
            records: Vec::new(),
            workflow_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    pub fn current_input(&self) -> &str {
        &self.current_input
    }

    pub fn totals(&self) -> TokenUsage {
        self.totals
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StageRecord> {
        self.records
    }

    /// Output of the most recently completed stage.
    pub fn last_output(&self) -> Option<&StageRecord> {
        self.records.last()
    }

    pub fn is_last_stage(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }

    pub fn begin_stage(&mut self, index: usize) {
        self.state = RunState::Running(index);
    }

    /// Folds a finished stage into the totals and threads its output forward.
    pub fn complete_stage(&mut self, record: StageRecord) {
        self.totals += record.token_usage.usage;
        self.total_cost_usd += record.token_usage.cost_usd;
        self.current_input = record.output.clone();
        self.current_stage = record.stage_index + 1;
        self.records.push(record);
    }

    pub fn set_state(&mut self, state: RunState) {
        if !self.state.is_terminal() {
            self.state = state;
        }
    }
}
