use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use writeflow_ai_harness::TokenUsage;

use crate::error::PipelineError;
use crate::progress::RunComplete;

/// Destination for generated image bytes.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns the URL they are served from.
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Keeps blobs in memory and hands out `{url_prefix}/{id}` URLs.
pub struct InMemoryBlobStore {
    url_prefix: String,
    blobs: DashMap<String, StoredBlob>,
}

impl InMemoryBlobStore {
    pub const DEFAULT_URL_PREFIX: &'static str = "/api/blobs";

    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            blobs: DashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<StoredBlob> {
        self.blobs.get(id).map(|b| b.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_URL_PREFIX)
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::Storage("refusing to store an empty blob".into()));
        }
        let id = format!("{}.{}", Uuid::new_v4(), extension_for(mime_type));
        self.blobs.insert(
            id.clone(),
            StoredBlob {
                bytes,
                mime_type: mime_type.to_string(),
            },
        );
        Ok(format!("{}/{id}", self.url_prefix))
    }
}

/// Usage line written once per run or chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub run_id: Uuid,
    pub kind: String,
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Summary of what an agent produced, fed back as memory on later runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub run_id: Uuid,
    pub agent_id: String,
    pub stage_index: usize,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence for finished runs. Only called while finalizing.
#[async_trait::async_trait]
pub trait RunRecorder: Send + Sync {
    async fn save_history(&self, run: &RunComplete) -> Result<(), PipelineError>;
    async fn save_usage(&self, usage: &UsageRecord) -> Result<(), PipelineError>;
    async fn save_memory(&self, memory: &MemoryRecord) -> Result<(), PipelineError>;
}

#[derive(Default)]
pub struct InMemoryRecorder {
    history: Mutex<Vec<RunComplete>>,
    usage: Mutex<Vec<UsageRecord>>,
    memory: Mutex<Vec<MemoryRecord>>,
}

fn push<T>(slot: &Mutex<Vec<T>>, value: T) {
    slot.lock().unwrap_or_else(|e| e.into_inner()).push(value);
}

fn snapshot<T: Clone>(slot: &Mutex<Vec<T>>) -> Vec<T> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<RunComplete> {
        snapshot(&self.history)
    }

    pub fn usage(&self) -> Vec<UsageRecord> {
        snapshot(&self.usage)
    }

    pub fn memories(&self) -> Vec<MemoryRecord> {
        snapshot(&self.memory)
    }

    /// Memories for one agent, newest first.
    pub fn memories_for(&self, agent_id: &str) -> Vec<MemoryRecord> {
        let mut found: Vec<MemoryRecord> = snapshot(&self.memory)
            .into_iter()
            .filter(|m| m.agent_id == agent_id)
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub fn is_empty(&self) -> bool {
        self.history().is_empty() && self.usage().is_empty() && self.memories().is_empty()
    }
}

#[async_trait::async_trait]
impl RunRecorder for InMemoryRecorder {
    async fn save_history(&self, run: &RunComplete) -> Result<(), PipelineError> {
        push(&self.history, run.clone());
        Ok(())
    }

    async fn save_usage(&self, usage: &UsageRecord) -> Result<(), PipelineError> {
        push(&self.usage, usage.clone());
        Ok(())
    }

    async fn save_memory(&self, memory: &MemoryRecord) -> Result<(), PipelineError> {
        push(&self.memory, memory.clone());
        Ok(())
    }
}
