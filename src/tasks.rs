//! Asynchronous query tasks.
//!
//! `POST /tasks` records a [`TaskRecord`] in a [`TaskStore`], runs the query
//! in the background, and updates the record as it moves through
//! `pending → running → completed | failed`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::envelope::ResponseEnvelope;
use crate::traits::TaskStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub status: TaskStatus,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<ResponseEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn pending(query: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            query: query.to_string(),
            created_at: now,
            updated_at: now,
            envelope: None,
            error: None,
        }
    }

    pub fn running(mut self) -> Self {
        self.status = TaskStatus::Running;
        self.updated_at = Utc::now();
        self
    }

    /// Completed with an envelope. An envelope reporting `success: false`
    /// marks the task failed, with the answer text as the error.
    pub fn finished(mut self, envelope: ResponseEnvelope) -> Self {
        if envelope.success {
            self.status = TaskStatus::Completed;
        } else {
            self.status = TaskStatus::Failed;
            self.error = Some(envelope.final_answer.clone());
        }
        self.envelope = Some(envelope);
        self.updated_at = Utc::now();
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        self
    }
}

/// Process-local [`TaskStore`].
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<String, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, record: TaskRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.records.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}
