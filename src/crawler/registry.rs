use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use chrono::Local;
use tokio::sync::RwLock;
use tracing::debug;

use crate::crawler::stats::Statistics;
use crate::crawler::task::{LogEntry, TaskRecord, TaskStatus};

/// Partial update applied to a task record. Absent fields are left alone.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub message: Option<String>,
    pub progress: Option<u8>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Default::default() }
    }

    pub fn progress(progress: u8) -> Self {
        Self { progress: Some(progress), ..Default::default() }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Process-wide, in-memory task table shared by the HTTP layer and workers.
/// Records are never evicted.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in the pending state
    pub async fn create(&self, task_id: &str, output_file: PathBuf) -> TaskRecord {
        let record = TaskRecord::new(task_id, output_file);
        self.tasks.write().await.insert(task_id.to_string(), record.clone());
        debug!("Registered task {}", task_id);
        record
    }

    /// Apply a partial update. Unknown task ids are ignored.
    pub async fn update(&self, task_id: &str, update: TaskUpdate) {
        let mut tasks = self.tasks.write().await;
        let Some(record) = tasks.get_mut(task_id) else {
            debug!("Ignoring update for unknown task {}", task_id);
            return;
        };

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(message) = update.message {
            record.logs.push(LogEntry { time: Local::now(), message });
        }
        if let Some(progress) = update.progress {
            record.progress = progress.min(100);
        }
    }

    /// Attach the final statistics to a task
    pub async fn set_statistics(&self, task_id: &str, statistics: Statistics) {
        if let Some(record) = self.tasks.write().await.get_mut(task_id) {
            record.statistics = Some(statistics);
        }
    }

    /// Snapshot of a task record
    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Number of tracked tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }
}
