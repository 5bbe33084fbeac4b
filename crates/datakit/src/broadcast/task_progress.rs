//! Task progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Parse,
    Deduplication,
}

/// Progress event for a parse or deduplication task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgressEvent {
    pub task_id: String,
    pub kind: TaskKind,
    pub task_type: String,
    /// Status name as exposed by the owning task (`queued`, `pending`, `running`, ...).
    pub status: String,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Set on successful completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Set on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskProgressEvent {
    pub fn new(
        task_id: &str,
        kind: TaskKind,
        task_type: &str,
        status: &str,
        progress: u8,
        message: &str,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind,
            task_type: task_type.to_string(),
            status: status.to_string(),
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            file_id: None,
            record_id: None,
            error: None,
        }
    }

    pub fn with_file(mut self, file_id: &str) -> Self {
        self.file_id = Some(file_id.to_string());
        self
    }

    pub fn with_record(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Broadcaster for task progress events.
#[derive(Clone)]
pub struct TaskProgressBroadcaster {
    sender: Arc<broadcast::Sender<TaskProgressEvent>>,
}

impl TaskProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: TaskProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TaskProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
