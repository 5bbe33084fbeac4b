use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::files::model::ParseSnapshot;
use crate::files::ParseStatus;
use crate::task::{CancelFlag, TaskProgress};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTask {
    pub task_id: String,
    pub file_id: String,
    pub task_type: String,
    pub status: ParseStatus,
    pub progress: u8,
    /// Set only once the task completes.
    #[serde(default)]
    pub record_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseTask {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress_snapshot(&self) -> TaskProgress {
        TaskProgress {
            progress: self.progress,
            status: self.status.as_str().to_string(),
            task_type: self.task_type.clone(),
        }
    }
}

/// Result of a parse submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseSubmission {
    /// Record id the task will attach on success.
    pub record_id: String,
    pub task: ParseTask,
}

/// Tracker-side state of one task.
pub(crate) struct TaskSlot {
    pub(crate) seq: u64,
    pub(crate) task: ParseTask,
    /// Content-addressed id computed at submission.
    pub(crate) reserved_record_id: String,
    pub(crate) cancel: CancelFlag,
    /// File parse fields from before this task was bound.
    pub(crate) previous: Option<ParseSnapshot>,
    /// Set when a queued task is withdrawn; the worker then skips it.
    pub(crate) withdrawn: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_snapshot() {
        let task = ParseTask {
            task_id: "t1".to_string(),
            file_id: "f1".to_string(),
            task_type: "parse".to_string(),
            status: ParseStatus::Running,
            progress: 42,
            record_id: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: None,
            error: None,
        };
        assert_eq!(
            task.progress_snapshot(),
            TaskProgress {
                progress: 42,
                status: "running".to_string(),
                task_type: "parse".to_string(),
            }
        );
        assert!(!task.is_terminal());

        let json = serde_json::to_value(&task).unwrap();
        assert!(json["record_id"].is_null());
        assert!(json.get("finished_at").is_none());
    }
}
