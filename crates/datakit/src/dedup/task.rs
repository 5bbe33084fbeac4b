use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::algorithm::DuplicateGroup;
use crate::config::DedupParams;
use crate::logs::LogSummary;
use crate::records::DatasetRef;
use crate::task::{CancelFlag, TaskProgress};

/// `task_type` reported for deduplication tasks and their output records.
pub const DEDUP_TASK_TYPE: &str = "deduplication";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl DedupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupStatus::Pending => "pending",
            DedupStatus::Running => "running",
            DedupStatus::Completed => "completed",
            DedupStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DedupStatus::Completed | DedupStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupSummary {
    pub original_count: usize,
    pub kept_count: usize,
    pub deleted_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationTask {
    pub task_id: String,
    pub name: String,
    pub status: DedupStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub input: Vec<DatasetRef>,
    /// Present only once the task completes.
    #[serde(default)]
    pub output: Option<DatasetRef>,
    pub tags: BTreeSet<String>,
    pub params: DedupParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<DedupSummary>,
    /// Items removed as near-duplicates, grouped by the item that was kept.
    /// Filled on completion.
    #[serde(default)]
    pub duplicates: Vec<DuplicateGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

impl DeduplicationTask {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress_snapshot(&self) -> TaskProgress {
        TaskProgress {
            progress: self.progress,
            status: self.status.as_str().to_string(),
            task_type: DEDUP_TASK_TYPE.to_string(),
        }
    }
}

/// A task together with a summary of its log, as returned by `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupTaskDetail {
    #[serde(flatten)]
    pub task: DeduplicationTask,
    pub logs: LogSummary,
}

/// Creation request. Each input is a file id of a parsed file or a record id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDedupTask {
    pub name: String,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Falls back to the configured defaults when absent.
    #[serde(default)]
    pub params: Option<DedupParams>,
}

impl NewDedupTask {
    pub fn new(name: impl Into<String>, inputs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            inputs,
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(mut self, params: DedupParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// Comma-separated tag search. Every term must be a case-insensitive substring
/// of at least one of the task's tags. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    terms: Vec<String>,
}

impl TagFilter {
    pub fn parse(raw: &str) -> Self {
        let terms = raw
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        self.terms
            .iter()
            .all(|term| tags.iter().any(|tag| tag.to_lowercase().contains(term)))
    }
}

pub(crate) fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Manager-side state of one task.
pub(crate) struct DedupSlot {
    pub(crate) seq: u64,
    pub(crate) task: DeduplicationTask,
    pub(crate) cancel: CancelFlag,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_tag_filter_substring_and() {
        let task_tags = tags(&["Finance-Q3", "audit"]);

        assert!(TagFilter::parse("").matches(&task_tags));
        assert!(TagFilter::parse("fin").matches(&task_tags));
        assert!(TagFilter::parse("q3, aud").matches(&task_tags));
        assert!(!TagFilter::parse("q3,legal").matches(&task_tags));
        assert!(!TagFilter::parse("legal").matches(&tags(&[])));
        assert!(TagFilter::parse(" , ").is_empty());
    }

    #[test]
    fn test_normalize_tags() {
        let normalized = normalize_tags(&[
            " a ".to_string(),
            "".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(normalized, tags(&["a", "b"]));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!DedupStatus::Pending.is_terminal());
        assert!(!DedupStatus::Running.is_terminal());
        assert!(DedupStatus::Completed.is_terminal());
        assert!(DedupStatus::Failed.is_terminal());
        assert_eq!(
            serde_json::to_string(&DedupStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
