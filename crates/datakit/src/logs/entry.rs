use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl EntryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryLevel::Debug => "debug",
            EntryLevel::Info => "info",
            EntryLevel::Warning => "warning",
            EntryLevel::Error => "error",
        }
    }

    /// Parses a stored level, falling back to `Info` for unknown values.
    pub fn parse(s: &str, task_id: &str) -> Self {
        match s {
            "debug" => EntryLevel::Debug,
            "info" => EntryLevel::Info,
            "warning" | "warn" => EntryLevel::Warning,
            "error" => EntryLevel::Error,
            other => {
                log::warn!(
                    "Unknown log level '{}' for task {}, defaulting to info",
                    other,
                    task_id
                );
                EntryLevel::Info
            }
        }
    }
}

impl std::fmt::Display for EntryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable line in a task's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub task_id: String,
    /// Position within the task's stream, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: EntryLevel,
    pub message: String,
}

/// Condensed view of a task's log, embedded in task queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub total: usize,
    pub counts: BTreeMap<EntryLevel, usize>,
    /// Most recent entries, oldest first.
    pub recent: Vec<LogEntry>,
}

impl LogSummary {
    pub fn empty() -> Self {
        Self {
            total: 0,
            counts: BTreeMap::new(),
            recent: Vec::new(),
        }
    }

    pub fn from_entries(entries: &[LogEntry], tail: usize) -> Self {
        let mut counts = BTreeMap::new();
        for entry in entries {
            *counts.entry(entry.level).or_insert(0) += 1;
        }
        let start = entries.len().saturating_sub(tail);
        Self {
            total: entries.len(),
            counts,
            recent: entries[start..].to_vec(),
        }
    }

    pub fn count(&self, level: EntryLevel) -> usize {
        self.counts.get(&level).copied().unwrap_or(0)
    }
}
