//! Task log store with optional write-through database persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::export::{self, ExportFormat, LogExport};
use super::{EntryLevel, LogEntry, LogSummary};
use crate::broadcast::LogBroadcaster;
use crate::clock::Clock;
use crate::config::LogsConfig;
use crate::db::log_repo::{self, LogRow};
use crate::db::Database;
use crate::error::{DatakitError, Result};
use crate::sync::{read_lock, write_lock};

type Stream = Arc<RwLock<Vec<LogEntry>>>;

// ─── Row conversion ─────────────────────────────────────────────────────────

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

impl LogEntry {
    fn to_row(&self) -> LogRow {
        LogRow {
            task_id: self.task_id.clone(),
            seq: self.seq as i64,
            timestamp: self.timestamp.to_rfc3339(),
            level: self.level.as_str().to_string(),
            message: self.message.clone(),
        }
    }

    fn from_row(row: &LogRow) -> Self {
        Self {
            task_id: row.task_id.clone(),
            seq: row.seq.max(0) as u64,
            timestamp: parse_timestamp(&row.timestamp),
            level: EntryLevel::parse(&row.level, &row.task_id),
            message: row.message.clone(),
        }
    }
}

// ─── LogCursor ──────────────────────────────────────────────────────────────

/// Lazy reader over one task's stream.
///
/// Each step takes the stream's read lock only for the duration of a single
/// clone, so a slow consumer never blocks appends. Entries appended while the
/// cursor is live are picked up by later calls to `next`.
pub struct LogCursor {
    stream: Option<Stream>,
    next_index: usize,
}

impl LogCursor {
    /// Sequence number of the last entry yielded; pass it back as `since` to resume.
    pub fn position(&self) -> u64 {
        self.next_index as u64
    }
}

impl Iterator for LogCursor {
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        let stream = self.stream.as_ref()?;
        let entry = read_lock(stream, "Log stream")
            .get(self.next_index)
            .cloned()?;
        self.next_index += 1;
        Some(entry)
    }
}

// ─── LogStore ───────────────────────────────────────────────────────────────

/// Append-only log sink keyed by task id.
///
/// One `RwLock` per task stream; the outer map lock is only held to look up or
/// create a stream.
pub struct LogStore {
    streams: RwLock<HashMap<String, Stream>>,
    db: RwLock<Option<Database>>,
    clock: Arc<dyn Clock>,
    broadcaster: Option<LogBroadcaster>,
    max_entries_per_task: usize,
    summary_tail: usize,
}

impl LogStore {
    pub fn new(config: &LogsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            db: RwLock::new(None),
            clock,
            broadcaster: None,
            max_entries_per_task: config.max_entries_per_task,
            summary_tail: config.summary_tail,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: LogBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn set_database(&self, db: Database) {
        *write_lock(&self.db, "Log store DB") = Some(db);
    }

    fn get_database(&self) -> Option<Database> {
        read_lock(&self.db, "Log store DB").clone()
    }

    fn stream(&self, task_id: &str) -> Option<Stream> {
        read_lock(&self.streams, "Log store").get(task_id).cloned()
    }

    fn stream_or_create(&self, task_id: &str) -> Stream {
        if let Some(stream) = self.stream(task_id) {
            return stream;
        }
        let mut streams = write_lock(&self.streams, "Log store");
        Arc::clone(streams.entry(task_id.to_string()).or_default())
    }

    /// Appends one entry. Fails with `Unavailable` once the task's stream is
    /// full or when the write-through to the database fails.
    pub fn append(
        &self,
        task_id: &str,
        level: EntryLevel,
        message: impl Into<String>,
    ) -> Result<LogEntry> {
        let stream = self.stream_or_create(task_id);
        let mut entries = write_lock(&stream, "Log stream");

        if entries.len() >= self.max_entries_per_task {
            return Err(DatakitError::Unavailable(format!(
                "log for task {} reached its limit of {} entries",
                task_id, self.max_entries_per_task
            )));
        }

        let entry = LogEntry {
            task_id: task_id.to_string(),
            seq: entries.len() as u64 + 1,
            timestamp: self.clock.now(),
            level,
            message: message.into(),
        };

        if let Some(db) = self.get_database() {
            log_repo::insert(&db, &entry.to_row())?;
        }

        entries.push(entry.clone());
        drop(entries);

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(entry.clone());
        }

        Ok(entry)
    }

    /// Like [`append`](Self::append) but only logs a warning on failure.
    /// Used on task-execution paths where a full log must not change the outcome.
    pub fn record(&self, task_id: &str, level: EntryLevel, message: impl Into<String>) {
        if let Err(e) = self.append(task_id, level, message) {
            log::warn!("Dropping log entry for task {}: {}", task_id, e);
        }
    }

    /// Lazily reads entries with `seq > since`, in append order.
    pub fn read(&self, task_id: &str, since: Option<u64>) -> LogCursor {
        LogCursor {
            stream: self.stream(task_id),
            next_index: since.unwrap_or(0) as usize,
        }
    }

    pub fn entries(&self, task_id: &str) -> Vec<LogEntry> {
        let Some(stream) = self.stream(task_id) else {
            return Vec::new();
        };
        let entries = read_lock(&stream, "Log stream").clone();
        entries
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.stream(task_id).is_some()
    }

    pub fn len(&self, task_id: &str) -> usize {
        let Some(stream) = self.stream(task_id) else {
            return 0;
        };
        let len = read_lock(&stream, "Log stream").len();
        len
    }

    /// Renders the whole stream. Repeated exports of an unchanged stream are identical.
    pub fn export(&self, task_id: &str, format: ExportFormat) -> Result<LogExport> {
        let Some(stream) = self.stream(task_id) else {
            return export::render(task_id, std::iter::empty::<&LogEntry>(), format);
        };
        let entries = read_lock(&stream, "Log stream");
        let rendered = export::render(task_id, entries.iter(), format);
        rendered
    }

    pub fn summary(&self, task_id: &str) -> LogSummary {
        let Some(stream) = self.stream(task_id) else {
            return LogSummary::empty();
        };
        let entries = read_lock(&stream, "Log stream");
        let summary = LogSummary::from_entries(&entries, self.summary_tail);
        summary
    }

    /// Loads persisted streams into memory. Streams already in memory are kept.
    pub fn load_from_database(&self) -> Result<usize> {
        let Some(db) = self.get_database() else {
            return Ok(0);
        };

        let rows = log_repo::load_all(&db)?;
        let mut grouped: HashMap<String, Vec<LogEntry>> = HashMap::new();
        for row in &rows {
            grouped
                .entry(row.task_id.clone())
                .or_default()
                .push(LogEntry::from_row(row));
        }

        let mut streams = write_lock(&self.streams, "Log store");
        let mut loaded = 0;
        for (task_id, entries) in grouped {
            if streams.contains_key(&task_id) {
                continue;
            }
            loaded += entries.len();
            streams.insert(task_id, Arc::new(RwLock::new(entries)));
        }

        log::info!("Loaded {} task log entries from database", loaded);
        Ok(loaded)
    }
}
