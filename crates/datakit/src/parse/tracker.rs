//! Parse task tracker.
//!
//! State machine `queued → running → {completed | failed}`. Every transition
//! is applied to the task and mirrored onto its file while holding the file
//! entry lock and then the task lock, so readers never see the two disagree.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::task::{ParseSubmission, ParseTask, TaskSlot};
use crate::broadcast::{TaskKind, TaskProgressBroadcaster, TaskProgressEvent};
use crate::clock::Clock;
use crate::db::history_repo::{self, HistoryRow};
use crate::db::Database;
use crate::error::{DatakitError, ParseError, Result};
use crate::files::{FileRegistry, ParseStatus};
use crate::logs::{EntryLevel, LogStore};
use crate::parser::{ParseObserver, ParserRegistry};
use crate::records::{content_record_id, ParsedRecord, RecordStore};
use crate::sync::{read_lock, write_lock};
use crate::task::{advance_progress, panic_message, CancelFlag, TaskProgress};
use crate::worker::{Work, WorkerPool};

type Slot = Arc<RwLock<TaskSlot>>;

/// Default `task_type` for plain text extraction.
pub const DEFAULT_TASK_TYPE: &str = "parse";

fn validate_task_type(task_type: &str) -> Result<()> {
    let valid = !task_type.is_empty()
        && task_type.len() <= 64
        && task_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DatakitError::Validation(format!(
            "invalid task_type '{}'",
            task_type
        )))
    }
}

fn progress_event(task: &ParseTask, message: &str, at: DateTime<Utc>) -> TaskProgressEvent {
    let mut event = TaskProgressEvent::new(
        &task.task_id,
        TaskKind::Parse,
        &task.task_type,
        task.status.as_str(),
        task.progress,
        message,
    )
    .with_file(&task.file_id)
    .at(at);
    if let Some(record_id) = &task.record_id {
        event = event.with_record(record_id);
    }
    if let Some(error) = &task.error {
        event = event.with_error(error);
    }
    event
}

// ─── Tracker ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ParseTaskTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    files: Arc<FileRegistry>,
    records: Arc<RecordStore>,
    logs: Arc<LogStore>,
    parsers: Arc<ParserRegistry>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
    progress: TaskProgressBroadcaster,
    tasks: RwLock<HashMap<String, Slot>>,
    next_seq: AtomicU64,
    /// record_id → number of completed parses, used when no database is attached.
    history: RwLock<HashMap<String, u64>>,
    db: RwLock<Option<Database>>,
}

/// Immutable facts about a task, captured when its worker picks it up.
struct RunContext {
    task_id: String,
    file_id: String,
    task_type: String,
    record_id: String,
    cancel: CancelFlag,
}

enum CancelOutcome {
    Withdrawn(ParseTask),
    Signalled(ParseTask),
}

impl ParseTaskTracker {
    pub fn new(
        files: Arc<FileRegistry>,
        records: Arc<RecordStore>,
        logs: Arc<LogStore>,
        parsers: Arc<ParserRegistry>,
        pool: Arc<WorkerPool>,
        clock: Arc<dyn Clock>,
        progress: TaskProgressBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                files,
                records,
                logs,
                parsers,
                pool,
                clock,
                progress,
                tasks: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                history: RwLock::new(HashMap::new()),
                db: RwLock::new(None),
            }),
        }
    }

    pub fn set_database(&self, db: Database) {
        *write_lock(&self.inner.db, "Parse history DB") = Some(db);
    }

    /// Creates a queued task bound to the file and schedules it.
    ///
    /// Fails with `Conflict` while another task for the same file is not terminal.
    pub fn submit(&self, file_id: &str, task_type: &str) -> Result<ParseSubmission> {
        validate_task_type(task_type)?;
        let inner = &self.inner;

        let bytes = inner.files.read_blob(file_id)?;
        let record_id = content_record_id(task_type, &bytes);
        let task_id = Uuid::new_v4().to_string();
        let now = inner.clock.now();

        let task = ParseTask {
            task_id: task_id.clone(),
            file_id: file_id.to_string(),
            task_type: task_type.to_string(),
            status: ParseStatus::Queued,
            progress: 0,
            record_id: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            error: None,
        };
        let slot: Slot = Arc::new(RwLock::new(TaskSlot {
            seq: inner.next_seq.fetch_add(1, Ordering::SeqCst),
            task: task.clone(),
            reserved_record_id: record_id.clone(),
            cancel: CancelFlag::new(),
            previous: None,
            withdrawn: false,
        }));

        inner.files.update_entry(file_id, |entry| {
            let snapshot = entry.bind_parse_task(&task_id)?;
            write_lock(&slot, "Parse task").previous = Some(snapshot);
            Ok(())
        })?;
        write_lock(&inner.tasks, "Parse tasks").insert(task_id.clone(), Arc::clone(&slot));
        inner
            .progress
            .send(progress_event(&task, "Parse task queued", now));

        let worker_inner = Arc::clone(inner);
        let worker_task_id = task_id.clone();
        let work = Work::new(format!("parse {}", task_id), move || {
            run(&worker_inner, &worker_task_id)
        });
        if let Err(e) = inner.pool.submit(work) {
            log::error!("Failed to schedule parse task {}: {}", task_id, e);
            if let Err(undo) = self.cancel(&task_id) {
                log::warn!("Failed to withdraw unscheduled task {}: {}", task_id, undo);
            }
            return Err(e.into());
        }

        log::info!(
            "Queued parse task {} ({}) for file {}",
            task_id,
            task_type,
            file_id
        );

        Ok(ParseSubmission { record_id, task })
    }

    pub fn get(&self, task_id: &str) -> Result<ParseTask> {
        let slot = self.inner.slot(task_id)?;
        let task = read_lock(&slot, "Parse task").task.clone();
        Ok(task)
    }

    /// Pure read of `{progress, status, task_type}`.
    pub fn get_progress(&self, task_id: &str) -> Result<TaskProgress> {
        Ok(self.get(task_id)?.progress_snapshot())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.inner.slot(task_id).is_ok()
    }

    /// Every task ever submitted for the file, oldest first.
    pub fn list_for_file(&self, file_id: &str) -> Vec<ParseTask> {
        let mut tasks: Vec<(u64, ParseTask)> = self
            .inner
            .slots()
            .into_iter()
            .filter_map(|(_, slot)| {
                let guard = read_lock(&slot, "Parse task");
                if guard.task.file_id == file_id {
                    Some((guard.seq, guard.task.clone()))
                } else {
                    None
                }
            })
            .collect();
        tasks.sort_by_key(|(seq, _)| *seq);
        tasks.into_iter().map(|(_, task)| task).collect()
    }

    /// Number of completed parse tasks, across history, that produced `record_id`.
    pub fn history_exists(&self, record_id: &str) -> Result<u64> {
        if let Some(db) = self.inner.get_database() {
            return Ok(history_repo::count_by_record(&db, record_id)?);
        }
        let count = read_lock(&self.inner.history, "Parse history")
            .get(record_id)
            .copied()
            .unwrap_or(0);
        Ok(count)
    }

    /// Queued tasks are withdrawn without side effects on the file. Running tasks
    /// end as `failed` with a "cancelled" log entry and their worker is signalled
    /// to stop. Terminal tasks cannot be cancelled.
    pub fn cancel(&self, task_id: &str) -> Result<ParseTask> {
        let inner = &self.inner;
        let slot = inner.slot(task_id)?;
        let file_id = read_lock(&slot, "Parse task").task.file_id.clone();

        let outcome = inner.files.update_entry(&file_id, |entry| {
            let mut guard = write_lock(&slot, "Parse task");
            match guard.task.status {
                ParseStatus::Queued => {
                    match guard.previous.take() {
                        Some(previous) => entry.restore(previous),
                        None => entry.active_task = None,
                    }
                    guard.withdrawn = true;
                    guard.cancel.cancel();
                    Ok(CancelOutcome::Withdrawn(guard.task.clone()))
                }
                ParseStatus::Running => {
                    guard.cancel.cancel();
                    Ok(CancelOutcome::Signalled(guard.task.clone()))
                }
                status => Err(DatakitError::Conflict(format!(
                    "parse task {} is already {}",
                    task_id,
                    status.as_str()
                ))),
            }
        })?;

        match outcome {
            CancelOutcome::Withdrawn(task) => {
                write_lock(&inner.tasks, "Parse tasks").remove(task_id);
                log::info!("Withdrew queued parse task {}", task_id);
                Ok(task)
            }
            CancelOutcome::Signalled(task) => {
                fail(inner, &slot, task_id, &task.file_id, EntryLevel::Warning, "cancelled");
                log::info!("Cancelled running parse task {}", task_id);
                self.get(task_id)
            }
        }
    }

    /// Fails running tasks whose start is older than `timeout`. Returns their ids.
    pub fn sweep_timeouts(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut failed = Vec::new();
        for (task_id, slot) in self.inner.slots() {
            let expired = {
                let guard = read_lock(&slot, "Parse task");
                let overdue = guard.task.status == ParseStatus::Running
                    && guard
                        .task
                        .started_at
                        .is_some_and(|started| now - started > timeout);
                if overdue {
                    guard.cancel.cancel();
                    Some(guard.task.file_id.clone())
                } else {
                    None
                }
            };

            if let Some(file_id) = expired {
                let reason = format!("timed out after {}s", timeout.num_seconds());
                if fail(&self.inner, &slot, &task_id, &file_id, EntryLevel::Error, &reason) {
                    log::warn!("Parse task {} {}", task_id, reason);
                    failed.push(task_id);
                }
            }
        }
        failed
    }

    pub fn len(&self) -> usize {
        read_lock(&self.inner.tasks, "Parse tasks").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackerInner {
    fn slot(&self, task_id: &str) -> Result<Slot> {
        read_lock(&self.tasks, "Parse tasks")
            .get(task_id)
            .cloned()
            .ok_or_else(|| DatakitError::not_found("parse task", task_id))
    }

    fn slots(&self) -> Vec<(String, Slot)> {
        read_lock(&self.tasks, "Parse tasks")
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect()
    }

    fn get_database(&self) -> Option<Database> {
        read_lock(&self.db, "Parse history DB").clone()
    }

    fn record_history(&self, task: &ParseTask, record_id: &str) {
        *write_lock(&self.history, "Parse history")
            .entry(record_id.to_string())
            .or_insert(0) += 1;

        if let Some(db) = self.get_database() {
            let row = HistoryRow {
                task_id: task.task_id.clone(),
                record_id: record_id.to_string(),
                file_id: task.file_id.clone(),
                task_type: task.task_type.clone(),
                completed_at: task
                    .finished_at
                    .unwrap_or_else(|| self.clock.now())
                    .to_rfc3339(),
            };
            if let Err(e) = history_repo::insert(&db, &row) {
                log::error!("Failed to persist parse history for {}: {}", task.task_id, e);
            }
        }
    }
}

// ─── Execution ──────────────────────────────────────────────────────────────

fn run(inner: &TrackerInner, task_id: &str) {
    let Ok(slot) = inner.slot(task_id) else {
        log::debug!("Parse task {} was withdrawn before it started", task_id);
        return;
    };

    let ctx = {
        let guard = read_lock(&slot, "Parse task");
        if guard.withdrawn || guard.task.status != ParseStatus::Queued {
            return;
        }
        RunContext {
            task_id: task_id.to_string(),
            file_id: guard.task.file_id.clone(),
            task_type: guard.task.task_type.clone(),
            record_id: guard.reserved_record_id.clone(),
            cancel: guard.cancel.clone(),
        }
    };

    let _span = tracing::info_span!(
        "parse_task",
        task_id = %ctx.task_id,
        file_id = %ctx.file_id,
        task_type = %ctx.task_type
    )
    .entered();

    let now = inner.clock.now();
    let started = inner.files.update_entry(&ctx.file_id, |entry| {
        let mut guard = write_lock(&slot, "Parse task");
        if guard.withdrawn || guard.task.status != ParseStatus::Queued {
            return Ok(None);
        }
        entry.attach_parse_result(ParseStatus::Running, 0, None)?;
        guard.task.status = ParseStatus::Running;
        guard.task.started_at = Some(now);
        inner
            .logs
            .record(&ctx.task_id, EntryLevel::Info, "Parsing started");
        Ok(Some(guard.task.clone()))
    });

    match started {
        Ok(Some(task)) => inner.progress.send(progress_event(&task, "Parsing started", now)),
        Ok(None) => return,
        Err(e) => {
            fail(inner, &slot, &ctx.task_id, &ctx.file_id, EntryLevel::Error, &e.to_string());
            return;
        }
    }

    match extract(inner, &slot, &ctx) {
        Ok(content) => complete(inner, &slot, &ctx, content),
        Err(DatakitError::Parse(ParseError::Cancelled)) => {
            if fail(inner, &slot, &ctx.task_id, &ctx.file_id, EntryLevel::Warning, "cancelled") {
                log::info!("Parse task {} cancelled", ctx.task_id);
            }
        }
        Err(e) => {
            if fail(inner, &slot, &ctx.task_id, &ctx.file_id, EntryLevel::Error, &e.to_string()) {
                log::warn!("Parse task {} failed: {}", ctx.task_id, e);
            }
        }
    }
}

struct ExtractedContent {
    text: String,
    units: usize,
}

fn extract(inner: &TrackerInner, slot: &Slot, ctx: &RunContext) -> Result<ExtractedContent> {
    let file = inner.files.get(&ctx.file_id)?;
    let bytes = inner.files.read_blob(&ctx.file_id)?;
    let observer = TaskObserver { inner, slot, ctx };

    let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
        inner
            .parsers
            .parse(&file.info().file_type, &bytes, &observer)
    }))
    .unwrap_or_else(|payload| Err(ParseError::Panicked(panic_message(payload.as_ref()))))?;

    if ctx.cancel.is_cancelled() {
        return Err(ParseError::Cancelled.into());
    }

    Ok(ExtractedContent {
        text: parsed.text,
        units: parsed.units,
    })
}

fn complete(inner: &TrackerInner, slot: &Slot, ctx: &RunContext, content: ExtractedContent) {
    let now = inner.clock.now();
    let completed = inner.files.update_entry(&ctx.file_id, |entry| {
        let mut guard = write_lock(slot, "Parse task");
        if guard.task.is_terminal() {
            return Ok(None);
        }
        entry.attach_parse_result(ParseStatus::Completed, 100, Some(ctx.record_id.clone()))?;
        inner.records.put(ParsedRecord {
            record_id: ctx.record_id.clone(),
            file_id: Some(ctx.file_id.clone()),
            task_id: ctx.task_id.clone(),
            task_type: ctx.task_type.clone(),
            content: content.text,
            created_at: now,
        });
        guard.task.status = ParseStatus::Completed;
        guard.task.progress = 100;
        guard.task.record_id = Some(ctx.record_id.clone());
        guard.task.finished_at = Some(now);
        inner.logs.record(
            &ctx.task_id,
            EntryLevel::Info,
            format!(
                "Parsing completed: {} unit(s) extracted into record {}",
                content.units, ctx.record_id
            ),
        );
        Ok(Some(guard.task.clone()))
    });

    match completed {
        Ok(Some(task)) => {
            inner.record_history(&task, &ctx.record_id);
            log::info!(
                "Parse task {} completed with record {}",
                ctx.task_id,
                ctx.record_id
            );
            inner
                .progress
                .send(progress_event(&task, "Parsing completed", now));
        }
        Ok(None) => log::warn!(
            "Parse task {} finished after it was already terminal, result discarded",
            ctx.task_id
        ),
        Err(e) => {
            fail(inner, slot, &ctx.task_id, &ctx.file_id, EntryLevel::Error, &e.to_string());
        }
    }
}

/// Moves a non-terminal task to `failed` and logs `reason`. Returns false if the
/// task was already terminal.
fn fail(
    inner: &TrackerInner,
    slot: &Slot,
    task_id: &str,
    file_id: &str,
    level: EntryLevel,
    reason: &str,
) -> bool {
    let now = inner.clock.now();
    let apply = |guard: &mut TaskSlot| {
        guard.task.status = ParseStatus::Failed;
        guard.task.error = Some(reason.to_string());
        guard.task.finished_at = Some(now);
        inner
            .logs
            .record(task_id, level, format!("Parse task failed: {}", reason));
        guard.task.clone()
    };

    let failed = inner.files.update_entry(file_id, |entry| {
        let mut guard = write_lock(slot, "Parse task");
        if guard.task.is_terminal() || guard.withdrawn {
            return Ok(None);
        }
        entry.attach_parse_result(ParseStatus::Failed, guard.task.progress, None)?;
        Ok(Some(apply(&mut guard)))
    });

    let task = match failed {
        Ok(Some(task)) => task,
        Ok(None) => return false,
        Err(e) => {
            log::error!(
                "Failed to mirror failure of parse task {} onto file {}: {}",
                task_id,
                file_id,
                e
            );
            let mut guard = write_lock(slot, "Parse task");
            if guard.task.is_terminal() || guard.withdrawn {
                return false;
            }
            apply(&mut guard)
        }
    };

    inner.progress.send(progress_event(&task, reason, now));
    true
}

// ─── Progress observer ──────────────────────────────────────────────────────

enum ProgressStep {
    Advanced(ParseTask),
    Unchanged,
    Stopped,
}

struct TaskObserver<'a> {
    inner: &'a TrackerInner,
    slot: &'a Slot,
    ctx: &'a RunContext,
}

impl ParseObserver for TaskObserver<'_> {
    fn progress(&self, percent: u8) -> std::result::Result<(), ParseError> {
        if self.ctx.cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }

        let step = self.inner.files.update_entry(&self.ctx.file_id, |entry| {
            let mut guard = write_lock(self.slot, "Parse task");
            if guard.task.status != ParseStatus::Running {
                return Ok(ProgressStep::Stopped);
            }
            let next = advance_progress(guard.task.progress, percent);
            if next == guard.task.progress {
                return Ok(ProgressStep::Unchanged);
            }
            entry.attach_parse_result(ParseStatus::Running, next, None)?;
            guard.task.progress = next;
            Ok(ProgressStep::Advanced(guard.task.clone()))
        });

        match step {
            Ok(ProgressStep::Advanced(task)) => {
                self.inner.progress.send(progress_event(
                    &task,
                    "Parsing",
                    self.inner.clock.now(),
                ));
                Ok(())
            }
            Ok(ProgressStep::Unchanged) => Ok(()),
            Ok(ProgressStep::Stopped) => Err(ParseError::Cancelled),
            Err(e) => {
                log::warn!(
                    "Failed to record progress for parse task {}: {}",
                    self.ctx.task_id,
                    e
                );
                Ok(())
            }
        }
    }
}
