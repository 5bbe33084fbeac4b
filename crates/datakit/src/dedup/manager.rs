//! Deduplication task manager.
//!
//! Tasks move `pending → running → {completed | failed}`. At most
//! `max_concurrent` tasks run at once; the rest wait in creation order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::algorithm::{items_from_record, DedupObserver, DedupOutcome, Deduplicator, QaItem};
use super::task::{
    normalize_tags, DedupSlot, DedupStatus, DedupSummary, DedupTaskDetail, DeduplicationTask,
    NewDedupTask, TagFilter, DEDUP_TASK_TYPE,
};
use crate::broadcast::{TaskKind, TaskProgressBroadcaster, TaskProgressEvent};
use crate::clock::Clock;
use crate::config::{DedupConfig, DedupParams};
use crate::error::{DatakitError, DedupError, Result};
use crate::files::{FileRegistry, ParseStatus};
use crate::logs::{EntryLevel, LogStore};
use crate::records::{content_record_id, DatasetRef, ParsedRecord, RecordStore};
use crate::sync::{read_lock, write_lock};
use crate::task::{advance_progress, panic_message, scale_progress, CancelFlag, TaskProgress};
use crate::worker::{Work, WorkerPool};

type Slot = Arc<RwLock<DedupSlot>>;

/// Progress band reserved for loading inputs; deduplication reports into the rest.
const LOAD_DONE: u8 = 10;
const DEDUP_DONE: u8 = 90;

fn progress_event(task: &DeduplicationTask, message: &str, at: DateTime<Utc>) -> TaskProgressEvent {
    let mut event = TaskProgressEvent::new(
        &task.task_id,
        TaskKind::Deduplication,
        DEDUP_TASK_TYPE,
        task.status.as_str(),
        task.progress,
        message,
    )
    .at(at);
    if let Some(output) = &task.output {
        event = event.with_record(&output.record_id);
    }
    if let Some(error) = &task.error {
        event = event.with_error(error);
    }
    event
}

#[derive(Default)]
struct Scheduler {
    pending: VecDeque<String>,
    running: HashSet<String>,
}

// ─── Manager ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DedupManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    files: Arc<FileRegistry>,
    records: Arc<RecordStore>,
    logs: Arc<LogStore>,
    deduplicator: Arc<dyn Deduplicator>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn Clock>,
    progress: TaskProgressBroadcaster,
    defaults: DedupParams,
    max_concurrent: usize,
    tasks: RwLock<HashMap<String, Slot>>,
    next_seq: AtomicU64,
    scheduler: RwLock<Scheduler>,
}

impl DedupManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &DedupConfig,
        files: Arc<FileRegistry>,
        records: Arc<RecordStore>,
        logs: Arc<LogStore>,
        deduplicator: Arc<dyn Deduplicator>,
        pool: Arc<WorkerPool>,
        clock: Arc<dyn Clock>,
        progress: TaskProgressBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                files,
                records,
                logs,
                deduplicator,
                pool,
                clock,
                progress,
                defaults: config.defaults.clone(),
                max_concurrent: config.max_concurrent.max(1),
                tasks: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                scheduler: RwLock::new(Scheduler::default()),
            }),
        }
    }

    /// Validates the request and enqueues a `pending` task.
    ///
    /// Every input must be a parsed file or an existing record; otherwise
    /// nothing is created.
    pub fn create(&self, request: NewDedupTask) -> Result<DeduplicationTask> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DatakitError::Validation(
                "deduplication task name is required".to_string(),
            ));
        }
        if request.inputs.is_empty() {
            return Err(DatakitError::Validation(
                "at least one input is required".to_string(),
            ));
        }
        let params = request.params.unwrap_or_else(|| self.inner.defaults.clone());
        params.validate().map_err(DatakitError::Validation)?;

        let mut inputs: Vec<DatasetRef> = Vec::with_capacity(request.inputs.len());
        for raw in &request.inputs {
            let input = self.inner.resolve_input(raw.trim())?;
            if !inputs.contains(&input) {
                inputs.push(input);
            }
        }

        let task = self
            .inner
            .enqueue(name.to_string(), inputs, normalize_tags(&request.tags), params, None);
        pump(&self.inner);
        Ok(task)
    }

    /// Tasks matching `tags`, newest first.
    pub fn list(&self, tags: Option<&str>) -> Vec<DeduplicationTask> {
        let filter = tags.map(TagFilter::parse).unwrap_or_default();
        let mut tasks: Vec<(u64, DeduplicationTask)> = self
            .inner
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let guard = read_lock(&slot, "Dedup task");
                if filter.matches(&guard.task.tags) {
                    Some((guard.seq, guard.task.clone()))
                } else {
                    None
                }
            })
            .collect();
        tasks.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq))
        });
        tasks.into_iter().map(|(_, task)| task).collect()
    }

    pub fn get(&self, task_id: &str) -> Result<DedupTaskDetail> {
        let task = self.task(task_id)?;
        let logs = self.inner.logs.summary(task_id);
        Ok(DedupTaskDetail { task, logs })
    }

    pub fn task(&self, task_id: &str) -> Result<DeduplicationTask> {
        let slot = self.inner.slot(task_id)?;
        let task = read_lock(&slot, "Dedup task").task.clone();
        Ok(task)
    }

    pub fn get_progress(&self, task_id: &str) -> Result<TaskProgress> {
        Ok(self.task(task_id)?.progress_snapshot())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.inner.slot(task_id).is_ok()
    }

    /// Pending tasks are removed without a trace; running tasks end as `failed`
    /// with a "cancelled" log entry. Terminal tasks cannot be cancelled.
    pub fn cancel(&self, task_id: &str) -> Result<DeduplicationTask> {
        let inner = &self.inner;
        let slot = inner.slot(task_id)?;

        let status = {
            let guard = read_lock(&slot, "Dedup task");
            guard.cancel.cancel();
            guard.task.status
        };

        match status {
            DedupStatus::Pending => {
                let task = read_lock(&slot, "Dedup task").task.clone();
                write_lock(&inner.scheduler, "Dedup scheduler")
                    .pending
                    .retain(|id| id != task_id);
                write_lock(&inner.tasks, "Dedup tasks").remove(task_id);
                log::info!("Withdrew pending deduplication task {}", task_id);
                Ok(task)
            }
            DedupStatus::Running => {
                fail(inner, &slot, EntryLevel::Warning, "cancelled");
                log::info!("Cancelled running deduplication task {}", task_id);
                self.task(task_id)
            }
            status => Err(DatakitError::Conflict(format!(
                "deduplication task {} is already {}",
                task_id,
                status.as_str()
            ))),
        }
    }

    /// Creates a new pending task with the same name, inputs, tags and params
    /// as a failed one.
    pub fn retry(&self, task_id: &str) -> Result<DeduplicationTask> {
        let original = self.task(task_id)?;
        if original.status != DedupStatus::Failed {
            return Err(DatakitError::Conflict(format!(
                "only failed tasks can be retried, {} is {}",
                task_id,
                original.status.as_str()
            )));
        }
        for input in &original.input {
            if !self.inner.records.contains(&input.record_id) {
                return Err(DatakitError::Validation(format!(
                    "input record {} no longer exists",
                    input.record_id
                )));
            }
        }

        let task = self.inner.enqueue(
            original.name,
            original.input,
            original.tags,
            original.params,
            Some(task_id.to_string()),
        );
        log::info!("Task {} retries {}", task.task_id, task_id);
        pump(&self.inner);
        Ok(task)
    }

    /// Fails running tasks whose start is older than `timeout` and frees their
    /// concurrency slots. Returns their ids.
    pub fn sweep_timeouts(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let inner = &self.inner;
        let mut failed = Vec::new();
        for slot in inner.slots() {
            let overdue = {
                let guard = read_lock(&slot, "Dedup task");
                let overdue = guard.task.status == DedupStatus::Running
                    && guard
                        .task
                        .started_at
                        .is_some_and(|started| now - started > timeout);
                overdue.then(|| guard.task.task_id.clone())
            };

            if let Some(task_id) = overdue {
                let reason = format!("timed out after {}s", timeout.num_seconds());
                if fail(inner, &slot, EntryLevel::Error, &reason) {
                    log::warn!("Deduplication task {} {}", task_id, reason);
                    write_lock(&inner.scheduler, "Dedup scheduler")
                        .running
                        .remove(&task_id);
                    failed.push(task_id);
                }
            }
        }
        if !failed.is_empty() {
            pump(inner);
        }
        failed
    }

    pub fn len(&self) -> usize {
        read_lock(&self.inner.tasks, "Dedup tasks").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks currently holding a concurrency slot.
    pub fn running_count(&self) -> usize {
        read_lock(&self.inner.scheduler, "Dedup scheduler").running.len()
    }

    pub fn pending_count(&self) -> usize {
        read_lock(&self.inner.scheduler, "Dedup scheduler").pending.len()
    }
}

impl ManagerInner {
    fn slot(&self, task_id: &str) -> Result<Slot> {
        read_lock(&self.tasks, "Dedup tasks")
            .get(task_id)
            .cloned()
            .ok_or_else(|| DatakitError::not_found("deduplication task", task_id))
    }

    fn slots(&self) -> Vec<Slot> {
        read_lock(&self.tasks, "Dedup tasks")
            .values()
            .cloned()
            .collect()
    }

    /// A parsed file by `file_id`, else an existing record by `record_id`.
    fn resolve_input(&self, id: &str) -> Result<DatasetRef> {
        if let Ok(file) = self.files.get(id) {
            let info = file.info();
            return match (&info.record_id, info.parse_status) {
                (Some(record_id), Some(ParseStatus::Completed)) => Ok(DatasetRef {
                    file_id: Some(info.file_id.clone()),
                    record_id: record_id.clone(),
                }),
                _ => Err(DatakitError::Validation(format!(
                    "file {} has not been parsed",
                    id
                ))),
            };
        }
        if self.records.contains(id) {
            return Ok(DatasetRef {
                file_id: None,
                record_id: id.to_string(),
            });
        }
        Err(DatakitError::Validation(format!(
            "input {} is neither a parsed file nor a known record",
            id
        )))
    }

    fn enqueue(
        &self,
        name: String,
        input: Vec<DatasetRef>,
        tags: std::collections::BTreeSet<String>,
        params: DedupParams,
        retry_of: Option<String>,
    ) -> DeduplicationTask {
        let now = self.clock.now();
        let task = DeduplicationTask {
            task_id: Uuid::new_v4().to_string(),
            name,
            status: DedupStatus::Pending,
            progress: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            input,
            output: None,
            tags,
            params,
            summary: None,
            duplicates: Vec::new(),
            error: None,
            retry_of,
        };

        let slot = Arc::new(RwLock::new(DedupSlot {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            task: task.clone(),
            cancel: CancelFlag::new(),
        }));
        write_lock(&self.tasks, "Dedup tasks").insert(task.task_id.clone(), slot);
        write_lock(&self.scheduler, "Dedup scheduler")
            .pending
            .push_back(task.task_id.clone());

        log::info!(
            "Created deduplication task {} '{}' with {} input(s)",
            task.task_id,
            task.name,
            task.input.len()
        );
        self.progress
            .send(progress_event(&task, "Deduplication task pending", now));
        task
    }
}

// ─── Scheduling ─────────────────────────────────────────────────────────────

/// Starts pending tasks, oldest first, while concurrency slots are free.
fn pump(inner: &Arc<ManagerInner>) {
    loop {
        let next = {
            let mut scheduler = write_lock(&inner.scheduler, "Dedup scheduler");
            if scheduler.running.len() >= inner.max_concurrent {
                return;
            }
            let Some(task_id) = scheduler.pending.pop_front() else {
                return;
            };
            scheduler.running.insert(task_id.clone());
            task_id
        };

        let worker_inner = Arc::clone(inner);
        let worker_task_id = next.clone();
        let work = Work::new(format!("dedup {}", next), move || {
            execute(&worker_inner, &worker_task_id)
        });
        if let Err(e) = inner.pool.submit(work) {
            log::error!("Failed to schedule deduplication task {}: {}", next, e);
            write_lock(&inner.scheduler, "Dedup scheduler")
                .running
                .remove(&next);
            if let Ok(slot) = inner.slot(&next) {
                fail_pending(inner, &slot, &e.to_string());
            }
        }
    }
}

fn execute(inner: &Arc<ManagerInner>, task_id: &str) {
    run(inner, task_id);
    write_lock(&inner.scheduler, "Dedup scheduler")
        .running
        .remove(task_id);
    pump(inner);
}

// ─── Execution ──────────────────────────────────────────────────────────────

fn run(inner: &ManagerInner, task_id: &str) {
    let Ok(slot) = inner.slot(task_id) else {
        log::debug!("Deduplication task {} was withdrawn before it started", task_id);
        return;
    };

    let now = inner.clock.now();
    let started = {
        let mut guard = write_lock(&slot, "Dedup task");
        if guard.task.status != DedupStatus::Pending || guard.cancel.is_cancelled() {
            return;
        }
        guard.task.status = DedupStatus::Running;
        guard.task.started_at = Some(now);
        inner
            .logs
            .record(task_id, EntryLevel::Info, "Deduplication started");
        guard.task.clone()
    };
    inner
        .progress
        .send(progress_event(&started, "Deduplication started", now));

    let _span = tracing::info_span!("dedup_task", task_id = %task_id, name = %started.name)
        .entered();

    match deduplicate(inner, &slot, &started) {
        Ok((outcome, original_count)) => complete(inner, &slot, outcome, original_count),
        Err(DatakitError::Dedup(DedupError::Cancelled)) => {
            fail(inner, &slot, EntryLevel::Warning, "cancelled");
        }
        Err(e) => {
            if fail(inner, &slot, EntryLevel::Error, &e.to_string()) {
                log::warn!("Deduplication task {} failed: {}", task_id, e);
            }
        }
    }
}

fn load_items(inner: &ManagerInner, slot: &Slot, task: &DeduplicationTask) -> Result<Vec<QaItem>> {
    let observer = TaskObserver { inner, slot };
    let total = task.input.len();
    let mut items = Vec::new();

    for (index, input) in task.input.iter().enumerate() {
        let record = inner
            .records
            .get(&input.record_id)
            .ok_or_else(|| DedupError::MissingRecord(input.record_id.clone()))?;
        let loaded = items_from_record(&record)?;
        inner.logs.record(
            &task.task_id,
            EntryLevel::Debug,
            format!("Loaded {} item(s) from record {}", loaded.len(), record.record_id),
        );
        items.extend(loaded);
        observer.advance(scale_progress(0, LOAD_DONE, ((index + 1) * 100 / total) as u8))?;
    }
    Ok(items)
}

fn deduplicate(
    inner: &ManagerInner,
    slot: &Slot,
    task: &DeduplicationTask,
) -> Result<(DedupOutcome, usize)> {
    let items = load_items(inner, slot, task)?;
    let original_count = items.len();
    inner.logs.record(
        &task.task_id,
        EntryLevel::Info,
        format!(
            "Loaded {} item(s) from {} input(s); threshold={}, dedup_by_answer={}",
            original_count,
            task.input.len(),
            task.params.threshold,
            task.params.dedup_by_answer
        ),
    );

    let observer = TaskObserver { inner, slot };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        inner
            .deduplicator
            .deduplicate(items, &task.params, &observer)
    }))
    .unwrap_or_else(|payload| Err(DedupError::Panicked(panic_message(payload.as_ref()))))?;

    if read_lock(slot, "Dedup task").cancel.is_cancelled() {
        return Err(DedupError::Cancelled.into());
    }
    if outcome.kept.is_empty() {
        return Err(DedupError::NothingKept.into());
    }
    Ok((outcome, original_count))
}

fn complete(inner: &ManagerInner, slot: &Slot, outcome: DedupOutcome, original_count: usize) {
    let now = inner.clock.now();
    let content = match serde_json::to_string_pretty(&outcome.kept) {
        Ok(content) => content,
        Err(e) => {
            fail(
                inner,
                slot,
                EntryLevel::Error,
                &format!("failed to serialize output: {}", e),
            );
            return;
        }
    };
    let record_id = content_record_id(DEDUP_TASK_TYPE, content.as_bytes());
    let summary = DedupSummary {
        original_count,
        kept_count: outcome.kept.len(),
        deleted_count: outcome.removed_count(),
    };

    let completed = {
        let mut guard = write_lock(slot, "Dedup task");
        if guard.task.is_terminal() {
            None
        } else {
            inner.records.put(ParsedRecord {
                record_id: record_id.clone(),
                file_id: None,
                task_id: guard.task.task_id.clone(),
                task_type: DEDUP_TASK_TYPE.to_string(),
                content,
                created_at: now,
            });
            guard.task.status = DedupStatus::Completed;
            guard.task.progress = 100;
            guard.task.finished_at = Some(now);
            guard.task.summary = Some(summary);
            guard.task.duplicates = outcome.groups;
            guard.task.output = Some(DatasetRef {
                file_id: None,
                record_id: record_id.clone(),
            });
            inner.logs.record(
                &guard.task.task_id,
                EntryLevel::Info,
                format!(
                    "Deduplication completed: kept {} of {} item(s), removed {} in {} group(s); output record {}",
                    summary.kept_count,
                    summary.original_count,
                    summary.deleted_count,
                    guard.task.duplicates.len(),
                    record_id
                ),
            );
            Some(guard.task.clone())
        }
    };

    match completed {
        Some(task) => {
            log::info!(
                "Deduplication task {} completed: kept {} of {}",
                task.task_id,
                summary.kept_count,
                summary.original_count
            );
            inner
                .progress
                .send(progress_event(&task, "Deduplication completed", now));
        }
        None => log::warn!("Deduplication finished after its task was already terminal, result discarded"),
    }
}

/// Moves a running task to `failed` and logs `reason`. Returns false if the
/// task was not running.
fn fail(inner: &ManagerInner, slot: &Slot, level: EntryLevel, reason: &str) -> bool {
    let now = inner.clock.now();
    let failed = {
        let mut guard = write_lock(slot, "Dedup task");
        if guard.task.status != DedupStatus::Running {
            return false;
        }
        guard.cancel.cancel();
        guard.task.status = DedupStatus::Failed;
        guard.task.error = Some(reason.to_string());
        guard.task.finished_at = Some(now);
        inner.logs.record(
            &guard.task.task_id,
            level,
            format!("Deduplication failed: {}", reason),
        );
        guard.task.clone()
    };
    inner.progress.send(progress_event(&failed, reason, now));
    true
}

/// Fails a task that never got a worker.
fn fail_pending(inner: &ManagerInner, slot: &Slot, reason: &str) {
    let now = inner.clock.now();
    let failed = {
        let mut guard = write_lock(slot, "Dedup task");
        if guard.task.status != DedupStatus::Pending {
            return;
        }
        guard.task.status = DedupStatus::Failed;
        guard.task.error = Some(reason.to_string());
        guard.task.finished_at = Some(now);
        inner.logs.record(
            &guard.task.task_id,
            EntryLevel::Error,
            format!("Deduplication could not be scheduled: {}", reason),
        );
        guard.task.clone()
    };
    inner.progress.send(progress_event(&failed, reason, now));
}

// ─── Progress observer ──────────────────────────────────────────────────────

struct TaskObserver<'a> {
    inner: &'a ManagerInner,
    slot: &'a Slot,
}

impl TaskObserver<'_> {
    /// Raises overall progress to `overall`. Fails once the task stops running.
    fn advance(&self, overall: u8) -> std::result::Result<(), DedupError> {
        let advanced = {
            let mut guard = write_lock(self.slot, "Dedup task");
            if guard.cancel.is_cancelled() || guard.task.status != DedupStatus::Running {
                return Err(DedupError::Cancelled);
            }
            let next = advance_progress(guard.task.progress, overall);
            if next == guard.task.progress {
                return Ok(());
            }
            guard.task.progress = next;
            guard.task.clone()
        };
        self.inner.progress.send(progress_event(
            &advanced,
            "Deduplicating",
            self.inner.clock.now(),
        ));
        Ok(())
    }
}

impl DedupObserver for TaskObserver<'_> {
    fn progress(&self, percent: u8) -> std::result::Result<(), DedupError> {
        self.advance(scale_progress(LOAD_DONE, DEDUP_DONE, percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::LogsConfig;
    use crate::dedup::JaccardDeduplicator;
    use crate::error::ErrorKind;
    use crate::storage::MemoryBlobStore;
    use std::time::{Duration as StdDuration, Instant};

    struct Fixture {
        manager: DedupManager,
        records: Arc<RecordStore>,
        logs: Arc<LogStore>,
        pool: Arc<WorkerPool>,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.pool.shutdown();
        }
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let files = Arc::new(FileRegistry::new(
            Arc::new(MemoryBlobStore::new()),
            Arc::clone(&clock),
            1024,
        ));
        let records = Arc::new(RecordStore::new());
        let logs = Arc::new(LogStore::new(&LogsConfig::default(), Arc::clone(&clock)));
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        let manager = DedupManager::new(
            &DedupConfig::default(),
            files,
            Arc::clone(&records),
            Arc::clone(&logs),
            Arc::new(JaccardDeduplicator::new()),
            Arc::clone(&pool),
            clock,
            TaskProgressBroadcaster::default(),
        );
        Fixture {
            manager,
            records,
            logs,
            pool,
        }
    }

    fn put_record(records: &RecordStore, record_id: &str, content: &str) {
        records.put(ParsedRecord {
            record_id: record_id.to_string(),
            file_id: None,
            task_id: "parse-task".to_string(),
            task_type: "parse".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
    }

    fn wait_terminal(manager: &DedupManager, task_id: &str) -> DeduplicationTask {
        let deadline = Instant::now() + StdDuration::from_secs(5);
        loop {
            let task = manager.task(task_id).unwrap();
            if task.is_terminal() || Instant::now() > deadline {
                return task;
            }
            std::thread::sleep(StdDuration::from_millis(5));
        }
    }

    #[test]
    fn test_create_and_complete() {
        let f = fixture();
        put_record(&f.records, "r1", "alpha beta\nalpha beta\ngamma delta\n");

        let task = f
            .manager
            .create(NewDedupTask::new("nightly", vec!["r1".to_string()]).with_tags(["qa"]))
            .unwrap();
        assert_eq!(task.status, DedupStatus::Pending);
        assert!(task.output.is_none());
        assert!(task.duplicates.is_empty());

        let done = wait_terminal(&f.manager, &task.task_id);
        assert_eq!(done.status, DedupStatus::Completed);
        assert_eq!(done.progress, 100);
        let summary = done.summary.unwrap();
        assert_eq!(summary.original_count, 3);
        assert_eq!(summary.kept_count, 2);
        assert_eq!(summary.deleted_count, 1);
        assert_eq!(done.duplicates.len(), 1);
        assert_eq!(done.duplicates[0].kept_id, "r1:1");
        assert_eq!(done.duplicates[0].removed.len(), 1);
        assert_eq!(done.duplicates[0].removed[0].question, "alpha beta");

        let output = done.output.unwrap();
        let record = f.records.get(&output.record_id).unwrap();
        assert_eq!(record.task_type, DEDUP_TASK_TYPE);
        let kept: Vec<QaItem> = serde_json::from_str(&record.content).unwrap();
        assert_eq!(kept.len(), 2);

        let detail = f.manager.get(&task.task_id).unwrap();
        assert!(detail.logs.total >= 2);
        assert_eq!(detail.logs.count(EntryLevel::Error), 0);
    }

    #[test]
    fn test_create_validation() {
        let f = fixture();
        put_record(&f.records, "r1", "x\n");

        let err = f
            .manager
            .create(NewDedupTask::new("  ", vec!["r1".to_string()]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = f.manager.create(NewDedupTask::new("n", vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = f
            .manager
            .create(NewDedupTask::new("n", vec!["r1".to_string(), "ghost".to_string()]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let bad_params = DedupParams {
            threshold: 1.5,
            ..DedupParams::default()
        };
        let err = f
            .manager
            .create(NewDedupTask::new("n", vec!["r1".to_string()]).with_params(bad_params))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        assert!(f.manager.is_empty());
    }

    #[test]
    fn test_empty_dataset_fails() {
        let f = fixture();
        put_record(&f.records, "blank", "\n\n");

        let task = f
            .manager
            .create(NewDedupTask::new("empty", vec!["blank".to_string()]))
            .unwrap();
        let done = wait_terminal(&f.manager, &task.task_id);
        assert_eq!(done.status, DedupStatus::Failed);
        assert!(done.output.is_none());
        assert!(done.summary.is_none());
        assert!(f
            .logs
            .entries(&task.task_id)
            .iter()
            .any(|e| e.level == EntryLevel::Error));
    }

    #[test]
    fn test_terminal_task_cannot_be_cancelled_and_only_failed_retries() {
        let f = fixture();
        put_record(&f.records, "r1", "one\ntwo\n");
        put_record(&f.records, "bad", "[{\"answer\": \"missing question\"}]");

        let ok = f
            .manager
            .create(NewDedupTask::new("ok", vec!["r1".to_string()]))
            .unwrap();
        wait_terminal(&f.manager, &ok.task_id);
        assert_eq!(
            f.manager.cancel(&ok.task_id).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            f.manager.retry(&ok.task_id).unwrap_err().kind(),
            ErrorKind::Conflict
        );

        let bad = f
            .manager
            .create(NewDedupTask::new("bad", vec!["bad".to_string()]).with_tags(["x"]))
            .unwrap();
        let failed = wait_terminal(&f.manager, &bad.task_id);
        assert_eq!(failed.status, DedupStatus::Failed);

        let retried = f.manager.retry(&bad.task_id).unwrap();
        assert_ne!(retried.task_id, bad.task_id);
        assert_eq!(retried.retry_of.as_deref(), Some(bad.task_id.as_str()));
        assert_eq!(retried.name, "bad");
        assert_eq!(retried.input, failed.input);
        assert_eq!(retried.tags, failed.tags);
        assert_eq!(
            f.manager.task(&bad.task_id).unwrap().status,
            DedupStatus::Failed
        );
    }

    #[test]
    fn test_list_filters_by_tag_newest_first() {
        let f = fixture();
        put_record(&f.records, "r1", "a\n");

        let first = f
            .manager
            .create(NewDedupTask::new("first", vec!["r1".to_string()]).with_tags(["finance"]))
            .unwrap();
        let second = f
            .manager
            .create(NewDedupTask::new("second", vec!["r1".to_string()]).with_tags(["legal"]))
            .unwrap();

        let all: Vec<String> = f
            .manager
            .list(None)
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(all, vec![second.task_id.clone(), first.task_id.clone()]);

        let finance = f.manager.list(Some("fin"));
        assert_eq!(finance.len(), 1);
        assert_eq!(finance[0].task_id, first.task_id);
        assert!(f.manager.list(Some("fin,legal")).is_empty());
        assert_eq!(f.manager.list(Some("")).len(), 2);
    }

    #[test]
    fn test_progress_query() {
        let f = fixture();
        assert_eq!(
            f.manager.get_progress("missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        put_record(&f.records, "r1", "a\n");
        let task = f
            .manager
            .create(NewDedupTask::new("p", vec!["r1".to_string()]))
            .unwrap();
        wait_terminal(&f.manager, &task.task_id);
        let progress = f.manager.get_progress(&task.task_id).unwrap();
        assert_eq!(progress.progress, 100);
        assert_eq!(progress.status, "completed");
        assert_eq!(progress.task_type, "deduplication");
    }
}
