//! Task log commands.

use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::engine::Engine;
use crate::error::{DatakitError, Result};
use crate::logs::{ExportFormat, LogEntry, LogExport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    /// Pass back as `since` to continue after the last entry returned.
    pub cursor: u64,
}

/// A task id is known if a live task has it or a log stream exists for it.
/// The latter keeps logs reloaded from the database readable after a restart.
fn ensure_known_task(engine: &Engine, task_id: &str) -> Result<()> {
    if engine.parse().contains(task_id)
        || engine.dedup().contains(task_id)
        || engine.logs().contains(task_id)
    {
        Ok(())
    } else {
        Err(DatakitError::not_found("task", task_id))
    }
}

/// Entries after `since`, at most `limit` of them.
pub fn read_task_logs(
    engine: &Engine,
    task_id: &str,
    since: Option<u64>,
    limit: Option<usize>,
) -> ApiResponse<LogPage> {
    if let Err(e) = ensure_known_task(engine, task_id) {
        return ApiResponse::from_error(&e);
    }

    let mut cursor = engine.logs().read(task_id, since);
    let entries: Vec<LogEntry> = cursor.by_ref().take(limit.unwrap_or(usize::MAX)).collect();
    let page = LogPage {
        cursor: cursor.position(),
        entries,
    };
    let message = format!("{} entries", page.entries.len());
    ApiResponse::ok(page, message)
}

/// Exports the whole log as `text` or `jsonl`.
pub fn export_task_logs(engine: &Engine, task_id: &str, format: &str) -> ApiResponse<LogExport> {
    let result = ExportFormat::from_name(format).and_then(|format| {
        ensure_known_task(engine, task_id)?;
        engine.logs().export(task_id, format)
    });
    ApiResponse::from_result(result, "Log exported")
}
