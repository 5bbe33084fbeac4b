//! Parse commands.

use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::engine::Engine;
use crate::error::DatakitError;
use crate::parse::ParseTask;
use crate::task::TaskProgress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResponse {
    pub record_id: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Number of completed parses that produced the record.
    pub exists: u64,
}

pub fn submit_parse(engine: &Engine, file_id: &str, task_type: &str) -> ApiResponse<ParseResponse> {
    let result = engine
        .parse()
        .submit(file_id, task_type)
        .map(|submission| ParseResponse {
            record_id: submission.record_id,
            task_id: submission.task.task_id,
        });
    ApiResponse::from_result(result, "Parse task queued")
}

/// Progress of a parse or deduplication task.
pub fn get_task_progress(engine: &Engine, task_id: &str) -> ApiResponse<TaskProgress> {
    let result = match engine.parse().get_progress(task_id) {
        Err(DatakitError::NotFound { .. }) => engine.dedup().get_progress(task_id),
        other => other,
    };
    ApiResponse::from_result(result, "Task progress")
}

pub fn get_parse_task(engine: &Engine, task_id: &str) -> ApiResponse<ParseTask> {
    ApiResponse::from_result(engine.parse().get(task_id), "Parse task found")
}

pub fn list_parse_tasks(engine: &Engine, file_id: &str) -> ApiResponse<Vec<ParseTask>> {
    let result = engine
        .files()
        .get(file_id)
        .map(|_| engine.parse().list_for_file(file_id));
    ApiResponse::from_result(result, "Parse tasks")
}

pub fn check_parse_history(engine: &Engine, record_id: &str) -> ApiResponse<HistoryResponse> {
    let result = engine
        .parse()
        .history_exists(record_id)
        .map(|exists| HistoryResponse { exists });
    ApiResponse::from_result(result, "Parse history")
}

pub fn cancel_parse(engine: &Engine, task_id: &str) -> ApiResponse<ParseTask> {
    ApiResponse::from_result(engine.parse().cancel(task_id), "Parse task cancelled")
}
