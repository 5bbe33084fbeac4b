//! Deduplication task commands.

use super::ApiResponse;
use crate::dedup::{DedupTaskDetail, DeduplicationTask, NewDedupTask};
use crate::engine::Engine;
use crate::task::TaskProgress;

pub fn create_dedup_task(engine: &Engine, request: NewDedupTask) -> ApiResponse<DeduplicationTask> {
    ApiResponse::from_result(engine.dedup().create(request), "Deduplication task created")
}

/// Tasks whose tags match every comma-separated term, newest first.
pub fn list_dedup_tasks(engine: &Engine, tags: Option<&str>) -> ApiResponse<Vec<DeduplicationTask>> {
    let tasks = engine.dedup().list(tags);
    let message = format!("{} task(s)", tasks.len());
    ApiResponse::ok(tasks, message)
}

pub fn get_dedup_task(engine: &Engine, task_id: &str) -> ApiResponse<DedupTaskDetail> {
    ApiResponse::from_result(engine.dedup().get(task_id), "Deduplication task found")
}

pub fn get_dedup_progress(engine: &Engine, task_id: &str) -> ApiResponse<TaskProgress> {
    ApiResponse::from_result(engine.dedup().get_progress(task_id), "Task progress")
}

pub fn cancel_dedup_task(engine: &Engine, task_id: &str) -> ApiResponse<DeduplicationTask> {
    ApiResponse::from_result(engine.dedup().cancel(task_id), "Deduplication task cancelled")
}

pub fn retry_dedup_task(engine: &Engine, task_id: &str) -> ApiResponse<DeduplicationTask> {
    ApiResponse::from_result(engine.dedup().retry(task_id), "Deduplication task retried")
}
