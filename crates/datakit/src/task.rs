//! Pieces shared by parse and deduplication tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Highest progress a task may report before it completes.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Payload of a progress query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub progress: u8,
    pub status: String,
    pub task_type: String,
}

/// Moves progress forward. Never decreases and never reaches 100 before completion.
pub fn advance_progress(current: u8, requested: u8) -> u8 {
    requested.min(MAX_RUNNING_PROGRESS).max(current)
}

/// Scales `percent` of a sub-step into the `[start, end]` band of overall progress.
pub fn scale_progress(start: u8, end: u8, percent: u8) -> u8 {
    let span = end.saturating_sub(start) as u32;
    start + (span * percent.min(100) as u32 / 100) as u8
}

/// Cooperative cancellation flag checked by workers between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
