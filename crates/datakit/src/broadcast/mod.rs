//! Live event channels for dashboards: task progress and task log appends.

pub mod log_events;
pub mod task_progress;

pub use log_events::LogBroadcaster;
pub use task_progress::{TaskKind, TaskProgressBroadcaster, TaskProgressEvent};
