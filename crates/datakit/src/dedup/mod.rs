//! Deduplication tasks over parsed records.

pub mod algorithm;
pub mod manager;
pub mod task;

pub use algorithm::{
    DedupObserver, DedupOutcome, Deduplicator, DuplicateGroup, JaccardDeduplicator, QaItem,
};
pub use manager::DedupManager;
pub use task::{
    DedupStatus, DedupSummary, DedupTaskDetail, DeduplicationTask, NewDedupTask, TagFilter,
    DEDUP_TASK_TYPE,
};
