//! Append-only per-task log sink shared by parse and deduplication tasks.

pub mod entry;
pub mod export;
pub mod store;

pub use entry::{EntryLevel, LogEntry, LogSummary};
pub use export::{ExportFormat, LogExport};
pub use store::{LogCursor, LogStore};
