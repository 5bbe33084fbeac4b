pub mod broadcast;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod files;
pub mod logging;
pub mod logs;
pub mod parse;
pub mod parser;
pub mod records;
pub mod storage;
pub mod supervisor;
pub mod task;
pub mod worker;

mod sync;

pub use broadcast::{LogBroadcaster, TaskKind, TaskProgressBroadcaster, TaskProgressEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{ApiResponse, ResponseStatus};
pub use config::{load_config, load_config_from_str, DedupParams, EngineConfig};
pub use dedup::{DedupManager, DedupStatus, DeduplicationTask, NewDedupTask};
pub use engine::{Engine, EngineBuilder};
pub use error::{ConfigError, DatakitError, DedupError, ErrorKind, ParseError, Result, StorageError};
pub use files::{FileFilter, FileMetadata, FileRegistry, UnifiedFile};
pub use logging::init_logging;
pub use logs::{EntryLevel, ExportFormat, LogEntry, LogStore};
pub use parse::{ParseSubmission, ParseTask, ParseTaskTracker};
pub use parser::{DocumentFormat, ParserRegistry};
pub use records::{DatasetRef, ParsedRecord, RecordStore};
pub use storage::BlobStore;
pub use supervisor::{SweepReport, TimeoutSupervisor};
pub use task::TaskProgress;
pub use worker::WorkerPool;
