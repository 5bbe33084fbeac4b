//! Service container: builds every component once and hands out shared handles.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::broadcast::{LogBroadcaster, TaskProgressBroadcaster, TaskProgressEvent};
use crate::clock::{Clock, SystemClock};
use crate::config::loader::validate_config;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::dedup::{DedupManager, Deduplicator, JaccardDeduplicator};
use crate::error::Result;
use crate::files::FileRegistry;
use crate::logs::{LogEntry, LogStore};
use crate::parse::ParseTaskTracker;
use crate::parser::ParserRegistry;
use crate::records::RecordStore;
use crate::storage::{BlobStore, FilesystemBlobStore, MemoryBlobStore};
use crate::supervisor::TimeoutSupervisor;
use crate::worker::WorkerPool;

/// Builds an [`Engine`], with optional overrides for its collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    blobs: Option<Arc<dyn BlobStore>>,
    parsers: Option<ParserRegistry>,
    deduplicator: Option<Arc<dyn Deduplicator>>,
    database: Option<Database>,
    supervise: bool,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: None,
            blobs: None,
            parsers: None,
            deduplicator: None,
            database: None,
            supervise: true,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = Some(parsers);
        self
    }

    pub fn deduplicator(mut self, deduplicator: Arc<dyn Deduplicator>) -> Self {
        self.deduplicator = Some(deduplicator);
        self
    }

    /// Uses this database instead of opening the configured path.
    pub fn database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Whether to start the background timeout sweep. On by default.
    pub fn supervise(mut self, enabled: bool) -> Self {
        self.supervise = enabled;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        validate_config(&config)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let blobs: Arc<dyn BlobStore> = match (self.blobs, &config.storage.data_directory) {
            (Some(blobs), _) => blobs,
            (None, Some(dir)) => Arc::new(FilesystemBlobStore::new(PathBuf::from(dir).join("blobs"))?),
            (None, None) => Arc::new(MemoryBlobStore::new()),
        };

        let database = match self.database {
            Some(db) => Some(db),
            None => match config.database_path() {
                Some(path) => {
                    log::info!("Opening database at {}", path.display());
                    Some(Database::open(&path)?)
                }
                None => None,
            },
        };

        let progress = TaskProgressBroadcaster::default();
        let log_events = LogBroadcaster::default();

        let logs = Arc::new(
            LogStore::new(&config.logs, Arc::clone(&clock)).with_broadcaster(log_events.clone()),
        );
        if let Some(db) = &database {
            logs.set_database(db.clone());
            logs.load_from_database()?;
        }

        let files = Arc::new(FileRegistry::new(
            blobs,
            Arc::clone(&clock),
            config.storage.max_file_size,
        ));
        let records = Arc::new(RecordStore::new());
        let pool = Arc::new(WorkerPool::new(config.workers.threads)?);

        let parse = ParseTaskTracker::new(
            Arc::clone(&files),
            Arc::clone(&records),
            Arc::clone(&logs),
            Arc::new(self.parsers.unwrap_or_default()),
            Arc::clone(&pool),
            Arc::clone(&clock),
            progress.clone(),
        );
        if let Some(db) = &database {
            parse.set_database(db.clone());
        }

        let dedup = DedupManager::new(
            &config.dedup,
            Arc::clone(&files),
            Arc::clone(&records),
            Arc::clone(&logs),
            self.deduplicator
                .unwrap_or_else(|| Arc::new(JaccardDeduplicator::new())),
            Arc::clone(&pool),
            Arc::clone(&clock),
            progress.clone(),
        );

        let supervisor = TimeoutSupervisor::new(
            parse.clone(),
            dedup.clone(),
            Arc::clone(&clock),
            Duration::from_secs(config.tasks.timeout_secs),
            Duration::from_secs(config.tasks.sweep_interval_secs),
        );
        if self.supervise && config.tasks.sweep_interval_secs > 0 {
            supervisor.start()?;
        }

        log::info!(
            "Engine started with {} worker(s), dedup concurrency {}",
            pool.size(),
            config.dedup.max_concurrent
        );

        Ok(Engine {
            config,
            clock,
            files,
            records,
            logs,
            pool,
            parse,
            dedup,
            supervisor,
            progress,
            log_events,
            database,
        })
    }
}

/// Owns every service. Construct once and share by reference.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    files: Arc<FileRegistry>,
    records: Arc<RecordStore>,
    logs: Arc<LogStore>,
    pool: Arc<WorkerPool>,
    parse: ParseTaskTracker,
    dedup: DedupManager,
    supervisor: TimeoutSupervisor,
    progress: TaskProgressBroadcaster,
    log_events: LogBroadcaster,
    database: Option<Database>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn parse(&self) -> &ParseTaskTracker {
        &self.parse
    }

    pub fn dedup(&self) -> &DedupManager {
        &self.dedup
    }

    pub fn supervisor(&self) -> &TimeoutSupervisor {
        &self.supervisor
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<TaskProgressEvent> {
        self.progress.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log_events.subscribe()
    }

    /// Stops the timeout sweep and the worker pool, waiting for running work.
    pub fn shutdown(&self) {
        self.supervisor.stop();
        self.pool.join();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.supervisor.stop();
        self.pool.shutdown();
    }
}
