//! Test harness for isolated engine instances.
//!
//! Each `TestHarness` owns a temp directory for blobs and the database, a
//! `ManualClock` for driving timeouts, and gates that can hold parse and
//! deduplication work in `running`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use datakit::clock::ManualClock;
use datakit::config::EngineConfig;
use datakit::dedup::{DedupStatus, DeduplicationTask, NewDedupTask};
use datakit::files::{FileMetadata, ParseStatus};
use datakit::parse::ParseTask;
use datakit::parser::ParserRegistry;
use datakit::{Engine, EngineBuilder};

use super::gates::{Gate, GatedDeduplicator, GatedParser};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestHarness {
    temp_dir: TempDir,
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub parse_gate: Gate,
    pub dedup_gate: Gate,
}

impl TestHarness {
    /// Engine with two workers, filesystem blobs, no database and no background sweep.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut EngineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Self::base_config(temp_dir.path(), customize);
        Self::build(temp_dir, config, false)
    }

    /// Engine with persistence at `<temp>/datakit.db`.
    pub fn with_database() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Self::base_config(temp_dir.path(), |config| {
            config.database.enabled = true;
        });
        Self::build(temp_dir, config, false)
    }

    /// Engine with the background timeout sweep running every second.
    pub fn supervised(customize: impl FnOnce(&mut EngineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Self::base_config(temp_dir.path(), |config| {
            config.tasks.sweep_interval_secs = 1;
            customize(config);
        });
        Self::build(temp_dir, config, true)
    }

    fn base_config(base: &Path, customize: impl FnOnce(&mut EngineConfig)) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.storage.data_directory = Some(base.join("data").to_string_lossy().to_string());
        config.database.path = Some(base.join("datakit.db").to_string_lossy().to_string());
        config.workers.threads = 2;
        config.tasks.timeout_secs = 60;
        customize(&mut config);
        config
    }

    fn build(temp_dir: TempDir, config: EngineConfig, supervise: bool) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        let parse_gate = Gate::new(true);
        let dedup_gate = Gate::new(true);
        let engine = Self::builder(config, &clock, &parse_gate, &dedup_gate)
            .supervise(supervise)
            .build()
            .expect("Failed to build engine");

        Self {
            temp_dir,
            engine,
            clock,
            parse_gate,
            dedup_gate,
        }
    }

    fn builder(
        config: EngineConfig,
        clock: &Arc<ManualClock>,
        parse_gate: &Gate,
        dedup_gate: &Gate,
    ) -> EngineBuilder {
        let mut parsers = ParserRegistry::new();
        parsers.register(Box::new(GatedParser::new(parse_gate.clone())));
        Engine::builder(config)
            .clock(clock.clone())
            .parsers(parsers)
            .deduplicator(Arc::new(GatedDeduplicator::new(dedup_gate.clone())))
    }

    /// Shuts the engine down and builds a fresh one over the same directory.
    pub fn restart(&mut self) {
        self.parse_gate.open();
        self.dedup_gate.open();
        self.engine.shutdown();

        let config = self.engine.config().clone();
        let engine = Self::builder(config, &self.clock, &self.parse_gate, &self.dedup_gate)
            .supervise(false)
            .build()
            .expect("Failed to rebuild engine");
        drop(std::mem::replace(&mut self.engine, engine));
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data").join("blobs")
    }

    pub fn upload_text(&self, filename: &str, content: &str) -> String {
        self.engine
            .files()
            .register(content.as_bytes(), FileMetadata::text(filename))
            .expect("Failed to register file")
            .file_id()
            .to_string()
    }

    /// Uploads and fully parses a text file. Returns `(file_id, record_id)`.
    pub fn parsed_file(&self, filename: &str, content: &str) -> (String, String) {
        let file_id = self.upload_text(filename, content);
        let submission = self
            .engine
            .parse()
            .submit(&file_id, "parse")
            .expect("Failed to submit parse");
        let task = self.wait_parse_terminal(&submission.task.task_id);
        assert_eq!(task.status, ParseStatus::Completed, "parse failed: {:?}", task.error);
        (file_id, submission.record_id)
    }

    pub fn create_dedup(&self, name: &str, inputs: &[&str]) -> DeduplicationTask {
        self.engine
            .dedup()
            .create(NewDedupTask::new(
                name,
                inputs.iter().map(|s| s.to_string()).collect(),
            ))
            .expect("Failed to create dedup task")
    }

    /// Polls `condition` until it holds, panicking after a generous timeout.
    pub fn wait_until(&self, what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while !condition() {
            if Instant::now() > deadline {
                panic!("Timed out waiting for {}", what);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn wait_parse_status(&self, task_id: &str, status: ParseStatus) -> ParseTask {
        self.wait_until(&format!("parse task {} to be {:?}", task_id, status), || {
            self.engine
                .parse()
                .get(task_id)
                .map(|t| t.status == status)
                .unwrap_or(false)
        });
        self.engine.parse().get(task_id).expect("task vanished")
    }

    pub fn wait_parse_terminal(&self, task_id: &str) -> ParseTask {
        self.wait_until(&format!("parse task {} to finish", task_id), || {
            self.engine
                .parse()
                .get(task_id)
                .map(|t| t.is_terminal())
                .unwrap_or(false)
        });
        self.engine.parse().get(task_id).expect("task vanished")
    }

    pub fn wait_dedup_status(&self, task_id: &str, status: DedupStatus) -> DeduplicationTask {
        self.wait_until(&format!("dedup task {} to be {:?}", task_id, status), || {
            self.engine
                .dedup()
                .task(task_id)
                .map(|t| t.status == status)
                .unwrap_or(false)
        });
        self.engine.dedup().task(task_id).expect("task vanished")
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        // Let blocked workers finish so the pool can join.
        self.parse_gate.open();
        self.dedup_gate.open();
    }
}
