use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            workers: WorkersConfig::default(),
            tasks: TasksConfig::default(),
            dedup: DedupConfig::default(),
            logs: LogsConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Resolves where the SQLite database lives, if persistence is enabled.
    pub fn database_path(&self) -> Option<std::path::PathBuf> {
        if !self.database.enabled {
            return None;
        }
        match &self.database.path {
            Some(path) => Some(std::path::PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Blob directory. Uploaded bytes stay in memory when unset.
    #[serde(default)]
    pub data_directory: Option<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: None,
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub threads: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            threads: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Running tasks older than this are failed by the supervisor.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Zero disables the background sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub defaults: DedupParams,
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            defaults: DedupParams::default(),
        }
    }
}

/// Tuning knobs handed to the deduplicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupParams {
    /// Compare answers as well as questions.
    #[serde(default)]
    pub dedup_by_answer: bool,
    /// Similarity at or above which two items count as duplicates.
    #[serde(default = "default_threshold", alias = "dedup_threshold")]
    pub threshold: f64,
    /// With `dedup_by_answer`, answers shorter than this fall back to the question.
    #[serde(default = "default_min_answer_length")]
    pub min_answer_length: usize,
}

fn default_threshold() -> f64 {
    0.8
}

fn default_min_answer_length() -> usize {
    15
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            dedup_by_answer: false,
            threshold: default_threshold(),
            min_answer_length: default_min_answer_length(),
        }
    }
}

impl DedupParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!(
                "threshold must be between 0 and 1, got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_max_entries_per_task")]
    pub max_entries_per_task: usize,
    /// Number of trailing entries embedded in a log summary.
    #[serde(default = "default_summary_tail")]
    pub summary_tail: usize,
}

fn default_max_entries_per_task() -> usize {
    10_000
}

fn default_summary_tail() -> usize {
    20
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_entries_per_task: default_max_entries_per_task(),
            summary_tail: default_summary_tail(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.storage.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.dedup.max_concurrent, 2);
        assert_eq!(config.dedup.defaults.threshold, 0.8);
        assert_eq!(config.dedup.defaults.min_answer_length, 15);
        assert!(config.workers.threads >= 1);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_dedup_threshold_alias() {
        let params: DedupParams = serde_json::from_str(r#"{"dedup_threshold": 0.5}"#).unwrap();
        assert_eq!(params.threshold, 0.5);
    }

    #[test]
    fn test_params_reject_out_of_range_threshold() {
        let params = DedupParams {
            threshold: 1.5,
            ..DedupParams::default()
        };
        assert!(params.validate().is_err());
        assert!(DedupParams::default().validate().is_ok());
    }

    #[test]
    fn test_database_path_only_when_enabled() {
        let mut config = EngineConfig::default();
        assert!(config.database_path().is_none());

        config.database.enabled = true;
        config.database.path = Some("/tmp/datakit.db".to_string());
        assert_eq!(
            config.database_path(),
            Some(std::path::PathBuf::from("/tmp/datakit.db"))
        );
    }
}
