use std::path::Path;

use serde_json::Value;

use crate::config::schema::EngineConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/engine-config-v1.json");
const SUPPORTED_VERSION: &str = "1.0";

/// Reads, schema-checks and validates a JSON config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded config from {}", path.display());
    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let raw: Value = serde_json::from_str(content)?;
    check_against_schema(&raw)?;

    let config: EngineConfig = serde_json::from_value(raw)?;
    validate_config(&config)?;
    Ok(config)
}

fn check_against_schema(raw: &Value) -> Result<(), ConfigError> {
    let schema: Value = serde_json::from_str(SCHEMA_JSON)
        .map_err(|e| invalid(format!("embedded config schema is not JSON: {}", e)))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| invalid(format!("embedded config schema does not compile: {}", e)))?;

    let errors: Vec<String> = validator
        .iter_errors(raw)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        })
    }
}

/// Semantic checks the schema cannot express, also applied to configs built in code.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(invalid(format!(
            "Unsupported config version: {} (expected {})",
            config.version, SUPPORTED_VERSION
        )));
    }

    require_positive("storage.max_file_size", config.storage.max_file_size)?;
    require_positive("workers.threads", config.workers.threads as u64)?;
    require_positive("tasks.timeout_secs", config.tasks.timeout_secs)?;
    require_positive("dedup.max_concurrent", config.dedup.max_concurrent as u64)?;
    require_positive("logs.max_entries_per_task", config.logs.max_entries_per_task as u64)?;

    config
        .dedup
        .defaults
        .validate()
        .map_err(|message| invalid(format!("dedup.defaults: {}", message)))
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(invalid(format!("{} must be greater than zero", field)))
    } else {
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}
