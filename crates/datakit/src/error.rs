use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure category carried on `fail` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Conflict,
    Unavailable,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// Only transient failures are worth retrying with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}

#[derive(Error, Debug)]
pub enum DatakitError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Deduplication error: {0}")]
    Dedup(#[from] DedupError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl DatakitError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DatakitError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DatakitError::Validation(_) | DatakitError::Config(_) => ErrorKind::ValidationError,
            DatakitError::NotFound { .. } => ErrorKind::NotFound,
            DatakitError::Conflict(_) => ErrorKind::Conflict,
            DatakitError::Unavailable(_)
            | DatakitError::Worker(_)
            | DatakitError::Database(_) => ErrorKind::Unavailable,
            DatakitError::Internal(_) => ErrorKind::InternalError,
            DatakitError::Storage(e) => match e {
                StorageError::NotFound(_) => ErrorKind::NotFound,
                StorageError::InvalidKey(_) => ErrorKind::ValidationError,
                _ => ErrorKind::Unavailable,
            },
            DatakitError::Parse(e) => match e {
                ParseError::UnsupportedFormat(_) | ParseError::InvalidEncoding(_) => {
                    ErrorKind::ValidationError
                }
                _ => ErrorKind::InternalError,
            },
            DatakitError::Dedup(e) => match e {
                DedupError::MalformedDataset { .. } => ErrorKind::ValidationError,
                _ => ErrorKind::InternalError,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Document is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process DOCX: {0}")]
    DocxProcessing(String),

    #[error("Parser panicked: {0}")]
    Panicked(String),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Dataset '{record_id}' is malformed: {reason}")]
    MalformedDataset { record_id: String, reason: String },

    #[error("Record not found: {0}")]
    MissingRecord(String),

    #[error("No items survived deduplication")]
    NothingKept,

    #[error("Deduplicator panicked: {0}")]
    Panicked(String),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DatakitError>;
