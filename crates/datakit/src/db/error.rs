use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{dir}': {source}")]
    CreateDirectory {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema step failed; the transaction for that step was rolled back.
    #[error("Schema upgrade to v{version} ({name}) failed: {source}")]
    SchemaUpgrade {
        version: i64,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}
