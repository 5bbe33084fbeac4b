//! Schema upgrades keyed on SQLite's `user_version` pragma.
//!
//! Each step runs inside its own transaction together with the version bump, so a
//! failed step leaves the database at the previous version.

use rusqlite::Connection;

use super::error::DatabaseError;

struct SchemaStep {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "task_logs",
        sql: include_str!("sql/001_create_task_logs.sql"),
    },
    SchemaStep {
        version: 2,
        name: "parse_history",
        sql: include_str!("sql/002_create_parse_history.sql"),
    },
];

/// Highest schema version this build knows about.
pub fn latest_version() -> i64 {
    STEPS.last().map_or(0, |step| step.version)
}

pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings the schema up to [`latest_version`]. Returns how many steps were applied.
pub fn upgrade(conn: &Connection) -> Result<usize, DatabaseError> {
    let current = schema_version(conn)?;
    if current > latest_version() {
        log::warn!(
            "Database schema v{} is newer than this build (v{}); continuing",
            current,
            latest_version()
        );
        return Ok(0);
    }

    let mut applied = 0;
    for step in STEPS.iter().filter(|step| step.version > current) {
        log::debug!("Upgrading schema to v{} ({})", step.version, step.name);
        apply(conn, step).map_err(|source| DatabaseError::SchemaUpgrade {
            version: step.version,
            name: step.name,
            source,
        })?;
        applied += 1;
    }

    if applied > 0 {
        log::info!("Database schema upgraded from v{} to v{}", current, latest_version());
    }
    Ok(applied)
}

fn apply(conn: &Connection, step: &SchemaStep) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)?;
    tx.commit()
}
