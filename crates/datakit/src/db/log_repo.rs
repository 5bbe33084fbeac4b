//! Task log repository: append-only rows in the `task_logs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw task log row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub task_id: String,
    pub seq: i64,
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            seq: row.get("seq")?,
            timestamp: row.get("timestamp")?,
            level: row.get("level")?,
            message: row.get("message")?,
        })
    }
}

pub fn insert(db: &Database, row: &LogRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO task_logs (task_id, seq, timestamp, level, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.task_id, row.seq, row.timestamp, row.level, row.message],
        )?;
        Ok(())
    })
}

/// Returns the entries of one task with `seq > after_seq`, in append order.
pub fn find_by_task(
    db: &Database,
    task_id: &str,
    after_seq: i64,
) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT task_id, seq, timestamp, level, message FROM task_logs
             WHERE task_id = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id, after_seq], LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Loads every stored entry, grouped by task and ordered by sequence.
pub fn load_all(db: &Database) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT task_id, seq, timestamp, level, message FROM task_logs
             ORDER BY task_id ASC, seq ASC",
        )?;
        let rows = stmt
            .query_map([], LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
