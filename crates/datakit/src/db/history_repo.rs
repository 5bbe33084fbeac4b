//! Parse history repository: one row per successfully completed parse task.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub task_id: String,
    pub record_id: String,
    pub file_id: String,
    pub task_type: String,
    pub completed_at: String,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            record_id: row.get("record_id")?,
            file_id: row.get("file_id")?,
            task_type: row.get("task_type")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

pub fn insert(db: &Database, row: &HistoryRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO parse_history (task_id, record_id, file_id, task_type, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.task_id,
                row.record_id,
                row.file_id,
                row.task_type,
                row.completed_at
            ],
        )?;
        Ok(())
    })
}

/// Counts how many completed parse tasks produced `record_id`.
pub fn count_by_record(db: &Database, record_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM parse_history WHERE record_id = ?1",
            params![record_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

pub fn find_by_record(db: &Database, record_id: &str) -> Result<Vec<HistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT task_id, record_id, file_id, task_type, completed_at FROM parse_history
             WHERE record_id = ?1 ORDER BY completed_at ASC",
        )?;
        let rows = stmt
            .query_map(params![record_id], HistoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
