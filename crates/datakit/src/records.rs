//! Parsed records and deduplicated datasets, addressed by `record_id`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::{read_lock, write_lock};

/// Namespace for content-addressed record ids.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_0c8a_51b4_4e0e_9a57_3c2d_8e41_b7a0);

/// Derives a record id from the producing task type and the input bytes.
///
/// The same content parsed the same way always yields the same id.
pub fn content_record_id(task_type: &str, bytes: &[u8]) -> String {
    let mut name = Vec::with_capacity(task_type.len() + 1 + bytes.len());
    name.extend_from_slice(task_type.as_bytes());
    name.push(0);
    name.extend_from_slice(bytes);
    Uuid::new_v5(&RECORD_NAMESPACE, &name).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub record_id: String,
    /// Source file; absent for deduplicated outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub task_id: String,
    pub task_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input or output reference of a deduplication task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub record_id: String,
}

#[derive(Default)]
pub struct RecordStore {
    records: RwLock<HashMap<String, Arc<ParsedRecord>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record, replacing any previous one with the same id.
    pub fn put(&self, record: ParsedRecord) -> Arc<ParsedRecord> {
        let record = Arc::new(record);
        write_lock(&self.records, "Record store")
            .insert(record.record_id.clone(), Arc::clone(&record));
        record
    }

    pub fn get(&self, record_id: &str) -> Option<Arc<ParsedRecord>> {
        read_lock(&self.records, "Record store").get(record_id).cloned()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        read_lock(&self.records, "Record store").contains_key(record_id)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.records, "Record store").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
