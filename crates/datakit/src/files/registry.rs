//! Unified file registry: the source of truth for uploaded artifacts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::model::{
    FileEntry, FileFilter, FileInfo, FileKind, FileMetadata, FileStatus, ParseStatus,
    UnifiedFile,
};
use crate::clock::Clock;
use crate::error::{DatakitError, Result};
use crate::storage::BlobStore;
use crate::sync::{read_lock, write_lock};

type Entry = Arc<RwLock<FileEntry>>;

pub struct FileRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    next_seq: AtomicU64,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    max_file_size: u64,
}

impl FileRegistry {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, max_file_size: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            blobs,
            clock,
            max_file_size,
        }
    }

    pub fn register(&self, bytes: &[u8], metadata: FileMetadata) -> Result<UnifiedFile> {
        let filename = metadata.filename.trim().to_string();
        if filename.is_empty() {
            return Err(DatakitError::Validation("filename is required".to_string()));
        }
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(DatakitError::Validation(format!(
                "file '{}' is {} bytes, exceeding the limit of {} bytes",
                filename, size, self.max_file_size
            )));
        }
        let file_type = metadata.resolved_file_type()?;

        let file_id = Uuid::new_v4().to_string();
        self.blobs.put(&file_id, bytes)?;

        let info = FileInfo {
            file_id: file_id.clone(),
            filename,
            file_type,
            size,
            status: FileStatus::Uploaded,
            created_at: self.clock.now(),
            parse_status: None,
            parse_progress: None,
            record_id: None,
        };
        let file = match metadata.kind {
            FileKind::Text => UnifiedFile::Text { info },
            FileKind::Binary => {
                let mime_type = metadata
                    .mime_type
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&info.filename)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string()
                    });
                UnifiedFile::Binary { info, mime_type }
            }
        };

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        write_lock(&self.entries, "File registry").insert(
            file_id.clone(),
            Arc::new(RwLock::new(FileEntry::new(seq, file.clone()))),
        );

        log::info!(
            "Registered {:?} file {} ({}, {} bytes)",
            file.kind(),
            file_id,
            file.info().filename,
            size
        );
        Ok(file)
    }

    fn entry(&self, file_id: &str) -> Result<Entry> {
        read_lock(&self.entries, "File registry")
            .get(file_id)
            .cloned()
            .ok_or_else(|| DatakitError::not_found("file", file_id))
    }

    pub fn get(&self, file_id: &str) -> Result<UnifiedFile> {
        let entry = self.entry(file_id)?;
        let file = read_lock(&entry, "File entry").file.clone();
        Ok(file)
    }

    pub fn contains(&self, file_id: &str) -> bool {
        read_lock(&self.entries, "File registry").contains_key(file_id)
    }

    /// Both variants merged, in registration order.
    pub fn list(&self, filter: &FileFilter) -> Vec<UnifiedFile> {
        let entries: Vec<Entry> = read_lock(&self.entries, "File registry")
            .values()
            .cloned()
            .collect();

        let mut files: Vec<(u64, UnifiedFile)> = entries
            .iter()
            .filter_map(|entry| {
                let guard = read_lock(entry, "File entry");
                if filter.matches(&guard.file) {
                    Some((guard.seq, guard.file.clone()))
                } else {
                    None
                }
            })
            .collect();
        files.sort_by_key(|(seq, _)| *seq);
        files.into_iter().map(|(_, file)| file).collect()
    }

    pub fn read_blob(&self, file_id: &str) -> Result<Vec<u8>> {
        self.entry(file_id)?;
        Ok(self.blobs.get(file_id)?)
    }

    /// Runs `f` with the file's entry locked for writing.
    ///
    /// Callers that also lock a task must take this lock first.
    pub(crate) fn update_entry<F, T>(&self, file_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut FileEntry) -> Result<T>,
    {
        let entry = self.entry(file_id)?;
        let mut guard = write_lock(&entry, "File entry");
        f(&mut guard)
    }

    /// Mirrors a parse task's state onto the file.
    ///
    /// Fails with `Conflict` when no parse task is bound to the file. The parse
    /// tracker applies the same update under its own lock pair instead.
    pub fn attach_parse_result(
        &self,
        file_id: &str,
        status: ParseStatus,
        progress: u8,
        record_id: Option<String>,
    ) -> Result<UnifiedFile> {
        self.update_entry(file_id, |entry| {
            entry.attach_parse_result(status, progress, record_id)?;
            Ok(entry.file.clone())
        })
    }

    /// Removes the file and its blob. Refused while a parse task is active.
    pub fn delete(&self, file_id: &str) -> Result<UnifiedFile> {
        let removed = {
            let mut entries = write_lock(&self.entries, "File registry");
            let entry = entries
                .get(file_id)
                .cloned()
                .ok_or_else(|| DatakitError::not_found("file", file_id))?;
            let guard = read_lock(&entry, "File entry");
            if let Some(task_id) = &guard.active_task {
                return Err(DatakitError::Conflict(format!(
                    "file {} is referenced by active parse task {}",
                    file_id, task_id
                )));
            }
            let file = guard.file.clone();
            drop(guard);
            entries.remove(file_id);
            file
        };

        if let Err(e) = self.blobs.delete(file_id) {
            log::warn!("Failed to remove blob for deleted file {}: {}", file_id, e);
        }

        log::info!("Deleted file {}", file_id);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries, "File registry").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
