use std::collections::HashMap;
use std::sync::RwLock;

use super::{validate_key, BlobStore};
use crate::error::StorageError;
use crate::sync::{read_lock, write_lock};

/// Blob store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.blobs, "Memory blob store").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        write_lock(&self.blobs, "Memory blob store").insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        read_lock(&self.blobs, "Memory blob store")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        write_lock(&self.blobs, "Memory blob store").remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        read_lock(&self.blobs, "Memory blob store").contains_key(key)
    }
}
