//! Byte storage for uploaded artifacts.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::StorageError;

/// Blob storage keyed by file id.
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous blob.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the blob. Missing keys are not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn exists(&self, key: &str) -> bool;
}

/// Keys become file names, so only a conservative character set is accepted.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
