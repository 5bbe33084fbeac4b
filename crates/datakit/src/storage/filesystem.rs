use std::io::Write;
use std::path::{Path, PathBuf};

use super::{validate_key, BlobStore};
use crate::error::StorageError;

/// Stores each blob as a file named after its key under a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a partially written blob.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        ensure_directory(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.blob", key))
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

impl BlobStore for FilesystemBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let final_path = self.blob_path(key);
        let tmp_path = self.root.join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()
        };

        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StorageError::WriteFile {
                path: tmp_path,
                source: e,
            });
        }

        std::fs::rename(&tmp_path, &final_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            StorageError::WriteFile {
                path: final_path.clone(),
                source: e,
            }
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let path = self.blob_path(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.blob_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFile { path, source: e }),
        }
    }

    fn exists(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.blob_path(key).is_file()
    }
}
