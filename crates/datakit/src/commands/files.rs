//! File commands.

use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::engine::Engine;
use crate::files::{FileFilter, FileMetadata, UnifiedFile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
}

pub fn upload_file(
    engine: &Engine,
    bytes: &[u8],
    metadata: FileMetadata,
) -> ApiResponse<UploadResponse> {
    let result = engine
        .files()
        .register(bytes, metadata)
        .map(|file| UploadResponse {
            file_id: file.file_id().to_string(),
        });
    ApiResponse::from_result(result, "File uploaded")
}

pub fn get_file(engine: &Engine, file_id: &str) -> ApiResponse<UnifiedFile> {
    ApiResponse::from_result(engine.files().get(file_id), "File found")
}

/// Text and binary files merged, in upload order.
pub fn list_files(engine: &Engine, filter: Option<FileFilter>) -> ApiResponse<Vec<UnifiedFile>> {
    let files = engine.files().list(&filter.unwrap_or_default());
    let message = format!("{} file(s)", files.len());
    ApiResponse::ok(files, message)
}

pub fn delete_file(engine: &Engine, file_id: &str) -> ApiResponse<UnifiedFile> {
    ApiResponse::from_result(engine.files().delete(file_id), "File deleted")
}
