use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatakitError, Result};

/// Lifecycle of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploaded,
    Parsing,
    Parsed,
    ParseFailed,
}

/// Status of a parse task, mirrored onto the file it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Queued => "queued",
            ParseStatus::Running => "running",
            ParseStatus::Completed => "completed",
            ParseStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ParseStatus::Completed | ParseStatus::Failed)
    }

    fn file_status(&self) -> FileStatus {
        match self {
            ParseStatus::Queued | ParseStatus::Running => FileStatus::Parsing,
            ParseStatus::Completed => FileStatus::Parsed,
            ParseStatus::Failed => FileStatus::ParseFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Text,
    Binary,
}

/// Fields shared by both file variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: String,
    pub filename: String,
    pub file_type: String,
    pub size: u64,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_status: Option<ParseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_progress: Option<u8>,
    /// Non-null exactly when `parse_status` is `completed`.
    #[serde(default)]
    pub record_id: Option<String>,
}

/// An uploaded artifact, serialized with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedFile {
    Text {
        #[serde(flatten)]
        info: FileInfo,
    },
    Binary {
        #[serde(flatten)]
        info: FileInfo,
        mime_type: String,
    },
}

impl UnifiedFile {
    pub fn info(&self) -> &FileInfo {
        match self {
            UnifiedFile::Text { info } | UnifiedFile::Binary { info, .. } => info,
        }
    }

    pub(crate) fn info_mut(&mut self) -> &mut FileInfo {
        match self {
            UnifiedFile::Text { info } | UnifiedFile::Binary { info, .. } => info,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.info().file_id
    }

    pub fn kind(&self) -> FileKind {
        match self {
            UnifiedFile::Text { .. } => FileKind::Text,
            UnifiedFile::Binary { .. } => FileKind::Binary,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            UnifiedFile::Text { .. } => None,
            UnifiedFile::Binary { mime_type, .. } => Some(mime_type),
        }
    }
}

/// Caller-supplied metadata for a new upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub kind: FileKind,
    /// Defaults to the filename extension.
    #[serde(default)]
    pub file_type: Option<String>,
    /// Binary files only; guessed from the filename when absent.
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl FileMetadata {
    pub fn text(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind: FileKind::Text,
            file_type: None,
            mime_type: None,
        }
    }

    pub fn binary(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            kind: FileKind::Binary,
            file_type: None,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Resolves `file_type`: the explicit value, else the lowercased extension.
    pub(crate) fn resolved_file_type(&self) -> Result<String> {
        let explicit = self
            .file_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let resolved = match explicit {
            Some(t) => t.trim_start_matches('.').to_ascii_lowercase(),
            None => std::path::Path::new(self.filename.trim())
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default(),
        };
        if resolved.is_empty() {
            return Err(DatakitError::Validation(format!(
                "file_type is required for '{}'",
                self.filename
            )));
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFilter {
    #[serde(default)]
    pub status: Option<FileStatus>,
    #[serde(default)]
    pub kind: Option<FileKind>,
    #[serde(default)]
    pub parse_status: Option<ParseStatus>,
}

impl FileFilter {
    pub fn matches(&self, file: &UnifiedFile) -> bool {
        let info = file.info();
        self.status.map_or(true, |s| info.status == s)
            && self.kind.map_or(true, |k| file.kind() == k)
            && self
                .parse_status
                .map_or(true, |p| info.parse_status == Some(p))
    }
}

/// The file's parse fields before a task was bound, restored if that task is
/// cancelled before it starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParseSnapshot {
    status: FileStatus,
    parse_status: Option<ParseStatus>,
    parse_progress: Option<u8>,
    record_id: Option<String>,
}

/// Registry-side state of one file.
#[derive(Debug)]
pub(crate) struct FileEntry {
    pub(crate) seq: u64,
    pub(crate) file: UnifiedFile,
    pub(crate) active_task: Option<String>,
}

impl FileEntry {
    pub(crate) fn new(seq: u64, file: UnifiedFile) -> Self {
        Self {
            seq,
            file,
            active_task: None,
        }
    }

    /// Binds a new parse task. The file shows `queued` with no record until it completes.
    pub(crate) fn bind_parse_task(&mut self, task_id: &str) -> Result<ParseSnapshot> {
        if let Some(active) = &self.active_task {
            return Err(DatakitError::Conflict(format!(
                "file {} already has an active parse task {}",
                self.file.file_id(),
                active
            )));
        }

        let info = self.file.info_mut();
        let snapshot = ParseSnapshot {
            status: info.status,
            parse_status: info.parse_status,
            parse_progress: info.parse_progress,
            record_id: info.record_id.take(),
        };
        info.status = FileStatus::Parsing;
        info.parse_status = Some(ParseStatus::Queued);
        info.parse_progress = Some(0);
        self.active_task = Some(task_id.to_string());
        Ok(snapshot)
    }

    /// Undoes [`bind_parse_task`](Self::bind_parse_task).
    pub(crate) fn restore(&mut self, snapshot: ParseSnapshot) {
        let info = self.file.info_mut();
        info.status = snapshot.status;
        info.parse_status = snapshot.parse_status;
        info.parse_progress = snapshot.parse_progress;
        info.record_id = snapshot.record_id;
        self.active_task = None;
    }

    /// Mirrors the bound task's state onto the file.
    ///
    /// `record_id` must be present exactly when `status` is `completed`, and only
    /// a completed parse shows progress 100. A terminal status releases the binding.
    pub(crate) fn attach_parse_result(
        &mut self,
        status: ParseStatus,
        progress: u8,
        record_id: Option<String>,
    ) -> Result<()> {
        if self.active_task.is_none() {
            return Err(DatakitError::Conflict(format!(
                "file {} has no active parse task",
                self.file.file_id()
            )));
        }
        if (status == ParseStatus::Completed) != record_id.is_some() {
            return Err(DatakitError::Validation(format!(
                "record_id must be set exactly when parsing completes (status {})",
                status.as_str()
            )));
        }

        let progress = if status == ParseStatus::Completed {
            100
        } else {
            progress.min(99)
        };

        let info = self.file.info_mut();
        info.status = status.file_status();
        info.parse_status = Some(status);
        info.parse_progress = Some(progress);
        info.record_id = record_id;

        if status.is_terminal() {
            self.active_task = None;
        }
        Ok(())
    }
}
