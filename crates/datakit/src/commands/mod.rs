//! API boundary: every operation returns an [`ApiResponse`] and never an error.
//!
//! Commands are organized by domain:
//! - `files`: upload, lookup, listing and deletion
//! - `parse`: parse submission, progress and history
//! - `dedup`: deduplication task lifecycle
//! - `logs`: task log reads and exports

pub mod dedup;
pub mod files;
pub mod logs;
pub mod parse;

pub use dedup::*;
pub use files::*;
pub use logs::*;
pub use parse::*;

use serde::{Deserialize, Serialize};

use crate::error::{DatakitError, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Fail,
}

/// Response wrapper for API calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
            error_kind: None,
        }
    }

    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Fail,
            message: message.into(),
            data: None,
            error_kind: Some(kind),
        }
    }

    pub fn from_error(error: &DatakitError) -> Self {
        Self::fail(error.kind(), error.to_string())
    }

    pub fn from_result(result: Result<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(data, message),
            Err(e) => {
                log::debug!("Command failed ({}): {}", e.kind().as_str(), e);
                Self::from_error(&e)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }
}
