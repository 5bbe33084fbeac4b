use serde::{Deserialize, Serialize};

use super::LogEntry;
use crate::error::{DatakitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One human-readable line per entry.
    Text,
    /// One JSON object per line.
    Jsonl,
}

impl ExportFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "txt" | "log" => Ok(ExportFormat::Text),
            "jsonl" | "json" | "ndjson" => Ok(ExportFormat::Jsonl),
            other => Err(DatakitError::Validation(format!(
                "unknown log export format '{}'",
                other
            ))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Jsonl => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "log",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

/// A downloadable log artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogExport {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub fn render<'a, I>(task_id: &str, entries: I, format: ExportFormat) -> Result<LogExport>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut bytes = Vec::new();
    for entry in entries {
        match format {
            ExportFormat::Text => {
                let line = format!(
                    "{} [{}] {}\n",
                    entry.timestamp.to_rfc3339(),
                    entry.level.as_str().to_uppercase(),
                    entry.message
                );
                bytes.extend_from_slice(line.as_bytes());
            }
            ExportFormat::Jsonl => {
                let line = serde_json::to_string(entry).map_err(|e| {
                    DatakitError::Internal(format!("failed to encode log entry: {}", e))
                })?;
                bytes.extend_from_slice(line.as_bytes());
                bytes.push(b'\n');
            }
        }
    }

    Ok(LogExport {
        filename: format!("{}.{}", task_id, format.extension()),
        content_type: format.content_type().to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::EntryLevel;
    use chrono::{TimeZone, Utc};

    fn entries() -> Vec<LogEntry> {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        vec![
            LogEntry {
                task_id: "t1".to_string(),
                seq: 1,
                timestamp: ts,
                level: EntryLevel::Info,
                message: "started".to_string(),
            },
            LogEntry {
                task_id: "t1".to_string(),
                seq: 2,
                timestamp: ts,
                level: EntryLevel::Error,
                message: "failed".to_string(),
            },
        ]
    }

    #[test]
    fn test_text_export() {
        let export = render("t1", &entries(), ExportFormat::Text).unwrap();
        assert_eq!(export.filename, "t1.log");
        assert_eq!(export.content_type, "text/plain; charset=utf-8");
        let text = String::from_utf8(export.bytes).unwrap();
        assert_eq!(
            text,
            "2026-03-01T12:00:00+00:00 [INFO] started\n2026-03-01T12:00:00+00:00 [ERROR] failed\n"
        );
    }

    #[test]
    fn test_jsonl_export_lines_parse_back() {
        let export = render("t1", &entries(), ExportFormat::Jsonl).unwrap();
        assert_eq!(export.filename, "t1.jsonl");
        let text = String::from_utf8(export.bytes).unwrap();
        let parsed: Vec<LogEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed, entries());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ExportFormat::from_name("JSONL").unwrap(), ExportFormat::Jsonl);
        assert_eq!(ExportFormat::from_name("").unwrap(), ExportFormat::Text);
        assert!(ExportFormat::from_name("xml").is_err());
    }
}
