//! Near-duplicate detection over question/answer items.
//!
//! Items are reduced to lowercase word sets and compared with Jaccard
//! similarity. The first item of each similarity group is kept; later items at
//! or above the threshold are removed.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DedupParams;
use crate::error::DedupError;
use crate::records::ParsedRecord;

static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    pub id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub answer: String,
}

impl QaItem {
    /// Text used for comparison under `params`.
    pub fn comparison_text<'a>(&'a self, params: &DedupParams) -> &'a str {
        if params.dedup_by_answer && self.answer.chars().count() >= params.min_answer_length {
            &self.answer
        } else {
            &self.question
        }
    }
}

/// Reads the items of a record.
///
/// A record whose content is a JSON array is read as QA objects (`question`
/// required, `answer` and `id` optional). Anything else is one item per
/// non-empty line.
pub fn items_from_record(record: &ParsedRecord) -> Result<Vec<QaItem>, DedupError> {
    let trimmed = record.content.trim_start();
    if trimmed.starts_with('[') {
        return items_from_json(record, trimmed);
    }

    Ok(record
        .content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| QaItem {
            id: format!("{}:{}", record.record_id, index + 1),
            question: line.to_string(),
            answer: String::new(),
        })
        .collect())
}

fn items_from_json(record: &ParsedRecord, content: &str) -> Result<Vec<QaItem>, DedupError> {
    let malformed = |reason: String| DedupError::MalformedDataset {
        record_id: record.record_id.clone(),
        reason,
    };

    let values: Vec<Value> =
        serde_json::from_str(content).map_err(|e| malformed(e.to_string()))?;

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let question = value
                .get("question")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(format!("item {} has no question", index + 1)))?;
            let answer = value
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let id = match value.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => format!("{}:{}", record.record_id, index + 1),
            };
            Ok(QaItem {
                id,
                question: question.to_string(),
                answer: answer.to_string(),
            })
        })
        .collect()
}

/// Items removed because they were too similar to `kept_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub kept_id: String,
    pub removed: Vec<QaItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    pub kept: Vec<QaItem>,
    pub groups: Vec<DuplicateGroup>,
}

impl DedupOutcome {
    pub fn removed_count(&self) -> usize {
        self.groups.iter().map(|g| g.removed.len()).sum()
    }
}

/// Receives progress in percent of the deduplication step.
///
/// Returning an error (normally `DedupError::Cancelled`) stops the run.
pub trait DedupObserver {
    fn progress(&self, percent: u8) -> Result<(), DedupError>;
}

pub trait Deduplicator: Send + Sync {
    fn deduplicate(
        &self,
        items: Vec<QaItem>,
        params: &DedupParams,
        observer: &dyn DedupObserver,
    ) -> Result<DedupOutcome, DedupError>;
}

fn word_set(text: &str) -> HashSet<String> {
    RE_WORD
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Jaccard similarity of two word sets. Two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

#[derive(Debug, Default)]
pub struct JaccardDeduplicator;

impl JaccardDeduplicator {
    pub fn new() -> Self {
        Self
    }
}

impl Deduplicator for JaccardDeduplicator {
    fn deduplicate(
        &self,
        items: Vec<QaItem>,
        params: &DedupParams,
        observer: &dyn DedupObserver,
    ) -> Result<DedupOutcome, DedupError> {
        let total = items.len();
        let step = (total / 10).max(1);
        let mut kept: Vec<(QaItem, HashSet<String>)> = Vec::new();
        let mut groups: Vec<DuplicateGroup> = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            if index % step == 0 {
                observer.progress((index * 100 / total.max(1)) as u8)?;
            }

            let words = word_set(item.comparison_text(params));
            let duplicate_of = kept
                .iter()
                .find(|(_, kept_words)| jaccard(&words, kept_words) >= params.threshold)
                .map(|(kept_item, _)| kept_item.id.clone());

            match duplicate_of {
                Some(kept_id) => {
                    log::debug!("Item {} duplicates {}", item.id, kept_id);
                    match groups.iter_mut().find(|g| g.kept_id == kept_id) {
                        Some(group) => group.removed.push(item),
                        None => groups.push(DuplicateGroup {
                            kept_id,
                            removed: vec![item],
                        }),
                    }
                }
                None => kept.push((item, words)),
            }
        }

        observer.progress(100)?;
        Ok(DedupOutcome {
            kept: kept.into_iter().map(|(item, _)| item).collect(),
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::cell::RefCell;

    struct Recorder(RefCell<Vec<u8>>);

    impl DedupObserver for Recorder {
        fn progress(&self, percent: u8) -> Result<(), DedupError> {
            self.0.borrow_mut().push(percent);
            Ok(())
        }
    }

    struct Cancelled;

    impl DedupObserver for Cancelled {
        fn progress(&self, _percent: u8) -> Result<(), DedupError> {
            Err(DedupError::Cancelled)
        }
    }

    fn record(content: &str) -> ParsedRecord {
        ParsedRecord {
            record_id: "r1".to_string(),
            file_id: None,
            task_id: "t1".to_string(),
            task_type: "parse".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn qa(id: &str, question: &str, answer: &str) -> QaItem {
        QaItem {
            id: id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn test_items_from_lines() {
        let items = items_from_record(&record("first line\n\n  second line  \n")).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "r1:1");
        assert_eq!(items[1].question, "second line");
    }

    #[test]
    fn test_items_from_json() {
        let content = r#"[
            {"id": 7, "question": "What is Rust?", "answer": "A language."},
            {"question": "What is Cargo?"}
        ]"#;
        let items = items_from_record(&record(content)).unwrap();
        assert_eq!(items[0].id, "7");
        assert_eq!(items[0].answer, "A language.");
        assert_eq!(items[1].id, "r1:2");
        assert!(items[1].answer.is_empty());
    }

    #[test]
    fn test_items_from_malformed_json() {
        let err = items_from_record(&record(r#"[{"answer": "no question"}]"#)).unwrap_err();
        assert!(matches!(err, DedupError::MalformedDataset { .. }));

        let err = items_from_record(&record("[not json")).unwrap_err();
        assert!(matches!(err, DedupError::MalformedDataset { .. }));
    }

    #[test]
    fn test_jaccard() {
        let a = word_set("the quick brown fox");
        let b = word_set("The quick brown fox!");
        let c = word_set("something else entirely");
        assert_eq!(jaccard(&a, &b), 1.0);
        assert_eq!(jaccard(&a, &c), 0.0);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 1.0);
    }

    #[test]
    fn test_deduplicate_keeps_first_of_group() {
        let items = vec![
            qa("1", "How do I install Rust on Linux?", ""),
            qa("2", "How do I install Rust on Linux", ""),
            qa("3", "What is the borrow checker?", ""),
            qa("4", "how do i install rust on linux?", ""),
        ];
        let recorder = Recorder(RefCell::new(Vec::new()));
        let outcome = JaccardDeduplicator::new()
            .deduplicate(items, &DedupParams::default(), &recorder)
            .unwrap();

        let kept: Vec<&str> = outcome.kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(kept, vec!["1", "3"]);
        assert_eq!(outcome.removed_count(), 2);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].kept_id, "1");

        let progress = recorder.0.into_inner();
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_dedup_by_answer_respects_min_length() {
        let params = DedupParams {
            dedup_by_answer: true,
            threshold: 0.8,
            min_answer_length: 15,
        };
        let long = "Use rustup to install the toolchain";
        let items = vec![
            qa("1", "Installing Rust?", long),
            qa("2", "Completely different wording", long),
            qa("3", "Unrelated question", "short"),
            qa("4", "Another unrelated topic", "short"),
        ];
        let outcome = JaccardDeduplicator::new()
            .deduplicate(items, &params, &Recorder(RefCell::new(Vec::new())))
            .unwrap();
        let kept: Vec<&str> = outcome.kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(kept, vec!["1", "3", "4"]);
    }

    #[test]
    fn test_cancelled_observer_stops() {
        let err = JaccardDeduplicator::new()
            .deduplicate(vec![qa("1", "q", "")], &DedupParams::default(), &Cancelled)
            .unwrap_err();
        assert!(matches!(err, DedupError::Cancelled));
    }
}
