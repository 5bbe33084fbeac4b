//! Command envelopes as a frontend sees them: JSON with `status`, `message`,
//! `data` and `error_kind`.

mod common;

use common::TestHarness;
use datakit::commands::*;
use datakit::dedup::{DedupStatus, NewDedupTask};
use datakit::error::ErrorKind;
use datakit::files::{FileFilter, FileKind, FileMetadata, ParseStatus};
use serde_json::Value;

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

#[test]
fn test_upload_and_get_file_envelopes() {
    let harness = TestHarness::new();

    let uploaded = upload_file(&harness.engine, b"hello", FileMetadata::text("notes.md"));
    let json = to_json(&uploaded);
    assert_eq!(json["status"], "success");
    assert_eq!(json["message"], "File uploaded");
    let file_id = json["data"]["file_id"].as_str().unwrap().to_string();

    let file = to_json(&get_file(&harness.engine, &file_id));
    assert_eq!(file["data"]["type"], "text");
    assert_eq!(file["data"]["file_id"], file_id.as_str());
    assert_eq!(file["data"]["filename"], "notes.md");
    assert_eq!(file["data"]["file_type"], "md");
    assert_eq!(file["data"]["size"], 5);
    assert_eq!(file["data"]["status"], "uploaded");
    assert!(file["data"]["record_id"].is_null());

    let binary = upload_file(&harness.engine, b"%PDF", FileMetadata::binary("scan.pdf"));
    let binary_id = binary.into_data().unwrap().file_id;
    let file = to_json(&get_file(&harness.engine, &binary_id));
    assert_eq!(file["data"]["type"], "binary");
    assert_eq!(file["data"]["mime_type"], "application/pdf");

    let missing = to_json(&get_file(&harness.engine, "nope"));
    assert_eq!(missing["status"], "fail");
    assert_eq!(missing["error_kind"], "not_found");
    assert!(missing.get("data").is_none());
}

#[test]
fn test_upload_validation_failures() {
    let harness = TestHarness::with_config(|config| config.storage.max_file_size = 4);

    let too_big = upload_file(&harness.engine, b"12345", FileMetadata::text("big.txt"));
    assert_eq!(too_big.error_kind, Some(ErrorKind::ValidationError));
    assert!(too_big.message.contains("limit"));

    let unnamed = upload_file(&harness.engine, b"1", FileMetadata::text("  "));
    assert_eq!(unnamed.error_kind, Some(ErrorKind::ValidationError));

    let files = list_files(&harness.engine, None).into_data().unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_list_files_with_filter() {
    let harness = TestHarness::new();
    let (parsed, _) = harness.parsed_file("done.txt", "x");
    let raw = harness.upload_text("raw.txt", "y");
    let binary = upload_file(&harness.engine, b"\x00", FileMetadata::binary("b.bin"))
        .into_data()
        .unwrap()
        .file_id;

    let all = list_files(&harness.engine, None).into_data().unwrap();
    let ids: Vec<&str> = all.iter().map(|f| f.file_id()).collect();
    assert_eq!(ids, vec![parsed.as_str(), raw.as_str(), binary.as_str()]);

    let binaries = list_files(
        &harness.engine,
        Some(FileFilter {
            kind: Some(FileKind::Binary),
            ..FileFilter::default()
        }),
    )
    .into_data()
    .unwrap();
    assert_eq!(binaries.len(), 1);
    assert_eq!(binaries[0].file_id(), binary);

    let completed = list_files(
        &harness.engine,
        Some(FileFilter {
            parse_status: Some(ParseStatus::Completed),
            ..FileFilter::default()
        }),
    )
    .into_data()
    .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].file_id(), parsed);
}

#[test]
fn test_parse_command_flow() {
    let harness = TestHarness::new();
    let file_id = harness.upload_text("cmd.txt", "abc");

    let submitted = submit_parse(&harness.engine, &file_id, "parse");
    let json = to_json(&submitted);
    assert_eq!(json["status"], "success");
    let task_id = json["data"]["task_id"].as_str().unwrap().to_string();
    let record_id = json["data"]["record_id"].as_str().unwrap().to_string();
    harness.wait_parse_terminal(&task_id);

    let progress = to_json(&get_task_progress(&harness.engine, &task_id));
    assert_eq!(progress["data"]["progress"], 100);
    assert_eq!(progress["data"]["status"], "completed");
    assert_eq!(progress["data"]["task_type"], "parse");

    let task = to_json(&get_parse_task(&harness.engine, &task_id));
    assert_eq!(task["data"]["file_id"], file_id.as_str());
    assert_eq!(task["data"]["record_id"], record_id.as_str());

    let tasks = list_parse_tasks(&harness.engine, &file_id).into_data().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        list_parse_tasks(&harness.engine, "ghost").error_kind,
        Some(ErrorKind::NotFound)
    );

    let cancelled = cancel_parse(&harness.engine, &task_id);
    assert_eq!(cancelled.error_kind, Some(ErrorKind::Conflict));

    let invalid = submit_parse(&harness.engine, &file_id, "bad type!");
    assert_eq!(invalid.error_kind, Some(ErrorKind::ValidationError));
    let unknown = submit_parse(&harness.engine, "ghost", "parse");
    assert_eq!(unknown.error_kind, Some(ErrorKind::NotFound));
}

#[test]
fn test_task_progress_falls_back_to_dedup() {
    let harness = TestHarness::new();
    let (file_id, _) = harness.parsed_file("qa.txt", "q one\nq two\n");

    let created = create_dedup_task(&harness.engine, NewDedupTask::new("via-command", vec![file_id]));
    let json = to_json(&created);
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["status"], "pending");
    assert!(json["data"]["output"].is_null());
    let task_id = json["data"]["task_id"].as_str().unwrap().to_string();
    harness.wait_dedup_status(&task_id, DedupStatus::Completed);

    let progress = get_task_progress(&harness.engine, &task_id).into_data().unwrap();
    assert_eq!(progress.progress, 100);
    assert_eq!(progress.task_type, "deduplication");
    assert_eq!(
        get_dedup_progress(&harness.engine, &task_id).into_data().unwrap(),
        progress
    );

    let detail = to_json(&get_dedup_task(&harness.engine, &task_id));
    assert_eq!(detail["data"]["task_id"], task_id.as_str());
    assert!(detail["data"]["output"]["record_id"].is_string());
    assert!(detail["data"]["logs"]["total"].as_u64().unwrap() >= 2);

    let missing = get_task_progress(&harness.engine, "no-such-task");
    assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
}

#[test]
fn test_dedup_cancel_and_retry_commands() {
    let harness = TestHarness::new();
    let (_, record_id) = harness.parsed_file("items.txt", "only\n");
    let task = harness.create_dedup("done", &[&record_id]);
    harness.wait_dedup_status(&task.task_id, DedupStatus::Completed);

    let cancel = cancel_dedup_task(&harness.engine, &task.task_id);
    assert_eq!(cancel.error_kind, Some(ErrorKind::Conflict));
    let retry = retry_dedup_task(&harness.engine, &task.task_id);
    assert_eq!(retry.error_kind, Some(ErrorKind::Conflict));
    let missing = retry_dedup_task(&harness.engine, "ghost");
    assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
}

#[test]
fn test_delete_file_command() {
    let harness = TestHarness::new();
    let file_id = harness.upload_text("gone.txt", "bye");

    let deleted = delete_file(&harness.engine, &file_id);
    assert!(deleted.is_success());
    assert_eq!(deleted.into_data().unwrap().file_id(), file_id);

    let again = delete_file(&harness.engine, &file_id);
    assert_eq!(again.error_kind, Some(ErrorKind::NotFound));
}
