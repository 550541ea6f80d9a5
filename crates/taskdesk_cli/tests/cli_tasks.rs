use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("taskdesk-{nanos}-{file_name}"))
}

fn write_store(path: &Path, tasks: serde_json::Value) {
    let content = serde_json::json!({
        "schema_version": 1,
        "tasks": tasks,
        "categories": [
            { "id": "1", "name": "Work", "color": "#0d6efd" }
        ]
    });
    std::fs::write(path, serde_json::to_string_pretty(&content).unwrap()).unwrap();
}

fn read_store(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn pending_task(id: &str, title: &str, due: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "category_id": "1",
        "due_date": due,
        "status": "pending",
        "created_at": "2025-12-20T00:00:00Z",
        "updated_at": "2025-12-20T00:00:00Z"
    })
}

fn run(store: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_taskdesk");
    Command::new(exe)
        .args(args)
        .env("TASKDESK_STORE_PATH", store)
        .env("TASKDESK_SNAPSHOT_PATH", store.with_extension("cache.json"))
        .env("TASKDESK_CONFIG_PATH", store.with_extension("config.json"))
        .env("TASKDESK_DISABLE_NOTIFICATIONS", "1")
        .output()
        .expect("failed to run taskdesk")
}

fn cleanup(store: &Path) {
    std::fs::remove_file(store).ok();
    std::fs::remove_file(store.with_extension("cache.json")).ok();
}

#[test]
fn add_persists_task_with_server_id() {
    let store = temp_path("cli-add.json");
    write_store(&store, serde_json::json!([]));

    let output = run(
        &store,
        &[
            "add",
            "Buy milk",
            "--due",
            "2025-12-20",
            "--time",
            "18:00",
            "--reminder",
            "2025-12-20T17:45",
            "--category",
            "1",
            "--json",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let printed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let stored = read_store(&store);
    cleanup(&store);

    assert_eq!(printed["title"], "Buy milk");
    assert_eq!(printed["category"], "Work");
    assert!(printed["id"].as_str().unwrap().starts_with("task-"));
    assert_eq!(stored["tasks"][0]["id"], printed["id"]);
    assert_eq!(stored["tasks"][0]["due_time"], "18:00");
    assert_eq!(stored["tasks"][0]["reminder_time"], "2025-12-20T17:45");
    assert_eq!(stored["tasks"][0]["status"], "pending");
}

#[test]
fn add_without_due_date_is_rejected() {
    let store = temp_path("cli-add-undated.json");

    let output = run(&store, &["add", "Buy milk"]);
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    cleanup(&store);

    assert!(!output.status.success());
    assert!(stderr.contains("ERROR: validation_error - due date is required"));
}

#[test]
fn add_with_blank_title_is_rejected_before_loading() {
    let store = temp_path("cli-add-blank.json");
    std::fs::write(&store, "not json at all").unwrap();

    let output = run(&store, &["add", "  ", "--due", "2025-12-20"]);
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    cleanup(&store);

    assert!(!output.status.success());
    assert!(stderr.contains("validation_error - title is required"));
}

#[test]
fn done_then_reopen_keeps_completion_stamp() {
    let store = temp_path("cli-done.json");
    write_store(&store, serde_json::json!([pending_task("task-1", "ship it", "2025-12-20")]));

    let done = run(&store, &["done", "task-1"]);
    assert!(done.status.success(), "{}", String::from_utf8_lossy(&done.stderr));
    let finished = read_store(&store);

    let reopen = run(&store, &["reopen", "task-1", "--json"]);
    assert!(reopen.status.success());
    let reopened = read_store(&store);
    cleanup(&store);

    assert!(String::from_utf8_lossy(&done.stdout).contains("Finished task: ship it (task-1)"));
    assert_eq!(finished["tasks"][0]["status"], "finished");
    let completed_at = finished["tasks"][0]["completed_at"].as_str().unwrap();
    OffsetDateTime::parse(completed_at, &Rfc3339).unwrap();

    assert_eq!(reopened["tasks"][0]["status"], "pending");
    assert_eq!(reopened["tasks"][0]["completed_at"], completed_at);
    assert_eq!(reopened["tasks"][0]["created_at"], "2025-12-20T00:00:00Z");
}

#[test]
fn edit_changes_only_given_fields() {
    let store = temp_path("cli-edit.json");
    let mut task = pending_task("task-1", "old", "2025-12-20");
    task["reminder_time"] = "2025-12-20T09:00".into();
    write_store(&store, serde_json::json!([task]));

    let output = run(
        &store,
        &["edit", "task-1", "--title", "new", "--clear-reminder"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stored = read_store(&store);
    cleanup(&store);

    assert_eq!(stored["tasks"][0]["title"], "new");
    assert_eq!(stored["tasks"][0]["due_date"], "2025-12-20");
    assert!(stored["tasks"][0]["reminder_time"].is_null());
    assert_ne!(stored["tasks"][0]["updated_at"], "2025-12-20T00:00:00Z");
}

#[test]
fn delete_removes_task_and_unknown_id_fails() {
    let store = temp_path("cli-delete.json");
    write_store(
        &store,
        serde_json::json!([
            pending_task("task-1", "keep", "2025-12-20"),
            pending_task("task-2", "drop", "2025-12-21")
        ]),
    );

    let deleted = run(&store, &["delete", "task-2"]);
    let missing = run(&store, &["delete", "task-9"]);
    let stored = read_store(&store);
    cleanup(&store);

    assert!(deleted.status.success());
    assert!(String::from_utf8_lossy(&deleted.stdout).contains("Deleted task: drop (task-2)"));
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("ERROR: not_found"));
    assert_eq!(stored["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(stored["tasks"][0]["id"], "task-1");
}

#[test]
fn show_resolves_missing_category_to_unknown() {
    let store = temp_path("cli-show.json");
    let mut task = pending_task("task-1", "orphan", "2025-12-20");
    task["category_id"] = "42".into();
    write_store(&store, serde_json::json!([task]));

    let output = run(&store, &["show", "task-1"]);
    cleanup(&store);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("id: task-1"));
    assert!(stdout.contains("category: Unknown (#6c757d)"));
}
