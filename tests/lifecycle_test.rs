mod helpers;

use std::time::Duration;

use dirmind::config::DirmindConfig;
use dirmind::edits::ApprovalDecision;
use dirmind::server::Backend;
use serde_json::{json, Value};
use tempfile::TempDir;

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    done()
}

#[tokio::test]
async fn watcher_feeds_recent_changes_and_context() {
    let tmp = TempDir::new().unwrap();
    let mut backend = Backend::open(DirmindConfig::default(), tmp.path()).unwrap();
    backend.start();
    if !backend.is_watching() {
        backend.shutdown().await;
        return;
    }
    let root = backend.sandbox().path().to_path_buf();
    let tools = backend.dispatcher().clone();

    helpers::write(&root, "touched.txt", "hello");

    let seen = wait_until(|| {
        tools
            .recent()
            .tail(50)
            .iter()
            .any(|c| c.path == "touched.txt")
    })
    .await;
    assert!(seen, "watcher never reported touched.txt");

    let ctx = dirmind::memory::lock(tools.memory()).get_context(20);
    assert!(ctx
        .iter()
        .any(|c| c.kind == "file_change" && c.data["path"] == "touched.txt"));
    assert!(ctx
        .iter()
        .all(|c| c.data["path"] != ".dirmind_memory.json"));

    backend.shutdown().await;
}

#[tokio::test]
async fn monitor_applies_gui_approval() {
    let tmp = TempDir::new().unwrap();
    let mut config = DirmindConfig::default();
    config.edits.poll_interval_ms = 50;
    let mut backend = Backend::open(config, tmp.path()).unwrap();
    backend.start();
    let root = backend.sandbox().path().to_path_buf();
    helpers::write(&root, "notes.txt", "foo bar foo");
    let tools = backend.dispatcher().clone();

    let out = tools
        .call(
            "edit_file",
            json!({"filepath": "notes.txt", "old_text": "foo", "new_text": "baz"}),
        )
        .await;
    let proposal: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(proposal["status"], "pending_approval");

    let approval = tools.edits().approval_path().to_path_buf();
    std::fs::write(
        &approval,
        serde_json::to_string(&ApprovalDecision::approve("notes.txt")).unwrap(),
    )
    .unwrap();

    let applied = wait_until(|| !approval.exists()).await;
    assert!(applied, "approval was never consumed");
    assert_eq!(helpers::read(&root, "notes.txt"), "baz bar foo");
    assert_eq!(helpers::read(&root, "notes.txt.bak"), "foo bar foo");
    assert!(!tools.edits().pending_path().exists());

    backend.shutdown().await;
}
