//! Spec: mutating sandbox modes require an explicit confirmation flag.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn unconfirmed_mutation_is_rejected_and_creates_no_task() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, is_error) = world
        .call(
            "local_run",
            json!({"task": "create x", "mode": "workspace-write", "confirm": false}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");

    let (status, _) = world.call("local_status", json!({})).await;
    assert_eq!(status, "No local tasks.");
}

#[tokio::test]
async fn omitted_confirm_counts_as_unconfirmed() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, is_error) = world
        .call(
            "local_exec",
            json!({"task": "create x", "mode": "danger-full-access"}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");
}

#[tokio::test]
async fn confirmed_mutation_completes_and_touches_the_workspace() {
    let world =
        World::with_agent(": > spec-output.txt\nprintf '{\"type\":\"turn.completed\"}\\n'");
    let workdir = tempfile::tempdir().unwrap();
    let (text, is_error) = world
        .call(
            "local_run",
            json!({
                "task": "create spec-output.txt",
                "mode": "workspace-write",
                "confirm": true,
                "working_dir": workdir.path().to_str().unwrap()
            }),
        )
        .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("completed"), "{text}");
    assert!(workdir.path().join("spec-output.txt").exists());
}

#[tokio::test]
async fn read_only_needs_no_confirmation() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, is_error) = world
        .call("local_run", json!({"task": "look around", "mode": "read-only"}))
        .await;
    assert!(!is_error, "{text}");
}
