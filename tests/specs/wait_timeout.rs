//! Spec: wait with a short timeout reports the timeout and mutates
//! nothing.

use crate::prelude::*;
use cdx_core::{TaskId, TaskStatus};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn wait_timeout_leaves_the_task_working() {
    let world = World::with_agent(HANGING_AGENT);
    let (text, _) = world
        .call("local_exec", json!({"task": "long haul", "mode": "read-only"}))
        .await;
    let id = World::task_id_in(&text);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let before = world
        .registry
        .lock()
        .get(&TaskId::parse(&id).unwrap())
        .unwrap();
    assert_eq!(before.status, TaskStatus::Working);

    let (wait_text, is_error) = world
        .call(
            "local_wait",
            json!({"task_id": id, "timeout_sec": 1, "poll_interval_sec": 1}),
        )
        .await;
    assert!(is_error);
    assert!(wait_text.starts_with("timeout:"), "{wait_text}");

    let after = world
        .registry
        .lock()
        .get(&TaskId::parse(&id).unwrap())
        .unwrap();
    assert_eq!(after.status, TaskStatus::Working);
    assert_eq!(before.updated_at, after.updated_at);

    // Stop the stub so the spec exits cleanly.
    world.call("local_cancel", json!({"task_id": id})).await;
}

#[tokio::test]
async fn wait_returns_final_status_when_the_task_finishes() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, _) = world
        .call("local_exec", json!({"task": "quick", "mode": "read-only"}))
        .await;
    let id = World::task_id_in(&text);

    let (wait_text, is_error) = world
        .call(
            "local_wait",
            json!({"task_id": id, "timeout_sec": 10, "poll_interval_sec": 1}),
        )
        .await;
    assert!(!is_error, "{wait_text}");
    assert!(wait_text.contains("completed"), "{wait_text}");
}
