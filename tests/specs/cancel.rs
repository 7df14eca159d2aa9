//! Spec: cancellation settles a running task as canceled within the
//! SIGTERM grace window, and the record never changes again.

use crate::prelude::*;
use cdx_core::{TaskId, TaskStatus};
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn exec_then_cancel_settles_within_six_seconds() {
    let world = World::with_agent(HANGING_AGENT);
    let (text, _) = world
        .call("local_exec", json!({"task": "long haul", "mode": "read-only"}))
        .await;
    let id = World::task_id_in(&text);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (cancel_text, is_error) = world
        .call("local_cancel", json!({"task_id": id, "reason": "test"}))
        .await;
    assert!(!is_error, "{cancel_text}");

    let task_id = TaskId::parse(&id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(6);
    loop {
        let task = world.registry.lock().get(&task_id).unwrap();
        if task.status == TaskStatus::Canceled {
            assert_eq!(task.error.as_deref(), Some("test"));
            break;
        }
        assert!(Instant::now() < deadline, "task did not settle in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // No further status changes afterwards.
    let settled = world.registry.lock().get(&task_id).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = world.registry.lock().get(&task_id).unwrap();
    assert_eq!(settled, later);
}

#[tokio::test]
async fn cancel_of_terminal_task_reports_already_terminal() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, _) = world
        .call("local_run", json!({"task": "quick", "mode": "read-only"}))
        .await;
    let id = World::task_id_in(&text);

    let (cancel_text, is_error) = world.call("local_cancel", json!({"task_id": id})).await;
    assert!(is_error);
    assert!(cancel_text.starts_with("already-terminal:"), "{cancel_text}");
}

#[tokio::test]
async fn cancel_of_unknown_task_is_not_found() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, is_error) = world
        .call("local_cancel", json!({"task_id": "T-local-0gone"}))
        .await;
    assert!(is_error);
    assert!(text.starts_with("not-found:"), "{text}");
}
