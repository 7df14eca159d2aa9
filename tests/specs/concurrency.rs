//! Spec: the working-task ceiling holds while a batch drains to
//! completion.

use crate::prelude::*;
use cdx_core::TaskStatus;
use cdx_engine::Governor;
use cdx_storage::TaskQuery;
use serde_json::json;
use serial_test::serial;
use std::time::{Duration, Instant};

#[tokio::test]
async fn five_tasks_through_two_slots() {
    let world = World::with_agent_and_governor(
        r#"sleep 0.3; printf '{"type":"turn.completed"}\n'"#,
        Governor::new(2),
    );

    let mut ids = Vec::new();
    for n in 0..5 {
        let (text, is_error) = world
            .call(
                "local_exec",
                json!({"task": format!("batch item {n}"), "mode": "read-only"}),
            )
            .await;
        assert!(!is_error, "{text}");
        ids.push(World::task_id_in(&text));
    }

    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let working = world
            .registry
            .lock()
            .query(&TaskQuery::default().with_status(TaskStatus::Working))
            .len();
        assert!(working <= 2, "{working} tasks working at once");

        let done = world
            .registry
            .lock()
            .query(&TaskQuery::default().with_status(TaskStatus::Completed))
            .len();
        if done == ids.len() {
            break;
        }
        assert!(Instant::now() < deadline, "batch did not drain");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
#[serial]
async fn ceiling_is_read_from_the_environment() {
    std::env::set_var("CODEX_MAX_CONCURRENCY", "3");
    assert_eq!(Governor::from_env().capacity(), 3);
    std::env::remove_var("CODEX_MAX_CONCURRENCY");
    assert_eq!(Governor::from_env().capacity(), 2);
}
