//! Spec: a read-only run completes and its result is retrievable.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn run_returns_a_canonical_task_id() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, is_error) = world
        .call(
            "local_run",
            json!({"task": "say hello", "mode": "read-only", "async": true}),
        )
        .await;
    assert!(!is_error, "{text}");

    let id = World::task_id_in(&text);
    assert!(id.starts_with("T-local-"), "{id}");
    let suffix = id.trim_start_matches("T-local-");
    assert!(!suffix.is_empty());
    assert!(suffix
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
}

#[tokio::test]
async fn results_report_success_and_exit_code_zero() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (text, _) = world
        .call("local_run", json!({"task": "say hello", "mode": "read-only"}))
        .await;
    let id = World::task_id_in(&text);

    let (results, is_error) = world.call("local_results", json!({"task_id": id})).await;
    assert!(!is_error, "{results}");
    assert!(results.contains("completed"), "{results}");
    assert!(results.contains("exit_code: 0"), "{results}");
    assert!(results.contains("hello"), "{results}");
}

#[tokio::test]
async fn two_runs_get_distinct_ids_sorted_by_creation() {
    let world = World::with_agent(COMPLETING_AGENT);
    let (first, _) = world
        .call("local_run", json!({"task": "one", "mode": "read-only", "async": true}))
        .await;
    let (second, _) = world
        .call("local_run", json!({"task": "two", "mode": "read-only", "async": true}))
        .await;
    let a = World::task_id_in(&first);
    let b = World::task_id_in(&second);
    assert_ne!(a, b);
    assert!(b > a, "{b} should sort after {a}");
}
