// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cdx_adapters::{FakeCloudClient, RemoteStatus};
use cdx_core::{SequentialIdGen, SystemClock};
use cdx_engine::{Governor, PollConfig};
use cdx_storage::TaskRegistry;
use parking_lot::Mutex;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tempfile::TempDir;

const COMPLETING_AGENT: &str = r#"
printf '{"type":"thread.started","thread_id":"th-1"}\n'
printf '{"type":"item.completed","data":{"id":"m1","type":"agent_message","text":"done"}}\n'
printf '{"type":"turn.completed"}\n'
"#;

struct Fixture {
    dir: TempDir,
    registry: SharedRegistry<SystemClock>,
    client: FakeCloudClient,
    dispatcher: Dispatcher<SystemClock, SequentialIdGen, FakeCloudClient>,
}

impl Fixture {
    fn new(agent_body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fake-codex");
        std::fs::write(&program, format!("#!/bin/sh\n{agent_body}\n")).unwrap();
        let mut perms = std::fs::metadata(&program).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&program, perms).unwrap();

        let registry: SharedRegistry<SystemClock> = Arc::new(Mutex::new(
            TaskRegistry::open(dir.path().join("tasks.json"), SystemClock).unwrap(),
        ));
        let governor = Governor::new(2);
        let client = FakeCloudClient::new();
        let local = LocalExecutor::new(
            Arc::clone(&registry),
            governor.clone(),
            SystemClock,
            SequentialIdGen::new("d"),
        )
        .with_program(program.display().to_string());
        let cloud = CloudExecutor::new(
            Arc::clone(&registry),
            governor,
            SystemClock,
            SequentialIdGen::new("d"),
            client.clone(),
        )
        .with_poll_config(PollConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
        });
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            local,
            cloud,
            dir.path().join("environments.json"),
            SystemClock,
        );
        Self {
            dir,
            registry,
            client,
            dispatcher,
        }
    }

    fn write_environments(&self) {
        std::fs::write(
            self.dir.path().join("environments.json"),
            r#"{"staging": {"name": "Staging", "repoUrl": "https://github.com/acme/api.git", "stack": "rust"}}"#,
        )
        .unwrap();
    }

    async fn call(&self, name: &str, args: serde_json::Value) -> (String, bool) {
        let request = RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: "tools/call".into(),
            params: Some(json!({"name": name, "arguments": args})),
        };
        let response = self.dispatcher.handle(request).await.unwrap();
        let result = response.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        let is_error = result["isError"].as_bool().unwrap_or(false);
        (text, is_error)
    }

    fn extract_task_id(text: &str) -> String {
        text.split_whitespace()
            .find(|w| w.starts_with("T-"))
            .unwrap()
            .trim_end_matches(['.', ',', ':'])
            .to_string()
    }
}

// --- protocol surface ---

#[tokio::test]
async fn initialize_reports_server_info() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let request = RpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(1)),
        method: "initialize".into(),
        params: None,
    };
    let response = fx.dispatcher.handle(request).await.unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "cdx");
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tools_list_advertises_all_primitives() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let request = RpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(2)),
        method: "tools/list".into(),
        params: None,
    };
    let response = fx.dispatcher.handle(request).await.unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, 14);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let request = RpcRequest {
        jsonrpc: "2.0".into(),
        id: Some(json!(3)),
        method: "bogus/endpoint".into(),
        params: None,
    };
    let response = fx.dispatcher.handle(request).await.unwrap();
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn unknown_tool_is_reported_as_tool_error() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx.call("local_launch", json!({})).await;
    assert!(is_error);
    assert!(text.starts_with("not-found:"), "{text}");
}

// --- local primitives ---

#[tokio::test]
async fn local_run_waits_for_the_result_by_default() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call("local_run", json!({"task": "say hello", "mode": "read-only"}))
        .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("completed"), "{text}");
    assert!(text.contains("done"), "{text}");
    assert!(Fixture::extract_task_id(&text).starts_with("T-local-"));
}

#[tokio::test]
async fn local_run_async_returns_immediately() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call(
            "local_run",
            json!({"task": "say hello", "mode": "read-only", "async": true}),
        )
        .await;
    assert!(!is_error);
    assert!(text.contains("pending"), "{text}");
}

#[tokio::test]
async fn mutation_without_confirmation_creates_no_task() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call(
            "local_run",
            json!({"task": "create x", "mode": "workspace-write", "confirm": false}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");

    let (status, _) = fx.call("local_status", json!({})).await;
    assert_eq!(status, "No local tasks.");
}

#[tokio::test]
async fn confirmed_mutation_runs_in_working_dir() {
    let fx = Fixture::new(": > created.txt\nprintf '{\"type\":\"turn.completed\"}\\n'");
    let workdir = tempfile::tempdir().unwrap();
    let (text, is_error) = fx
        .call(
            "local_run",
            json!({
                "task": "create x",
                "mode": "workspace-write",
                "confirm": true,
                "working_dir": workdir.path().to_str().unwrap()
            }),
        )
        .await;
    assert!(!is_error, "{text}");
    assert!(text.contains("completed"), "{text}");
    assert!(workdir.path().join("created.txt").exists());
}

#[tokio::test]
async fn missing_working_dir_is_a_validation_error() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call(
            "local_exec",
            json!({"task": "t", "mode": "read-only", "working_dir": "/nope/nothing/here"}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");
}

#[tokio::test]
async fn exec_then_wait_then_results() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, _) = fx
        .call("local_exec", json!({"task": "bg work", "mode": "read-only"}))
        .await;
    let id = Fixture::extract_task_id(&text);

    let (wait_text, is_error) = fx
        .call("local_wait", json!({"task_id": id, "timeout_sec": 10, "poll_interval_sec": 1}))
        .await;
    assert!(!is_error, "{wait_text}");
    assert!(wait_text.contains("completed"));

    let (results_text, is_error) = fx.call("local_results", json!({"task_id": id})).await;
    assert!(!is_error);
    assert!(results_text.contains("exit_code: 0"), "{results_text}");
    assert!(results_text.contains("thread_id: th-1"), "{results_text}");
}

#[tokio::test]
async fn wait_timeout_leaves_the_task_untouched() {
    let fx = Fixture::new("sleep 30");
    let (text, _) = fx
        .call("local_exec", json!({"task": "long", "mode": "read-only"}))
        .await;
    let id = Fixture::extract_task_id(&text);
    // Let it reach working.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (wait_text, is_error) = fx
        .call("local_wait", json!({"task_id": id, "timeout_sec": 1, "poll_interval_sec": 1}))
        .await;
    assert!(is_error);
    assert!(wait_text.starts_with("timeout:"), "{wait_text}");

    let task = fx
        .registry
        .lock()
        .get(&TaskId::parse(&id).unwrap())
        .unwrap();
    assert_eq!(task.status, TaskStatus::Working);

    // Clean up the stub process.
    fx.call("local_cancel", json!({"task_id": id})).await;
}

#[tokio::test]
async fn cancel_flow_reaches_canceled_within_grace() {
    let fx = Fixture::new("sleep 30");
    let (text, _) = fx
        .call("local_exec", json!({"task": "long", "mode": "read-only"}))
        .await;
    let id = Fixture::extract_task_id(&text);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (cancel_text, is_error) = fx
        .call("local_cancel", json!({"task_id": id, "reason": "test"}))
        .await;
    assert!(!is_error, "{cancel_text}");

    let (wait_text, _) = fx
        .call("local_wait", json!({"task_id": id, "timeout_sec": 6, "poll_interval_sec": 1}))
        .await;
    assert!(wait_text.contains("canceled"), "{wait_text}");

    // A second cancel is already-terminal.
    let (again, is_error) = fx.call("local_cancel", json!({"task_id": id})).await;
    assert!(is_error);
    assert!(again.starts_with("already-terminal:"), "{again}");
}

#[tokio::test]
async fn results_for_unknown_id_suggests_near_misses() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, _) = fx
        .call("local_run", json!({"task": "t", "mode": "read-only"}))
        .await;
    let id = Fixture::extract_task_id(&text);

    let mut near_miss = id.clone();
    near_miss.pop();
    near_miss.push('0');
    let (miss_text, is_error) = fx
        .call("local_results", json!({"task_id": near_miss}))
        .await;
    assert!(is_error);
    assert!(miss_text.starts_with("not-found:"), "{miss_text}");
    assert!(miss_text.contains(&id), "{miss_text}");
}

#[tokio::test]
async fn results_rejects_cross_origin_ids() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call("local_results", json!({"task_id": "T-cloud-0abc"}))
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");
}

#[tokio::test]
async fn malformed_task_id_is_validation() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call("local_results", json!({"task_id": "job-42"}))
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");
}

#[tokio::test]
async fn resume_by_thread_id() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (first, _) = fx
        .call("local_run", json!({"task": "step one", "mode": "read-only"}))
        .await;
    assert!(first.contains("thread_id: th-1"), "{first}");

    let (resumed, is_error) = fx
        .call(
            "local_resume",
            json!({"thread_id": "th-1", "task": "step two"}),
        )
        .await;
    assert!(!is_error, "{resumed}");
    assert!(resumed.contains("th-1"));
    let child = Fixture::extract_task_id(&resumed);
    let (wait_text, _) = fx
        .call("local_wait", json!({"task_id": child, "timeout_sec": 10}))
        .await;
    assert!(wait_text.contains("completed"));
}

#[tokio::test]
async fn resume_unknown_thread_is_not_found() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call(
            "local_resume",
            json!({"thread_id": "th-none", "task": "again"}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("not-found:"), "{text}");
}

#[tokio::test]
async fn status_summarizes_terminal_tasks() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, _) = fx
        .call("local_run", json!({"task": "say hello", "mode": "read-only"}))
        .await;
    let id = Fixture::extract_task_id(&text);

    let (status, _) = fx.call("local_status", json!({})).await;
    assert!(status.contains(&id));
    assert!(status.contains("[completed]"), "{status}");
}

// --- cloud primitives ---

#[tokio::test]
async fn cloud_submit_requires_environments_file() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call(
            "cloud_submit",
            json!({"task": "t", "environment_id": "staging", "confirm": true}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("config-missing:"), "{text}");
}

#[tokio::test]
async fn cloud_submit_unknown_environment_suggests() {
    let fx = Fixture::new(COMPLETING_AGENT);
    fx.write_environments();
    let (text, is_error) = fx
        .call(
            "cloud_submit",
            json!({"task": "t", "environment_id": "stagign", "confirm": true}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("not-found:"), "{text}");
    assert!(text.contains("staging"), "{text}");
}

#[tokio::test]
async fn cloud_submit_gates_mutation_confirmation() {
    let fx = Fixture::new(COMPLETING_AGENT);
    fx.write_environments();
    let (text, is_error) = fx
        .call(
            "cloud_submit",
            json!({"task": "t", "environment_id": "staging"}),
        )
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");
}

#[tokio::test]
async fn cloud_submit_to_completion() {
    let fx = Fixture::new(COMPLETING_AGENT);
    fx.write_environments();
    fx.client
        .script_statuses("remote-1", vec![RemoteStatus::completed("remote done")]);

    let (text, is_error) = fx
        .call(
            "cloud_submit",
            json!({"task": "run suite", "environment_id": "staging", "confirm": true}),
        )
        .await;
    assert!(!is_error, "{text}");
    let id = Fixture::extract_task_id(&text);
    assert!(id.starts_with("T-cloud-"));

    let (wait_text, _) = fx
        .call("cloud_wait", json!({"task_id": id, "timeout_sec": 10, "poll_interval_sec": 1}))
        .await;
    assert!(wait_text.contains("completed"), "{wait_text}");

    let (results, _) = fx.call("cloud_results", json!({"task_id": id})).await;
    assert!(results.contains("remote done"), "{results}");
}

#[tokio::test]
async fn cloud_cancel_documents_best_effort() {
    let fx = Fixture::new(COMPLETING_AGENT);
    fx.write_environments();
    fx.client
        .script_statuses("remote-1", vec![RemoteStatus::running()]);
    let (text, _) = fx
        .call(
            "cloud_submit",
            json!({"task": "t", "environment_id": "staging", "confirm": true}),
        )
        .await;
    let id = Fixture::extract_task_id(&text);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (cancel_text, is_error) = fx.call("cloud_cancel", json!({"task_id": id})).await;
    assert!(!is_error, "{cancel_text}");
    assert!(cancel_text.contains("best-effort"), "{cancel_text}");
}

#[tokio::test]
async fn cloud_list_environments_renders_table() {
    let fx = Fixture::new(COMPLETING_AGENT);
    fx.write_environments();
    let (text, is_error) = fx.call("cloud_list_environments", json!({})).await;
    assert!(!is_error);
    assert!(text.contains("staging"));
    assert!(text.contains("rust"));
}

#[tokio::test]
async fn github_setup_validates_repo_url() {
    let fx = Fixture::new(COMPLETING_AGENT);
    let (text, is_error) = fx
        .call("cloud_github_setup", json!({"repo_url": "not a url"}))
        .await;
    assert!(is_error);
    assert!(text.starts_with("validation:"), "{text}");

    let (guide, is_error) = fx
        .call(
            "cloud_github_setup",
            json!({"repo_url": "https://github.com/acme/api.git", "stack": "rust"}),
        )
        .await;
    assert!(!is_error);
    assert!(guide.contains("https://github.com/acme/api.git"));
    assert!(guide.contains("rust"));
    assert!(guide.contains("cloud_submit"));
}
