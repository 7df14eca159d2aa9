//! Shared fixture for the behavioral specs.

#![allow(dead_code)]

use cdx_adapters::FakeCloudClient;
use cdx_core::{SequentialIdGen, SystemClock};
use cdx_engine::{CloudExecutor, Governor, LocalExecutor, PollConfig, SharedRegistry};
use cdx_server::rpc::RpcRequest;
use cdx_server::Dispatcher;
use cdx_storage::TaskRegistry;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A stub agent that completes one turn with a friendly message.
pub const COMPLETING_AGENT: &str = r#"
printf '{"type":"thread.started","thread_id":"th-spec"}\n'
printf '{"type":"turn.started"}\n'
printf '{"type":"item.started","data":{"id":"m1","type":"agent_message","text":"hello"}}\n'
printf '{"type":"item.completed","data":{"id":"m1","type":"agent_message","text":"hello"}}\n'
printf '{"type":"turn.completed","usage":{"input_tokens":3,"output_tokens":2}}\n'
"#;

/// A stub agent that never finishes on its own.
pub const HANGING_AGENT: &str = "sleep 30";

pub struct World {
    pub dir: TempDir,
    pub registry: SharedRegistry<SystemClock>,
    pub client: FakeCloudClient,
    pub dispatcher: Dispatcher<SystemClock, SequentialIdGen, FakeCloudClient>,
}

impl World {
    pub fn with_agent(agent_body: &str) -> Self {
        Self::build(agent_body, Governor::new(2))
    }

    pub fn with_agent_and_governor(agent_body: &str, governor: Governor) -> Self {
        Self::build(agent_body, governor)
    }

    fn build(agent_body: &str, governor: Governor) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fake-codex");
        std::fs::write(&program, format!("#!/bin/sh\n{agent_body}\n")).unwrap();
        let mut perms = std::fs::metadata(&program).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&program, perms).unwrap();

        let registry: SharedRegistry<SystemClock> = Arc::new(Mutex::new(
            TaskRegistry::open(dir.path().join("tasks.json"), SystemClock).unwrap(),
        ));
        let client = FakeCloudClient::new();
        let local = LocalExecutor::new(
            Arc::clone(&registry),
            governor.clone(),
            SystemClock,
            SequentialIdGen::new("s"),
        )
        .with_program(program.display().to_string());
        let cloud = CloudExecutor::new(
            Arc::clone(&registry),
            governor,
            SystemClock,
            SequentialIdGen::new("s"),
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

    /// Invoke a tool; returns (text, is_error).
    pub async fn call(&self, name: &str, args: Value) -> (String, bool) {
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

    pub fn task_id_in(text: &str) -> String {
        text.split_whitespace()
            .find(|w| w.starts_with("T-"))
            .unwrap_or_else(|| panic!("no task id in {text:?}"))
            .trim_end_matches(['.', ',', ':'])
            .to_string()
    }
}
