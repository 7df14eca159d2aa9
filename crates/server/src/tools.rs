// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fourteen primitives advertised over `tools/list`.
//!
//! Schemas are hand-written JSON Schema objects; every parameter name on
//! this surface is snake_case (tested), matching the registry and wire
//! DTOs.

use serde_json::{json, Value};

/// One advertised tool.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn mode_property() -> Value {
    json!({
        "type": "string",
        "enum": ["read-only", "workspace-write", "danger-full-access"],
        "description": "Agent sandbox level, applied verbatim"
    })
}

fn confirm_property() -> Value {
    json!({
        "type": "boolean",
        "description": "Required true for workspace-write and danger-full-access"
    })
}

fn task_property() -> Value {
    json!({
        "type": "string",
        "description": "Free-text instruction for the agent (max 32 KiB)"
    })
}

fn task_id_property(origin: &str) -> Value {
    json!({
        "type": "string",
        "pattern": format!("^T-{origin}-[a-z0-9]+$"),
        "description": format!("A {origin} task id")
    })
}

/// All fourteen tool definitions, in presentation order.
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "local_run",
            description: "Run an agent task locally and wait for the result (async=true to return immediately)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": task_property(),
                    "mode": mode_property(),
                    "model": {"type": "string"},
                    "working_dir": {"type": "string", "description": "Absolute directory the agent works in"},
                    "confirm": confirm_property(),
                    "async": {"type": "boolean", "description": "Return the task id without waiting"},
                    "timeout_sec": {"type": "integer", "minimum": 1, "description": "Synchronous wait bound (default 600)"}
                },
                "required": ["task", "mode"]
            }),
        },
        ToolDef {
            name: "local_exec",
            description: "Start an agent task locally in the background and return its id immediately",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": task_property(),
                    "mode": mode_property(),
                    "working_dir": {"type": "string"},
                    "model": {"type": "string"},
                    "confirm": confirm_property()
                },
                "required": ["task", "mode"]
            }),
        },
        ToolDef {
            name: "local_resume",
            description: "Continue a previous agent thread with a new task, preserving its context",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "thread_id": {"type": "string", "description": "Agent thread from an earlier task"},
                    "task": task_property(),
                    "mode": mode_property(),
                    "confirm": confirm_property()
                },
                "required": ["thread_id", "task"]
            }),
        },
        ToolDef {
            name: "local_status",
            description: "List local tasks and their live status",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "working_dir": {"type": "string", "description": "Only tasks running in this directory"}
                }
            }),
        },
        ToolDef {
            name: "local_results",
            description: "Fetch the full result of a finished local task",
            input_schema: json!({
                "type": "object",
                "properties": {"task_id": task_id_property("local")},
                "required": ["task_id"]
            }),
        },
        ToolDef {
            name: "local_wait",
            description: "Block until a local task finishes or the timeout elapses",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_id": task_id_property("local"),
                    "timeout_sec": {"type": "integer", "minimum": 1},
                    "poll_interval_sec": {"type": "integer", "minimum": 1, "description": "Registry poll cadence (default 2)"}
                },
                "required": ["task_id", "timeout_sec"]
            }),
        },
        ToolDef {
            name: "local_cancel",
            description: "Cancel a running local task (SIGTERM, then SIGKILL after 5s)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_id": task_id_property("local"),
                    "reason": {"type": "string"}
                },
                "required": ["task_id"]
            }),
        },
        ToolDef {
            name: "cloud_submit",
            description: "Submit an agent task to the hosted service in a configured environment",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": task_property(),
                    "environment_id": {"type": "string", "description": "Key in the environments file"},
                    "mode": mode_property(),
                    "model": {"type": "string"},
                    "confirm": confirm_property()
                },
                "required": ["task", "environment_id"]
            }),
        },
        ToolDef {
            name: "cloud_status",
            description: "List cloud tasks and their mirrored remote status",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "cloud_results",
            description: "Fetch the result of a finished cloud task",
            input_schema: json!({
                "type": "object",
                "properties": {"task_id": task_id_property("cloud")},
                "required": ["task_id"]
            }),
        },
        ToolDef {
            name: "cloud_wait",
            description: "Block until a cloud task settles or the timeout elapses",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_id": task_id_property("cloud"),
                    "timeout_sec": {"type": "integer", "minimum": 1},
                    "poll_interval_sec": {"type": "integer", "minimum": 1}
                },
                "required": ["task_id", "timeout_sec"]
            }),
        },
        ToolDef {
            name: "cloud_cancel",
            description: "Cancel a cloud task locally and request remote cancellation (best-effort)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task_id": task_id_property("cloud"),
                    "reason": {"type": "string"}
                },
                "required": ["task_id"]
            }),
        },
        ToolDef {
            name: "cloud_list_environments",
            description: "List the user-configured cloud environments",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "cloud_github_setup",
            description: "Step-by-step guide for connecting a GitHub repository to the hosted service",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "repo_url": {"type": "string", "description": "Repository to connect"},
                    "stack": {"type": "string", "description": "Project stack hint (rust, node, python, ...)"}
                },
                "required": ["repo_url"]
            }),
        },
    ]
}

/// `tools/list` payload.
pub fn list_tools_result() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "inputSchema": t.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
