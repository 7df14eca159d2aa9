// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed view of the agent CLI's JSONL event stream.
//!
//! The agent emits one JSON object per line. Decoding is tolerant by
//! design: recognized shapes become typed variants, everything else is
//! carried through as [`AgentEvent::Unknown`] so downstream consumers see
//! the full stream in source order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting reported on `turn.completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    /// Accumulate another turn's usage into this one.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.cached_input_tokens += other.cached_input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Work-item categories the agent reports under `data.type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    FileChange,
    CommandExecution,
    AgentMessage,
    Reasoning,
    /// Unrecognized item type, preserved verbatim.
    Other(String),
}

impl ItemKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "file_change" => ItemKind::FileChange,
            "command_execution" => ItemKind::CommandExecution,
            "agent_message" => ItemKind::AgentMessage,
            "reasoning" => ItemKind::Reasoning,
            other => ItemKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::FileChange => "file_change",
            ItemKind::CommandExecution => "command_execution",
            ItemKind::AgentMessage => "agent_message",
            ItemKind::Reasoning => "reasoning",
            ItemKind::Other(tag) => tag,
        }
    }
}

/// One work item as carried by `item.started` / `item.updated` /
/// `item.completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPayload {
    pub id: String,
    pub kind: ItemKind,
    /// Best-effort human-readable description of the item.
    pub description: String,
    /// Paths touched by a `file_change` item.
    pub paths: Vec<String>,
    /// Command line of a `command_execution` item.
    pub command: Option<String>,
}

/// Typed agent stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    ThreadStarted { thread_id: String },
    TurnStarted,
    TurnCompleted { usage: Option<Usage> },
    TurnFailed { error: String },
    ItemStarted { item: ItemPayload },
    ItemUpdated { item: ItemPayload },
    ItemCompleted { item: ItemPayload },
    /// Anything with an unrecognized `type` tag. Never dropped.
    Unknown { kind: String },
}

/// A decoded stream element: the typed event plus the raw line value for
/// archival in task results.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub event: AgentEvent,
    pub raw: Value,
}

impl AgentEvent {
    /// Decode a single stream object.
    ///
    /// Field extraction probes both `data.*` and top-level keys since the
    /// agent has shipped both layouts. Missing fields degrade to empty
    /// strings rather than failing the line.
    pub fn from_value(value: &Value) -> AgentEvent {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "thread.started" => AgentEvent::ThreadStarted {
                thread_id: probe_str(value, "thread_id").unwrap_or_default(),
            },
            "turn.started" => AgentEvent::TurnStarted,
            "turn.completed" => AgentEvent::TurnCompleted {
                usage: probe(value, "usage").and_then(|u| serde_json::from_value(u.clone()).ok()),
            },
            "turn.failed" => AgentEvent::TurnFailed {
                error: extract_error(value),
            },
            "item.started" => AgentEvent::ItemStarted {
                item: extract_item(value),
            },
            "item.updated" => AgentEvent::ItemUpdated {
                item: extract_item(value),
            },
            "item.completed" => AgentEvent::ItemCompleted {
                item: extract_item(value),
            },
            other => AgentEvent::Unknown {
                kind: other.to_string(),
            },
        }
    }

    /// The item carried by this event, if it is an item event.
    pub fn item(&self) -> Option<&ItemPayload> {
        match self {
            AgentEvent::ItemStarted { item }
            | AgentEvent::ItemUpdated { item }
            | AgentEvent::ItemCompleted { item } => Some(item),
            _ => None,
        }
    }
}

/// Look up `data.<key>` first, then a top-level `<key>`.
fn probe<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .get("data")
        .and_then(|d| d.get(key))
        .or_else(|| value.get(key))
}

fn probe_str(value: &Value, key: &str) -> Option<String> {
    probe(value, key).and_then(Value::as_str).map(str::to_string)
}

fn extract_error(value: &Value) -> String {
    // error may be a bare string or an object with a message
    match probe(value, "error") {
        Some(Value::String(s)) => s.clone(),
        Some(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| obj.to_string()),
        None => "turn failed".to_string(),
    }
}

fn extract_item(value: &Value) -> ItemPayload {
    let data = value.get("data").or_else(|| value.get("item"));

    let get_str = |key: &str| -> Option<String> {
        data.and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let kind = ItemKind::from_tag(&get_str("type").unwrap_or_default());
    let command = get_str("command");

    let mut paths = Vec::new();
    if let Some(path) = get_str("path") {
        paths.push(path);
    }
    if let Some(changes) = data.and_then(|d| d.get("changes")).and_then(Value::as_array) {
        for change in changes {
            if let Some(p) = change.get("path").and_then(Value::as_str) {
                paths.push(p.to_string());
            }
        }
    }

    let description = get_str("description")
        .or_else(|| get_str("text"))
        .or_else(|| command.clone())
        .or_else(|| (!paths.is_empty()).then(|| paths.join(", ")))
        .unwrap_or_default();

    ItemPayload {
        id: get_str("id").unwrap_or_default(),
        kind,
        description,
        paths,
        command,
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
