// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identity, status state machine, and the task record itself.

use crate::event::Usage;
use crate::id::IdGen;
use crate::progress::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// The agent's own conversational session identifier. Resuming a task
    /// re-uses the thread so the agent keeps its context.
    #[derive(Default)]
    pub struct ThreadId;
}

crate::define_id! {
    /// Reference into the user-configured cloud environments file.
    #[derive(Default)]
    pub struct EnvironmentId;
}

/// Which executor owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOrigin {
    Local,
    Cloud,
}

impl TaskOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOrigin::Local => "local",
            TaskOrigin::Cloud => "cloud",
        }
    }
}

impl fmt::Display for TaskOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent sandbox permission level. Values map verbatim onto the agent
/// CLI's sandbox flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxMode {
    #[serde(rename = "read-only")]
    ReadOnly,
    #[serde(rename = "workspace-write")]
    WorkspaceWrite,
    #[serde(rename = "danger-full-access")]
    DangerFullAccess,
}

impl SandboxMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read-only" => Some(SandboxMode::ReadOnly),
            "workspace-write" => Some(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Some(SandboxMode::DangerFullAccess),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }

    /// Mutating modes require an explicit confirmation flag before a task
    /// is created.
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, SandboxMode::ReadOnly)
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status.
///
/// ```text
/// pending --admit--> working --complete--> completed
///    |                  | --fail--> failed
///    |                  | --cancel--> canceled
///    +--reject/cancel--> failed | canceled
/// ```
///
/// Terminal states are absorbing; [`TaskStatus::can_transition`] is the
/// single authority and the registry enforces it on every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    /// Whether `from → to` is a legal move in the state machine.
    /// Self-transitions are not moves; callers treat them as no-ops.
    pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, Working)
                | (Pending, Failed)
                | (Pending, Canceled)
                | (Working, Completed)
                | (Working, Failed)
                | (Working, Canceled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Working => "working",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a string that is not a well-formed task id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task id: {0:?}")]
pub struct InvalidTaskId(pub String);

/// Opaque task identifier: `T-<origin>-<suffix>` where the suffix is a
/// fixed-width hex millisecond stamp plus a random tail, so ids sort by
/// creation order within one origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Mint a fresh id for the given origin.
    pub fn generate<G: IdGen>(origin: TaskOrigin, idgen: &G) -> Self {
        Self(format!("T-{}-{}", origin.as_str(), idgen.next()))
    }

    /// Parse and validate a caller-supplied id.
    pub fn parse(s: &str) -> Result<Self, InvalidTaskId> {
        let suffix = s
            .strip_prefix("T-local-")
            .or_else(|| s.strip_prefix("T-cloud-"))
            .ok_or_else(|| InvalidTaskId(s.to_string()))?;
        if suffix.is_empty()
            || !suffix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(InvalidTaskId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn origin(&self) -> TaskOrigin {
        if self.0.starts_with("T-cloud-") {
            TaskOrigin::Cloud
        } else {
            TaskOrigin::Local
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a string slice truncated to at most `n` characters.
    pub fn short(&self, n: usize) -> &str {
        if self.0.len() <= n {
            &self.0
        } else {
            &self.0[..n]
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Outcome of a finished local task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Raw agent events in source order, redacted.
    pub events: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Outcome of a finished cloud task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_url: Option<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<String>>,
}

/// Terminal task outcome, shaped by origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    Local(LocalResult),
    Cloud(CloudResult),
}

impl TaskResult {
    pub fn success(&self) -> bool {
        match self {
            TaskResult::Local(r) => r.success,
            TaskResult::Cloud(r) => r.success,
        }
    }
}

/// The central record: one orchestrated unit of agent work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub origin: TaskOrigin,
    pub status: TaskStatus,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    pub mode: SandboxMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Epoch milliseconds.
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<EnvironmentId>,
    /// Cloud only: the hosted service's own id for this task, kept so
    /// polling can resume across restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_snapshot: Option<ProgressSnapshot>,
}

impl Task {
    /// A fresh pending task. Optional attributes start empty and are
    /// filled in by the owning executor.
    pub fn new(
        id: TaskId,
        origin: TaskOrigin,
        instruction: impl Into<String>,
        mode: SandboxMode,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            origin,
            status: TaskStatus::Pending,
            instruction: instruction.into(),
            working_dir: None,
            mode,
            model: None,
            created_at,
            updated_at: created_at,
            completed_at: None,
            thread_id: None,
            environment_id: None,
            remote_id: None,
            result: None,
            error: None,
            progress_snapshot: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Field-wise merge applied by the registry's `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub error: Option<String>,
    pub result: Option<TaskResult>,
    pub progress: Option<ProgressSnapshot>,
    pub thread_id: Option<ThreadId>,
    pub remote_id: Option<String>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_result(mut self, result: TaskResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSnapshot) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_thread_id(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
