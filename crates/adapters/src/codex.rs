// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent CLI invocation: argv assembly for the `codex` executable.

use cdx_core::{SandboxMode, ThreadId};

/// One agent run, ready to be turned into argv.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInvocation {
    pub instruction: String,
    pub mode: SandboxMode,
    pub model: Option<String>,
    /// Resume an existing agent thread instead of opening a new one.
    pub resume_thread: Option<ThreadId>,
}

impl AgentInvocation {
    pub fn new(instruction: impl Into<String>, mode: SandboxMode) -> Self {
        Self {
            instruction: instruction.into(),
            mode,
            model: None,
            resume_thread: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_resume(mut self, thread_id: ThreadId) -> Self {
        self.resume_thread = Some(thread_id);
        self
    }

    /// Build the full argv: executable, `exec` subcommand, JSON event
    /// output, the sandbox flag carrying the task's mode verbatim, and the
    /// task text as the final positional argument. stdin stays
    /// disconnected; everything flows through the JSONL stdout stream.
    pub fn to_argv(&self, program: &str) -> Vec<String> {
        let mut argv = vec![program.to_string(), "exec".to_string()];
        if let Some(thread_id) = &self.resume_thread {
            argv.push("resume".to_string());
            argv.push(thread_id.to_string());
        }
        argv.push("--json".to_string());
        argv.push("--sandbox".to_string());
        argv.push(self.mode.as_str().to_string());
        if let Some(model) = &self.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        argv.push(self.instruction.clone());
        argv
    }
}

/// Extract the binary basename from a program path for log lines.
///
/// Handles absolute paths (`/usr/local/bin/codex` -> `codex`), relative
/// paths (`./codex` -> `codex`), and plain names. Falls back to `codex`
/// for empty strings.
pub fn extract_program_name(program: &str) -> String {
    program
        .split_whitespace()
        .next()
        .and_then(|first| first.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("codex")
        .to_string()
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
