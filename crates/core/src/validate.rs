// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized precondition checks for primitive arguments.
//!
//! Validation failures surface immediately at the dispatch boundary; no
//! task record is created for a rejected call.

use crate::task::{InvalidTaskId, SandboxMode, TaskId};
use std::path::{Component, Path};
use thiserror::Error;

/// Upper bound on the instruction text, in bytes.
pub const MAX_INSTRUCTION_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("task must not be empty")]
    EmptyInstruction,

    #[error("task is {len} bytes, max {MAX_INSTRUCTION_BYTES}")]
    InstructionTooLong { len: usize },

    #[error("unknown mode: {0:?} (expected read-only, workspace-write, or danger-full-access)")]
    UnknownMode(String),

    #[error("mode {mode} mutates the workspace; pass confirm=true to proceed")]
    ConfirmRequired { mode: SandboxMode },

    #[error("working_dir must be an absolute path: {0}")]
    WorkingDirNotAbsolute(String),

    #[error("working_dir must not contain parent traversal: {0}")]
    WorkingDirTraversal(String),

    #[error("working_dir does not resolve to a directory: {0}")]
    WorkingDirMissing(String),

    #[error(transparent)]
    TaskId(#[from] InvalidTaskId),
}

/// Check the free-text instruction: non-empty, bounded.
pub fn instruction(text: &str) -> Result<(), ValidateError> {
    if text.trim().is_empty() {
        return Err(ValidateError::EmptyInstruction);
    }
    if text.len() > MAX_INSTRUCTION_BYTES {
        return Err(ValidateError::InstructionTooLong { len: text.len() });
    }
    Ok(())
}

/// Parse a sandbox mode string.
pub fn mode(s: &str) -> Result<SandboxMode, ValidateError> {
    SandboxMode::parse(s).ok_or_else(|| ValidateError::UnknownMode(s.to_string()))
}

/// Mutating modes require the explicit confirmation flag.
pub fn confirmation(mode: SandboxMode, confirm: bool) -> Result<(), ValidateError> {
    if mode.requires_confirmation() && !confirm {
        return Err(ValidateError::ConfirmRequired { mode });
    }
    Ok(())
}

/// A working directory must be absolute, traversal-free, and resolve to an
/// existing directory.
pub fn working_dir(path: &Path) -> Result<(), ValidateError> {
    let display = path.display().to_string();
    if !path.is_absolute() {
        return Err(ValidateError::WorkingDirNotAbsolute(display));
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ValidateError::WorkingDirTraversal(display));
    }
    if !path.is_dir() {
        return Err(ValidateError::WorkingDirMissing(display));
    }
    Ok(())
}

/// Parse a caller-supplied task id against the canonical pattern.
pub fn task_id(s: &str) -> Result<TaskId, ValidateError> {
    Ok(TaskId::parse(s)?)
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
