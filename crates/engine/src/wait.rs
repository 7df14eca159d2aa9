// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking wait on a task reaching a terminal state.
//!
//! Pure observer: polls the registry and never mutates the task, even on
//! timeout.

use crate::SharedRegistry;
use cdx_core::{Clock, Task, TaskId};
use std::time::Duration;
use thiserror::Error;

/// Default registry poll cadence for `wait`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} still {status} after {timeout_sec}s")]
    Timeout {
        id: TaskId,
        status: String,
        timeout_sec: u64,
    },
}

/// Poll until the task is terminal or the timeout elapses.
pub async fn wait_for_terminal<C: Clock>(
    registry: &SharedRegistry<C>,
    id: &TaskId,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Task, WaitError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let poll_interval = poll_interval.max(Duration::from_millis(10));
    loop {
        let task = registry
            .lock()
            .get(id)
            .ok_or_else(|| WaitError::NotFound(id.clone()))?;
        if task.is_terminal() {
            return Ok(task);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(WaitError::Timeout {
                id: id.clone(),
                status: task.status.to_string(),
                timeout_sec: timeout.as_secs(),
            });
        }
        let remaining = deadline - tokio::time::Instant::now();
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
