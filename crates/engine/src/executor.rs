// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local executor: turns a primitive invocation into a background task
//! driving an agent subprocess.
//!
//! The caller gets the pending task back immediately; a spawned loop owns
//! the rest of the lifecycle. The registry is the only shared state, so
//! observers (status/wait/results) just read it.

use crate::admission::Governor;
use crate::SharedRegistry;
use cdx_adapters::{process, AgentInvocation, SpawnConfig, CANCEL_GRACE};
use cdx_core::{
    infer_progress, redact, redact_value, AgentEvent, Clock, IdGen, ItemKind, LocalResult,
    SandboxMode, Task, TaskId, TaskOrigin, TaskPatch, TaskResult, TaskStatus, ThreadId, Usage,
};
use cdx_storage::RegistryError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Persist the live progress snapshot after this many buffered events...
pub(crate) const PERSIST_EVERY_EVENTS: usize = 16;
/// ...or after this much time, whichever comes first.
pub(crate) const PERSIST_INTERVAL: Duration = Duration::from_millis(500);

/// Request for a new local task, already validated by the dispatch layer.
#[derive(Debug, Clone)]
pub struct LocalTaskSpec {
    pub instruction: String,
    pub mode: SandboxMode,
    pub working_dir: Option<PathBuf>,
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} has no agent thread to resume")]
    NoThread(TaskId),
}

type CancelMap = Arc<Mutex<HashMap<TaskId, watch::Sender<Option<String>>>>>;

/// Spawns and supervises local agent tasks.
pub struct LocalExecutor<C: Clock, G: IdGen> {
    registry: SharedRegistry<C>,
    governor: Governor,
    clock: C,
    idgen: G,
    program: String,
    cancels: CancelMap,
}

impl<C: Clock, G: IdGen> Clone for LocalExecutor<C, G> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            governor: self.governor.clone(),
            clock: self.clock.clone(),
            idgen: self.idgen.clone(),
            program: self.program.clone(),
            cancels: Arc::clone(&self.cancels),
        }
    }
}

impl<C: Clock, G: IdGen + 'static> LocalExecutor<C, G> {
    pub fn new(registry: SharedRegistry<C>, governor: Governor, clock: C, idgen: G) -> Self {
        Self {
            registry,
            governor,
            clock,
            idgen,
            program: cdx_adapters::agent_program(),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Override the agent executable (tests substitute a stub).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Create a task and start it in the background. Returns the pending
    /// task record without waiting for any agent output.
    pub fn start(&self, spec: LocalTaskSpec) -> Result<Task, ExecError> {
        self.launch(spec, None)
    }

    /// Start a task on an existing agent thread. The new task inherits
    /// the parent's working directory and, when unspecified, its mode and
    /// model.
    pub fn resume(
        &self,
        parent_id: &TaskId,
        instruction: String,
        mode: Option<SandboxMode>,
    ) -> Result<Task, ExecError> {
        let parent = self
            .registry
            .lock()
            .get(parent_id)
            .ok_or_else(|| ExecError::NotFound(parent_id.clone()))?;
        let thread_id = parent
            .thread_id
            .clone()
            .ok_or_else(|| ExecError::NoThread(parent_id.clone()))?;
        let spec = LocalTaskSpec {
            instruction,
            mode: mode.unwrap_or(parent.mode),
            working_dir: parent.working_dir.clone(),
            model: parent.model.clone(),
        };
        self.launch(spec, Some(thread_id))
    }

    /// Request cancellation. Returns whether a live task loop was
    /// signaled; registry-level checks (not-found, already-terminal) are
    /// the dispatch layer's job.
    pub fn cancel(&self, id: &TaskId, reason: Option<String>) -> bool {
        let cancels = self.cancels.lock();
        match cancels.get(id) {
            Some(tx) => tx.send(Some(reason.unwrap_or_else(|| "canceled by caller".into()))).is_ok(),
            None => false,
        }
    }

    fn launch(&self, spec: LocalTaskSpec, resume: Option<ThreadId>) -> Result<Task, ExecError> {
        let id = TaskId::generate(TaskOrigin::Local, &self.idgen);
        let now = self.clock.epoch_ms();
        let mut task = Task::new(
            id.clone(),
            TaskOrigin::Local,
            spec.instruction.clone(),
            spec.mode,
            now,
        );
        task.working_dir = spec.working_dir.clone();
        task.model = spec.model.clone();
        task.thread_id = resume.clone();
        self.registry.lock().create(task.clone())?;

        let (cancel_tx, cancel_rx) = watch::channel(None);
        self.cancels.lock().insert(id.clone(), cancel_tx);

        let executor = self.clone();
        let run = task.clone();
        tokio::spawn(async move {
            executor.run_task(run, resume, cancel_rx).await;
        });
        info!(task_id = %id, mode = %spec.mode, "local task created");
        Ok(task)
    }

    /// The background lifecycle loop for one task.
    async fn run_task(
        &self,
        task: Task,
        resume: Option<ThreadId>,
        mut cancel_rx: watch::Receiver<Option<String>>,
    ) {
        let id = task.id.clone();

        let permit = match self.governor.admit().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finish_failed(&id, "admission queue closed".into());
                return;
            }
        };

        // Canceled while still queued: no process to stop.
        let queued_cancel = cancel_rx.borrow().clone();
        if let Some(reason) = queued_cancel {
            self.finish(
                &id,
                TaskPatch::status(TaskStatus::Canceled).with_error(redact(&reason).into_owned()),
            );
            drop(permit);
            return;
        }

        let mut invocation =
            AgentInvocation::new(task.instruction.clone(), task.mode).with_model(task.model.clone());
        if let Some(thread_id) = resume {
            invocation = invocation.with_resume(thread_id);
        }
        let config = SpawnConfig {
            argv: invocation.to_argv(&self.program),
            cwd: task.working_dir.clone(),
            env: Vec::new(),
        };

        let mut handle = match process::spawn(config) {
            Ok(handle) => handle,
            Err(e) => {
                // The OS error is surfaced in the task record, redacted.
                self.finish_failed(&id, redact(&e.to_string()).into_owned());
                drop(permit);
                return;
            }
        };
        self.apply(&id, TaskPatch::status(TaskStatus::Working));

        let Some(mut events_rx) = handle.take_events() else {
            self.finish_failed(&id, "agent stdout unavailable".into());
            drop(permit);
            return;
        };

        let mut events: Vec<AgentEvent> = Vec::new();
        let mut raw_events: Vec<serde_json::Value> = Vec::new();
        let mut usage: Option<Usage> = None;
        let mut thread_id: Option<ThreadId> = None;
        let mut cancel_reason: Option<String> = None;
        let mut since_persist = 0usize;
        let mut last_persist = self.clock.now();

        loop {
            tokio::select! {
                received = events_rx.recv() => {
                    let Some(parsed) = received else { break };
                    match &parsed.event {
                        AgentEvent::ThreadStarted { thread_id: tid } if thread_id.is_none() => {
                            let tid = ThreadId::new(tid.clone());
                            thread_id = Some(tid.clone());
                            // Persist early so resume works mid-run.
                            self.apply(&id, TaskPatch::default().with_thread_id(tid));
                        }
                        AgentEvent::TurnCompleted { usage: Some(turn_usage) } => {
                            usage.get_or_insert_with(Usage::default).add(turn_usage);
                        }
                        _ => {}
                    }
                    events.push(parsed.event);
                    raw_events.push(parsed.raw);

                    since_persist += 1;
                    let elapsed = self.clock.now().duration_since(last_persist);
                    if since_persist >= PERSIST_EVERY_EVENTS || elapsed >= PERSIST_INTERVAL {
                        self.apply(&id, TaskPatch::default().with_progress(infer_progress(&events)));
                        since_persist = 0;
                        last_persist = self.clock.now();
                    }
                }
                changed = cancel_rx.changed(), if cancel_reason.is_none() => {
                    if changed.is_err() {
                        continue;
                    }
                    let Some(reason) = cancel_rx.borrow_and_update().clone() else { continue };
                    info!(task_id = %id, "cancel requested, stopping agent");
                    cancel_reason = Some(reason);
                    if let Err(e) = handle.cancel(CANCEL_GRACE).await {
                        warn!(task_id = %id, error = %e, "process cancel failed");
                    }
                    // Keep draining: the stream closes once the process dies.
                }
            }
        }

        let exit = match handle.wait().await {
            Ok(exit) => exit,
            Err(e) => {
                self.finish_failed(&id, redact(&format!("wait failed: {e}")).into_owned());
                drop(permit);
                return;
            }
        };
        if handle.invalid_lines() > 0 {
            debug!(task_id = %id, skipped = handle.invalid_lines(), "agent emitted undecodable lines");
        }

        let progress = infer_progress(&events);
        let agent_failed = progress.has_failed;
        let canceled = cancel_reason.is_some();
        let success = !canceled && exit.success() && !agent_failed;

        let stdout: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ItemCompleted { item } if item.kind == ItemKind::AgentMessage => {
                    Some(item.description.as_str())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        for value in &mut raw_events {
            redact_value(value);
        }
        let result = TaskResult::Local(LocalResult {
            success,
            exit_code: exit.exit_code,
            signal: exit.signal,
            stdout: redact(&stdout).into_owned(),
            stderr: handle.stderr_redacted(),
            events: raw_events,
            thread_id: thread_id.clone(),
            usage,
        });

        let status = if canceled {
            TaskStatus::Canceled
        } else if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let mut patch = TaskPatch::status(status)
            .with_result(result)
            .with_progress(progress);
        if let Some(reason) = cancel_reason {
            patch = patch.with_error(redact(&reason).into_owned());
        } else if !success {
            let cause = events
                .iter()
                .find_map(|e| match e {
                    AgentEvent::TurnFailed { error } => Some(error.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| match (exit.exit_code, exit.signal) {
                    (Some(code), _) => format!("agent exited with code {code}"),
                    (None, Some(signal)) => format!("agent terminated by signal {signal}"),
                    (None, None) => "agent exited abnormally".to_string(),
                });
            patch = patch.with_error(redact(&cause).into_owned());
        }
        self.finish(&id, patch);
        drop(permit);
    }

    /// Apply a non-terminal patch, logging instead of propagating: the
    /// loop must keep driving the process even if a persist fails.
    fn apply(&self, id: &TaskId, patch: TaskPatch) {
        if let Err(e) = self.registry.lock().update(id, patch) {
            warn!(task_id = %id, error = %e, "registry update failed");
        }
    }

    fn finish_failed(&self, id: &TaskId, cause: String) {
        self.finish(id, TaskPatch::status(TaskStatus::Failed).with_error(cause));
    }

    /// Terminal update plus cancel-handle cleanup.
    fn finish(&self, id: &TaskId, patch: TaskPatch) {
        let status = patch.status;
        if let Err(e) = self.registry.lock().update(id, patch) {
            error!(task_id = %id, error = %e, "terminal registry update failed");
        } else if let Some(status) = status {
            info!(task_id = %id, status = %status, "local task finished");
        }
        self.cancels.lock().remove(id);
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
