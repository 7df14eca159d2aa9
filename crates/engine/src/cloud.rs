// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud executor: submit tasks to the hosted agent service and mirror
//! remote state into the registry.
//!
//! Admission shares the same governor as local tasks. After submission a
//! polling loop follows the remote task with exponential backoff; the
//! registry stays authoritative for our view, so cancellation is a local
//! invariant with a best-effort remote cancel attached.

use crate::admission::Governor;
use crate::executor::ExecError;
use crate::SharedRegistry;
use cdx_adapters::{CloudClient, CloudError, CloudSubmit, RemotePhase, RemoteStatus};
use cdx_core::{
    redact, Clock, CloudResult, EnvironmentId, IdGen, SandboxMode, Task, TaskId, TaskOrigin,
    TaskPatch, TaskResult, TaskStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Attempts for a failing submit or poll before the task fails.
pub(crate) const REMOTE_RETRIES: u32 = 3;

/// Poll cadence: exponential backoff between these bounds.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(30),
        }
    }
}

impl PollConfig {
    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Request for a new cloud task, already validated by the dispatch layer.
#[derive(Debug, Clone)]
pub struct CloudTaskSpec {
    pub instruction: String,
    pub environment_id: EnvironmentId,
    /// The sandbox level the remote run is entitled to; the same
    /// confirmation gate as local tasks applies before submission.
    pub mode: SandboxMode,
    pub model: Option<String>,
}

type CancelMap = Arc<Mutex<HashMap<TaskId, watch::Sender<Option<String>>>>>;

/// Submits and supervises cloud tasks.
pub struct CloudExecutor<C: Clock, G: IdGen, CC: CloudClient> {
    registry: SharedRegistry<C>,
    governor: Governor,
    clock: C,
    idgen: G,
    client: CC,
    poll: PollConfig,
    cancels: CancelMap,
}

impl<C: Clock, G: IdGen, CC: CloudClient> Clone for CloudExecutor<C, G, CC> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            governor: self.governor.clone(),
            clock: self.clock.clone(),
            idgen: self.idgen.clone(),
            client: self.client.clone(),
            poll: self.poll,
            cancels: Arc::clone(&self.cancels),
        }
    }
}

impl<C: Clock, G: IdGen + 'static, CC: CloudClient> CloudExecutor<C, G, CC> {
    pub fn new(
        registry: SharedRegistry<C>,
        governor: Governor,
        clock: C,
        idgen: G,
        client: CC,
    ) -> Self {
        Self {
            registry,
            governor,
            clock,
            idgen,
            client,
            poll: PollConfig::default(),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Override the poll cadence (tests use millisecond backoff).
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Create a task and submit it in the background. Returns the pending
    /// task record immediately.
    pub fn submit(&self, spec: CloudTaskSpec) -> Result<Task, ExecError> {
        let id = TaskId::generate(TaskOrigin::Cloud, &self.idgen);
        let now = self.clock.epoch_ms();
        let mut task = Task::new(
            id.clone(),
            TaskOrigin::Cloud,
            spec.instruction.clone(),
            spec.mode,
            now,
        );
        task.environment_id = Some(spec.environment_id.clone());
        task.model = spec.model.clone();
        self.registry.lock().create(task.clone())?;

        let cancel_rx = self.register_cancel(&id);
        let executor = self.clone();
        let run = task.clone();
        tokio::spawn(async move {
            executor.run_submission(run, spec, cancel_rx).await;
        });
        info!(task_id = %id, "cloud task created");
        Ok(task)
    }

    /// Re-attach a polling loop to a cloud task that survived a restart
    /// in a non-terminal state with a known remote id.
    pub fn resume_polling(&self, id: &TaskId) -> Result<(), ExecError> {
        let task = self
            .registry
            .lock()
            .get(id)
            .ok_or_else(|| ExecError::NotFound(id.clone()))?;
        let Some(remote_id) = task.remote_id.clone() else {
            return Err(ExecError::NotFound(id.clone()));
        };
        let cancel_rx = self.register_cancel(id);
        let executor = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let permit = executor.governor.admit().await.ok();
            executor
                .poll_until_terminal(&id, &remote_id, None, cancel_rx)
                .await;
            drop(permit);
            executor.cancels.lock().remove(&id);
        });
        Ok(())
    }

    /// Request cancellation: flags the supervising loop, which issues the
    /// best-effort remote cancel and settles the local record.
    pub fn cancel(&self, id: &TaskId, reason: Option<String>) -> bool {
        let cancels = self.cancels.lock();
        match cancels.get(id) {
            Some(tx) => tx
                .send(Some(reason.unwrap_or_else(|| "canceled by caller".into())))
                .is_ok(),
            None => false,
        }
    }

    fn register_cancel(&self, id: &TaskId) -> watch::Receiver<Option<String>> {
        let (tx, rx) = watch::channel(None);
        self.cancels.lock().insert(id.clone(), tx);
        rx
    }

    async fn run_submission(
        &self,
        task: Task,
        spec: CloudTaskSpec,
        mut cancel_rx: watch::Receiver<Option<String>>,
    ) {
        let id = task.id.clone();

        let permit = match self.governor.admit().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finish(
                    &id,
                    TaskPatch::status(TaskStatus::Failed).with_error("admission queue closed"),
                );
                return;
            }
        };

        let queued_cancel = cancel_rx.borrow().clone();
        if let Some(reason) = queued_cancel {
            self.finish(
                &id,
                TaskPatch::status(TaskStatus::Canceled).with_error(redact(&reason).into_owned()),
            );
            drop(permit);
            return;
        }

        let request = CloudSubmit {
            instruction: spec.instruction,
            environment_id: spec.environment_id,
            model: spec.model,
        };
        let remote = match self.submit_with_retries(&id, &request).await {
            Some(remote) => remote,
            None => {
                drop(permit);
                return;
            }
        };

        let patch =
            TaskPatch::status(TaskStatus::Working).with_remote_id(remote.remote_id.clone());
        if let Err(e) = self.registry.lock().update(&id, patch) {
            warn!(task_id = %id, error = %e, "working transition failed");
        }

        self.poll_until_terminal(&id, &remote.remote_id, remote.url.clone(), cancel_rx)
            .await;
        drop(permit);
        self.cancels.lock().remove(&id);
    }

    async fn submit_with_retries(
        &self,
        id: &TaskId,
        request: &CloudSubmit,
    ) -> Option<cdx_adapters::RemoteTask> {
        let mut delay = self.poll.initial;
        let mut last_error = String::new();
        for attempt in 1..=REMOTE_RETRIES {
            match self.client.submit(request).await {
                Ok(remote) => return Some(remote),
                Err(e) => {
                    warn!(task_id = %id, attempt, error = %e, "cloud submission failed");
                    last_error = e.to_string();
                    if attempt < REMOTE_RETRIES {
                        tokio::time::sleep(delay).await;
                        delay = self.poll.next_delay(delay);
                    }
                }
            }
        }
        self.finish(
            id,
            TaskPatch::status(TaskStatus::Failed)
                .with_error(redact(&format!("remote api: {last_error}")).into_owned()),
        );
        None
    }

    /// Poll the remote task until it settles, mirroring state into the
    /// registry.
    async fn poll_until_terminal(
        &self,
        id: &TaskId,
        remote_id: &str,
        task_url: Option<String>,
        mut cancel_rx: watch::Receiver<Option<String>>,
    ) {
        let mut delay = self.poll.initial;
        let mut consecutive_failures = 0u32;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    let Some(reason) = cancel_rx.borrow_and_update().clone() else { continue };
                    match self.client.cancel(remote_id).await {
                        Ok(()) => info!(task_id = %id, "remote cancel requested"),
                        Err(CloudError::CancelUnsupported) => {
                            warn!(task_id = %id, "remote has no cancel api; task canceled locally only");
                        }
                        Err(e) => warn!(task_id = %id, error = %e, "remote cancel failed"),
                    }
                    self.finish(
                        id,
                        TaskPatch::status(TaskStatus::Canceled)
                            .with_error(redact(&reason).into_owned()),
                    );
                    return;
                }
            }

            match self.client.poll(remote_id).await {
                Ok(status) => {
                    consecutive_failures = 0;
                    mirror_remote(&self.registry, id, &status, task_url.clone());
                    if status.phase.is_terminal() {
                        info!(task_id = %id, phase = ?status.phase, "cloud task settled");
                        return;
                    }
                    delay = self.poll.next_delay(delay);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(task_id = %id, error = %e, consecutive_failures, "cloud poll failed");
                    if consecutive_failures >= REMOTE_RETRIES {
                        self.finish(
                            id,
                            TaskPatch::status(TaskStatus::Failed)
                                .with_error(redact(&format!("remote api: {e}")).into_owned()),
                        );
                        return;
                    }
                    delay = self.poll.next_delay(delay);
                }
            }
        }
    }

    fn finish(&self, id: &TaskId, patch: TaskPatch) {
        let status = patch.status;
        if let Err(e) = self.registry.lock().update(id, patch) {
            warn!(task_id = %id, error = %e, "terminal registry update failed");
        } else if let Some(status) = status {
            info!(task_id = %id, status = %status, "cloud task finished");
        }
        self.cancels.lock().remove(id);
    }
}

/// Mirror one remote status into the registry. Returns whether anything
/// was written. Terminal mirrors pass through `working` first when the
/// task was still pending, keeping the state machine honest.
pub(crate) fn mirror_remote<C: Clock>(
    registry: &SharedRegistry<C>,
    id: &TaskId,
    status: &RemoteStatus,
    task_url: Option<String>,
) -> bool {
    let Some(task) = registry.lock().get(id) else {
        return false;
    };
    if task.is_terminal() {
        return false;
    }

    let ensure_working = |registry: &SharedRegistry<C>| {
        if task.status == TaskStatus::Pending {
            if let Err(e) = registry
                .lock()
                .update(id, TaskPatch::status(TaskStatus::Working))
            {
                warn!(task_id = %id, error = %e, "working mirror failed");
            }
        }
    };

    match status.phase {
        RemotePhase::Queued => false,
        RemotePhase::Running => {
            if task.status == TaskStatus::Pending {
                ensure_working(registry);
                true
            } else {
                false
            }
        }
        RemotePhase::Completed | RemotePhase::Failed | RemotePhase::Canceled => {
            ensure_working(registry);
            let success = status.phase == RemotePhase::Completed;
            let summary = status
                .summary
                .clone()
                .or_else(|| status.error.clone())
                .unwrap_or_else(|| {
                    if success {
                        "completed".to_string()
                    } else {
                        "remote task did not complete".to_string()
                    }
                });
            let result = TaskResult::Cloud(CloudResult {
                success,
                task_url,
                summary: redact(&summary).into_owned(),
                diff: status.diff.as_deref().map(|d| redact(d).into_owned()),
                artifacts: status.artifacts.clone(),
            });
            let terminal = match status.phase {
                RemotePhase::Completed => TaskStatus::Completed,
                RemotePhase::Failed => TaskStatus::Failed,
                _ => TaskStatus::Canceled,
            };
            let mut patch = TaskPatch::status(terminal).with_result(result);
            match status.phase {
                RemotePhase::Failed => {
                    let cause = status
                        .error
                        .clone()
                        .unwrap_or_else(|| "remote task failed".to_string());
                    patch = patch.with_error(redact(&cause).into_owned());
                }
                RemotePhase::Canceled => {
                    patch = patch.with_error("canceled remotely");
                }
                _ => {}
            }
            match registry.lock().update(id, patch) {
                Ok(_) => true,
                Err(e) => {
                    warn!(task_id = %id, error = %e, "terminal mirror failed");
                    false
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cloud_tests.rs"]
mod tests;
