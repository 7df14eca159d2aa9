// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable task registry: one JSON table, write-through persistence.
//!
//! Every mutation rewrites the table atomically (temp file, fsync, rename,
//! directory fsync) before returning, so a reopened registry is always
//! consistent with the last acknowledged write. The registry is the single
//! source of truth for status queries; status transitions are checked here
//! so no caller can regress a task.

use cdx_core::{Clock, Task, TaskId, TaskOrigin, TaskPatch, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unreadable table on open. Fatal by contract: the service refuses to
    /// start rather than silently dropping task history.
    #[error("registry file is corrupt at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("task {0} already exists")]
    DuplicateId(TaskId),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("illegal status transition {from} -> {to} for task {id}")]
    IllegalTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("terminal update for task {0} must carry a result or an error")]
    MissingOutcome(TaskId),
}

/// On-disk shape: one logical table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TasksTable {
    tasks: Vec<Task>,
}

/// Filter for [`TaskRegistry::query`]. Empty filter returns everything,
/// newest first.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub origin: Option<TaskOrigin>,
    pub status: Option<TaskStatus>,
    pub working_dir: Option<PathBuf>,
    pub limit: Option<usize>,
}

impl TaskQuery {
    pub fn origin(origin: TaskOrigin) -> Self {
        Self {
            origin: Some(origin),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, task: &Task) -> bool {
        if self.origin.is_some_and(|o| o != task.origin) {
            return false;
        }
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if let Some(dir) = &self.working_dir {
            if task.working_dir.as_deref() != Some(dir.as_path()) {
                return false;
            }
        }
        true
    }
}

/// The persistent task table. Single-writer by design; callers share it
/// behind a mutex.
pub struct TaskRegistry<C: Clock> {
    path: PathBuf,
    clock: C,
    tasks: HashMap<TaskId, Task>,
}

impl<C: Clock> TaskRegistry<C> {
    /// Open or create the registry at `path`.
    ///
    /// A missing file is an empty registry. An unparseable file is
    /// [`RegistryError::Corrupt`]: surfaced, never rotated away.
    pub fn open(path: impl Into<PathBuf>, clock: C) -> Result<Self, RegistryError> {
        let path = path.into();
        let tasks = match fs::read(&path) {
            Ok(bytes) => {
                let table: TasksTable =
                    serde_json::from_slice(&bytes).map_err(|e| RegistryError::Corrupt {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                table
                    .tasks
                    .into_iter()
                    .map(|t| (t.id.clone(), t))
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(RegistryError::Io { path, source: e }),
        };
        debug!(path = %path.display(), count = tasks.len(), "registry opened");
        Ok(Self { path, clock, tasks })
    }

    /// Insert a new task. Fails if the id already exists.
    pub fn create(&mut self, task: Task) -> Result<(), RegistryError> {
        if self.tasks.contains_key(&task.id) {
            return Err(RegistryError::DuplicateId(task.id));
        }
        self.tasks.insert(task.id.clone(), task);
        self.persist()
    }

    /// Fetch a task by id.
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.get(id).cloned()
    }

    /// Filtered listing, ordered by `created_at` descending with the id as
    /// tiebreaker (ids sort by creation order within an origin).
    pub fn query(&self, query: &TaskQuery) -> Vec<Task> {
        let mut found: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        found
    }

    /// All task ids, for suggestion lookups.
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().cloned().collect()
    }

    /// Merge a patch into a task.
    ///
    /// Status changes are validated against the state machine; moves into a
    /// terminal state require an outcome (result or error) and stamp
    /// `completed_at`. `updated_at` is always refreshed.
    pub fn update(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Task, RegistryError> {
        let now = self.clock.epoch_ms();
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        if let Some(next) = patch.status {
            if next != task.status {
                if !TaskStatus::can_transition(task.status, next) {
                    return Err(RegistryError::IllegalTransition {
                        id: id.clone(),
                        from: task.status,
                        to: next,
                    });
                }
                if next.is_terminal() {
                    let has_outcome = patch.result.is_some()
                        || patch.error.is_some()
                        || task.result.is_some()
                        || task.error.is_some();
                    if !has_outcome {
                        return Err(RegistryError::MissingOutcome(id.clone()));
                    }
                    task.completed_at = Some(now);
                }
                task.status = next;
            }
        }
        if let Some(error) = patch.error {
            task.error = Some(error);
        }
        if let Some(result) = patch.result {
            task.result = Some(result);
        }
        if let Some(progress) = patch.progress {
            task.progress_snapshot = Some(progress);
        }
        if let Some(thread_id) = patch.thread_id {
            task.thread_id = Some(thread_id);
        }
        if let Some(remote_id) = patch.remote_id {
            task.remote_id = Some(remote_id);
        }
        task.updated_at = now;

        let updated = task.clone();
        self.persist()?;
        Ok(updated)
    }

    /// Remove a terminal task. Returns `false` (and leaves the task alone)
    /// when it is still pending or working.
    pub fn evict(&mut self, id: &TaskId) -> Result<bool, RegistryError> {
        match self.tasks.get(id) {
            None => Err(RegistryError::NotFound(id.clone())),
            Some(task) if !task.is_terminal() => {
                warn!(task_id = %id, status = %task.status, "evict skipped: task not terminal");
                Ok(false)
            }
            Some(_) => {
                self.tasks.remove(id);
                self.persist()?;
                Ok(true)
            }
        }
    }

    /// Serialize the table and replace the file atomically.
    ///
    /// Durability ordering: write temp, fsync temp, rename over the table,
    /// fsync the directory so the rename survives power loss.
    fn persist(&self) -> Result<(), RegistryError> {
        let io_err = |source: io::Error| RegistryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut table: Vec<&Task> = self.tasks.values().collect();
        table.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let body = serde_json::to_vec_pretty(&serde_json::json!({ "tasks": table }))
            .map_err(|e| RegistryError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(io_err)?;
            tmp.write_all(&body).map_err(io_err)?;
            tmp.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        if let Some(parent) = self.path.parent() {
            // Directory fsync failure is survivable (the rename landed),
            // but worth a warning since crash durability is weakened.
            match OpenOptions::new().read(true).open(parent) {
                Ok(dir) => {
                    if let Err(e) = dir.sync_all() {
                        warn!(path = %parent.display(), error = %e, "directory fsync failed");
                    }
                }
                Err(e) => {
                    warn!(path = %parent.display(), error = %e, "directory open for fsync failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
