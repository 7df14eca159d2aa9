// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation: bring every non-terminal task to a truthful
//! state before the service accepts new work.
//!
//! Local tasks found pending or working lost their owning process with
//! the previous incarnation, so they fail outright. Cloud tasks may still
//! be running remotely; the hosted service is re-queried once and its
//! answer mirrored.

use crate::cloud::mirror_remote;
use crate::SharedRegistry;
use cdx_adapters::CloudClient;
use cdx_core::{Clock, TaskOrigin, TaskPatch, TaskStatus};
use tracing::{info, warn};

/// Error recorded on local tasks orphaned by a restart.
pub const ORPHANED_ERROR: &str = "orphaned by restart";

/// What the startup pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub local_orphaned: usize,
    pub cloud_refreshed: usize,
    pub cloud_unreachable: usize,
}

/// Run the reconciliation pass over every non-terminal task.
pub async fn reconcile<C: Clock, CC: CloudClient>(
    registry: &SharedRegistry<C>,
    cloud: &CC,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let open: Vec<_> = {
        let registry = registry.lock();
        registry
            .query(&Default::default())
            .into_iter()
            .filter(|t| !t.is_terminal())
            .collect()
    };

    for task in open {
        match task.origin {
            TaskOrigin::Local => {
                let patch = TaskPatch::status(TaskStatus::Failed).with_error(ORPHANED_ERROR);
                if let Err(e) = registry.lock().update(&task.id, patch) {
                    warn!(task_id = %task.id, error = %e, "orphan reconciliation failed");
                } else {
                    report.local_orphaned += 1;
                }
            }
            TaskOrigin::Cloud => {
                let Some(remote_id) = task.remote_id.clone() else {
                    // Submitted task that never got a remote id: the
                    // submission's fate is unknowable, treat as orphaned.
                    let patch = TaskPatch::status(TaskStatus::Failed).with_error(ORPHANED_ERROR);
                    if let Err(e) = registry.lock().update(&task.id, patch) {
                        warn!(task_id = %task.id, error = %e, "orphan reconciliation failed");
                    } else {
                        report.local_orphaned += 1;
                    }
                    continue;
                };
                match cloud.poll(&remote_id).await {
                    Ok(status) => {
                        mirror_remote(registry, &task.id, &status, None);
                        report.cloud_refreshed += 1;
                    }
                    Err(e) => {
                        // Leave the task for the next poll cycle.
                        warn!(task_id = %task.id, error = %e, "cloud reconciliation poll failed");
                        report.cloud_unreachable += 1;
                    }
                }
            }
        }
    }

    info!(
        local_orphaned = report.local_orphaned,
        cloud_refreshed = report.cloud_refreshed,
        cloud_unreachable = report.cloud_unreachable,
        "reconciliation complete"
    );
    report
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
