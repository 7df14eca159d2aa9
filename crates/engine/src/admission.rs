// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrency governor: one FIFO semaphore bounds `working` tasks across
//! both origins.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Admission semaphore sized from `CODEX_MAX_CONCURRENCY`.
///
/// A task holds its permit from admission (`pending -> working`) until it
/// reaches a terminal state; tokio's semaphore queues waiters FIFO.
#[derive(Clone)]
pub struct Governor {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Governor {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Governor sized from the environment.
    pub fn from_env() -> Self {
        Self::new(cdx_adapters::max_concurrency())
    }

    /// Wait for a working slot.
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.semaphore).acquire_owned().await
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now (capacity minus working tasks).
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
