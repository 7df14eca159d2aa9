// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hosted agent service client seam.
//!
//! The real HTTP client is an external collaborator; this module owns the
//! trait the cloud executor drives, the remote-state DTOs, and a scripted
//! fake for tests.

use async_trait::async_trait;
use cdx_core::EnvironmentId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CloudError {
    /// Submission or poll rejected by the hosted service.
    #[error("remote api error: {0}")]
    Api(String),

    /// The remote service exposes no cancel endpoint.
    #[error("the hosted service does not support cancellation")]
    CancelUnsupported,
}

/// Remote task lifecycle as the hosted service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePhase {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl RemotePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemotePhase::Completed | RemotePhase::Failed | RemotePhase::Canceled
        )
    }
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    pub remote_id: String,
    pub url: Option<String>,
}

/// One poll's view of a remote task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub phase: RemotePhase,
    pub summary: Option<String>,
    pub diff: Option<String>,
    pub artifacts: Option<Vec<String>>,
    pub error: Option<String>,
}

impl RemoteStatus {
    pub fn running() -> Self {
        Self {
            phase: RemotePhase::Running,
            summary: None,
            diff: None,
            artifacts: None,
            error: None,
        }
    }

    pub fn completed(summary: impl Into<String>) -> Self {
        Self {
            phase: RemotePhase::Completed,
            summary: Some(summary.into()),
            diff: None,
            artifacts: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            phase: RemotePhase::Failed,
            summary: None,
            diff: None,
            artifacts: None,
            error: Some(error.into()),
        }
    }
}

/// Submission request.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudSubmit {
    pub instruction: String,
    pub environment_id: EnvironmentId,
    pub model: Option<String>,
}

/// Client for the hosted agent service.
#[async_trait]
pub trait CloudClient: Clone + Send + Sync + 'static {
    /// Submit a task for remote execution.
    async fn submit(&self, request: &CloudSubmit) -> Result<RemoteTask, CloudError>;

    /// Fetch the current remote state of a task.
    async fn poll(&self, remote_id: &str) -> Result<RemoteStatus, CloudError>;

    /// Request remote cancellation. Best-effort: Err(CancelUnsupported)
    /// when the service has no cancel API.
    async fn cancel(&self, remote_id: &str) -> Result<(), CloudError>;
}

/// Placeholder client used when no hosted service is configured.
///
/// Every task-facing call reports the missing configuration; the
/// environments file and setup guide primitives work without it.
#[derive(Clone, Copy, Default)]
pub struct NoopCloudClient;

impl NoopCloudClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CloudClient for NoopCloudClient {
    async fn submit(&self, _request: &CloudSubmit) -> Result<RemoteTask, CloudError> {
        Err(CloudError::Api(
            "hosted agent service is not configured".into(),
        ))
    }

    async fn poll(&self, _remote_id: &str) -> Result<RemoteStatus, CloudError> {
        Err(CloudError::Api(
            "hosted agent service is not configured".into(),
        ))
    }

    async fn cancel(&self, _remote_id: &str) -> Result<(), CloudError> {
        Err(CloudError::CancelUnsupported)
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    /// Recorded client call
    #[derive(Debug, Clone, PartialEq)]
    pub enum CloudCall {
        Submit { instruction: String },
        Poll { remote_id: String },
        Cancel { remote_id: String },
    }

    struct FakeCloudState {
        calls: Vec<CloudCall>,
        scripted: HashMap<String, VecDeque<RemoteStatus>>,
        next_id: u64,
        fail_submits: u32,
        fail_polls: u32,
        cancel_supported: bool,
    }

    /// Scripted cloud client for tests.
    ///
    /// `script_statuses` queues the poll responses for a remote id; the
    /// last status repeats once the queue drains.
    #[derive(Clone)]
    pub struct FakeCloudClient {
        inner: Arc<Mutex<FakeCloudState>>,
    }

    impl Default for FakeCloudClient {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeCloudState {
                    calls: Vec::new(),
                    scripted: HashMap::new(),
                    next_id: 0,
                    fail_submits: 0,
                    fail_polls: 0,
                    cancel_supported: true,
                })),
            }
        }
    }

    impl FakeCloudClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<CloudCall> {
            self.inner.lock().calls.clone()
        }

        /// Queue poll responses for the next submitted task. Remote ids
        /// are assigned sequentially as `remote-1`, `remote-2`, ...
        pub fn script_statuses(&self, remote_id: &str, statuses: Vec<RemoteStatus>) {
            self.inner
                .lock()
                .scripted
                .insert(remote_id.to_string(), statuses.into());
        }

        /// Make the next `n` submit calls fail with a remote api error.
        pub fn fail_next_submits(&self, n: u32) {
            self.inner.lock().fail_submits = n;
        }

        /// Make the next `n` poll calls fail with a remote api error.
        pub fn fail_next_polls(&self, n: u32) {
            self.inner.lock().fail_polls = n;
        }

        pub fn set_cancel_supported(&self, supported: bool) {
            self.inner.lock().cancel_supported = supported;
        }
    }

    #[async_trait]
    impl CloudClient for FakeCloudClient {
        async fn submit(&self, request: &CloudSubmit) -> Result<RemoteTask, CloudError> {
            let mut state = self.inner.lock();
            state.calls.push(CloudCall::Submit {
                instruction: request.instruction.clone(),
            });
            if state.fail_submits > 0 {
                state.fail_submits -= 1;
                return Err(CloudError::Api("submission rejected".into()));
            }
            state.next_id += 1;
            let remote_id = format!("remote-{}", state.next_id);
            Ok(RemoteTask {
                url: Some(format!("https://cloud.test/tasks/{remote_id}")),
                remote_id,
            })
        }

        async fn poll(&self, remote_id: &str) -> Result<RemoteStatus, CloudError> {
            let mut state = self.inner.lock();
            state.calls.push(CloudCall::Poll {
                remote_id: remote_id.to_string(),
            });
            if state.fail_polls > 0 {
                state.fail_polls -= 1;
                return Err(CloudError::Api("poll failed".into()));
            }
            let queue = state
                .scripted
                .get_mut(remote_id)
                .ok_or_else(|| CloudError::Api(format!("unknown remote task {remote_id}")))?;
            match queue.len() {
                0 => Err(CloudError::Api(format!("no scripted status for {remote_id}"))),
                1 => Ok(queue[0].clone()),
                _ => Ok(queue.pop_front().unwrap_or_else(|| RemoteStatus::running())),
            }
        }

        async fn cancel(&self, remote_id: &str) -> Result<(), CloudError> {
            let mut state = self.inner.lock();
            state.calls.push(CloudCall::Cancel {
                remote_id: remote_id.to_string(),
            });
            if state.cancel_supported {
                Ok(())
            } else {
                Err(CloudError::CancelUnsupported)
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{CloudCall, FakeCloudClient};

#[cfg(test)]
#[path = "cloud_tests.rs"]
mod tests;
