// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: the agent subprocess, its JSONL stream, and
//! the hosted cloud service.

pub mod cloud;
pub mod codex;
mod env;
pub mod environments;
pub mod jsonl;
pub mod process;

pub use cloud::{
    CloudClient, CloudError, CloudSubmit, NoopCloudClient, RemotePhase, RemoteStatus, RemoteTask,
};
pub use codex::{extract_program_name, AgentInvocation};
pub use env::{agent_program, max_concurrency, DEFAULT_MAX_CONCURRENCY};
pub use environments::{Environment, EnvironmentsError};
pub use jsonl::JsonlDecoder;
pub use process::{spawn, ExitStatus, ProcessHandle, SpawnConfig, SpawnError, CANCEL_GRACE};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use cloud::{CloudCall, FakeCloudClient};
