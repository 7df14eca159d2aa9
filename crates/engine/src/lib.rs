// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cdx-engine: task executors, admission control, and restart
//! reconciliation.

pub mod admission;
pub mod cloud;
pub mod executor;
pub mod reconcile;
pub mod wait;

use cdx_core::Clock;
use cdx_storage::TaskRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

/// The registry behind its single-writer lock, shared by executors and
/// the dispatch layer.
pub type SharedRegistry<C> = Arc<Mutex<TaskRegistry<C>>>;

pub use admission::Governor;
pub use cloud::{CloudExecutor, CloudTaskSpec, PollConfig};
pub use executor::{ExecError, LocalExecutor, LocalTaskSpec};
pub use reconcile::{reconcile, ReconcileReport};
pub use wait::{wait_for_terminal, WaitError, DEFAULT_POLL_INTERVAL};
