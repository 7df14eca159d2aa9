// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cdxd: task orchestration service speaking line-delimited JSON-RPC 2.0
//! on stdio.
//!
//! stdout carries only protocol frames; logs go to stderr. The process
//! exits non-zero only when the task registry cannot be opened.

use cdx_adapters::NoopCloudClient;
use cdx_core::{Clock, SystemClock, TaskIdGen, TaskOrigin, TaskStatus};
use cdx_engine::{reconcile, CloudExecutor, Governor, LocalExecutor, SharedRegistry};
use cdx_server::dispatch::Dispatcher;
use cdx_server::{env, rpc};
use cdx_storage::{TaskQuery, TaskRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    setup_logging();

    let Some(config_dir) = env::config_dir() else {
        error!("no config directory available on this platform");
        return std::process::ExitCode::FAILURE;
    };
    let tasks_path = config_dir.join("tasks.json");
    let environments_path = config_dir.join("environments.json");

    let clock = SystemClock;
    let registry = match TaskRegistry::open(&tasks_path, clock.clone()) {
        Ok(registry) => Arc::new(Mutex::new(registry)),
        Err(e) => {
            // Fatal-init: an unreadable registry must abort, not be
            // silently replaced.
            error!(error = %e, "task registry unusable");
            eprintln!("cdxd: fatal: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    info!(path = %tasks_path.display(), "registry open");

    let governor = Governor::from_env();
    let idgen = TaskIdGen::new(clock.clone());
    let client = NoopCloudClient::new();
    let local = LocalExecutor::new(
        Arc::clone(&registry),
        governor.clone(),
        clock.clone(),
        idgen.clone(),
    );
    let cloud = CloudExecutor::new(
        Arc::clone(&registry),
        governor.clone(),
        clock.clone(),
        idgen,
        client,
    );

    // Bring stale state to truth before accepting calls, then re-attach
    // polling to cloud tasks that are legitimately still in flight.
    let report = reconcile(&registry, &client).await;
    info!(?report, "startup reconciliation done");
    resume_cloud_polling(&registry, &cloud);

    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        local,
        cloud,
        environments_path,
        clock,
    );

    info!(
        concurrency = governor.capacity(),
        "cdxd ready on stdio"
    );
    let result = rpc::serve(tokio::io::stdin(), tokio::io::stdout(), |request| {
        dispatcher.handle(request)
    })
    .await;

    match result {
        Ok(()) => {
            info!("stdin closed, shutting down");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "transport failed");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Re-attach poll loops to cloud tasks that survived the restart
/// non-terminal with a known remote id.
fn resume_cloud_polling<C, G, CC>(registry: &SharedRegistry<C>, cloud: &CloudExecutor<C, G, CC>)
where
    C: Clock,
    G: cdx_core::IdGen + 'static,
    CC: cdx_adapters::CloudClient,
{
    let open: Vec<_> = registry
        .lock()
        .query(&TaskQuery::origin(TaskOrigin::Cloud).with_status(TaskStatus::Working))
        .into_iter()
        .filter(|t| t.remote_id.is_some())
        .collect();
    for task in open {
        if let Err(e) = cloud.resume_polling(&task.id) {
            error!(task_id = %task.id, error = %e, "could not resume cloud polling");
        } else {
            info!(task_id = %task.id, "resumed cloud polling");
        }
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // stdout is the RPC transport; all diagnostics go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
