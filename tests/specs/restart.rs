//! Spec: a restart reconciles every task that was still open.

use cdx_adapters::{FakeCloudClient, RemoteStatus};
use cdx_core::{
    Clock, SandboxMode, SequentialIdGen, SystemClock, Task, TaskId, TaskOrigin, TaskStatus,
};
use cdx_engine::{reconcile, SharedRegistry};
use cdx_storage::TaskRegistry;
use parking_lot::Mutex;
use std::sync::Arc;

fn open_registry(path: &std::path::Path) -> SharedRegistry<SystemClock> {
    Arc::new(Mutex::new(TaskRegistry::open(path, SystemClock).unwrap()))
}

fn seed_task(
    registry: &SharedRegistry<SystemClock>,
    idgen: &SequentialIdGen,
    origin: TaskOrigin,
    status: TaskStatus,
    remote_id: Option<&str>,
) -> TaskId {
    let id = TaskId::generate(origin, idgen);
    let mut task = Task::new(
        id.clone(),
        origin,
        "interrupted work",
        SandboxMode::ReadOnly,
        SystemClock.epoch_ms(),
    );
    task.status = status;
    task.remote_id = remote_id.map(str::to_string);
    registry.lock().create(task).unwrap();
    id
}

#[tokio::test]
async fn open_local_tasks_are_terminal_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    let idgen = SequentialIdGen::new("r");

    // First service incarnation leaves tasks mid-flight.
    let (pending, working) = {
        let registry = open_registry(&path);
        let pending = seed_task(&registry, &idgen, TaskOrigin::Local, TaskStatus::Pending, None);
        let working = seed_task(&registry, &idgen, TaskOrigin::Local, TaskStatus::Working, None);
        (pending, working)
    };

    // Second incarnation reconciles on startup.
    let registry = open_registry(&path);
    let client = FakeCloudClient::new();
    let report = reconcile(&registry, &client).await;
    assert_eq!(report.local_orphaned, 2);

    for id in [pending, working] {
        let task = registry.lock().get(&id).unwrap();
        assert!(task.is_terminal(), "{} still {}", task.id, task.status);
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("orphaned by restart"));
    }
}

#[tokio::test]
async fn cloud_tasks_are_refreshed_from_the_remote() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    let idgen = SequentialIdGen::new("r");

    let id = {
        let registry = open_registry(&path);
        seed_task(
            &registry,
            &idgen,
            TaskOrigin::Cloud,
            TaskStatus::Working,
            Some("remote-55"),
        )
    };

    let registry = open_registry(&path);
    let client = FakeCloudClient::new();
    client.script_statuses("remote-55", vec![RemoteStatus::completed("survived restart")]);
    reconcile(&registry, &client).await;

    let task = registry.lock().get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");
    let idgen = SequentialIdGen::new("r");

    let registry = open_registry(&path);
    seed_task(&registry, &idgen, TaskOrigin::Local, TaskStatus::Working, None);

    let client = FakeCloudClient::new();
    let first = reconcile(&registry, &client).await;
    let second = reconcile(&registry, &client).await;
    assert_eq!(first.local_orphaned, 1);
    assert_eq!(second.local_orphaned, 0);
}
