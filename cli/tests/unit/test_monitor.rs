//! Deployment monitor tests

use std::sync::Arc;
use std::time::Duration;

use platform_api::{AllocationStatus, DeploymentStatus};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use deckhand::errors::CliError;
use deckhand::monitor::deployment::{DeploymentMonitor, MonitorOptions, DIAGNOSTIC_LOG_LIMIT};

use crate::fakes::*;

fn alloc(id: &str, version: i64, status: &str, healthy: bool) -> AllocationStatus {
    AllocationStatus {
        id: id.to_string(),
        version,
        status: status.to_string(),
        desired_status: "run".to_string(),
        healthy,
        region: "ord".to_string(),
        restarts: 0,
        events: vec![],
        recent_logs: vec![],
    }
}

fn deployment(version: i64, in_progress: bool, allocations: Vec<AllocationStatus>) -> DeploymentStatus {
    let healthy = allocations.iter().filter(|a| a.healthy).count() as u32;
    DeploymentStatus {
        id: format!("dep-{}", version),
        version,
        status: if in_progress { "running" } else { "complete" }.to_string(),
        description: String::new(),
        in_progress,
        desired_count: allocations.len() as u32,
        placed_count: allocations.len() as u32,
        healthy_count: healthy,
        unhealthy_count: allocations.len() as u32 - healthy,
        allocations,
    }
}

fn monitor(client: &Arc<FakeControlPlane>) -> DeploymentMonitor {
    DeploymentMonitor::new(
        client.clone(),
        "pg-main",
        MonitorOptions {
            interval: Duration::from_secs(1),
            log_limit: DIAGNOSTIC_LOG_LIMIT,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_successful_deployment() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(Some(deployment(5, true, vec![alloc("a", 5, "pending", false)])));
    client.push_deployment(Some(deployment(5, true, vec![alloc("a", 5, "pending", false)])));
    client.push_deployment(Some(deployment(5, true, vec![alloc("a", 5, "running", true)])));
    client.push_deployment(Some(deployment(5, false, vec![alloc("a", 5, "running", true)])));

    let observer = RecordingObserver::default();
    let outcome = assert_ok!(
        monitor(&client)
            .run(&observer, &CancellationToken::new())
            .await
    );

    assert!(outcome.success);
    assert_eq!(outcome.version, 5);
    assert_eq!(
        observer.events.calls(),
        vec!["started 0 v5", "updated v5 [a]", "succeeded v5"]
    );
    assert!(client.calls.matching("allocation").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_deployment_fetches_diagnostics() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(Some(deployment(
        6,
        true,
        vec![
            alloc("b", 6, "pending", false),
            alloc("c", 6, "pending", false),
            alloc("d", 6, "running", true),
            alloc("old", 5, "failed", false),
        ],
    )));
    client.push_deployment(Some(deployment(
        6,
        false,
        vec![
            alloc("b", 6, "failed", false),
            alloc("c", 6, "failed", false),
            alloc("d", 6, "running", true),
            alloc("old", 5, "failed", false),
        ],
    )));

    let mut detail = alloc("b", 6, "failed", false);
    detail.recent_logs = vec![log_entry("panic: boom"), log_entry("exiting")];
    client.allocations.lock().unwrap().insert("b".to_string(), detail);

    let observer = RecordingObserver::default();
    let outcome = assert_ok!(
        monitor(&client)
            .run(&observer, &CancellationToken::new())
            .await
    );

    assert!(!outcome.success);
    assert_eq!(outcome.version, 6);
    assert_eq!(
        observer.events.calls(),
        vec![
            "started 0 v6",
            "updated v6 [b,c]",
            "failed v6 [b,c]",
            "diagnostics [ok:b:2,not_found]",
        ]
    );

    let mut fetched = client.calls.matching("allocation");
    fetched.sort();
    assert_eq!(fetched, vec!["allocation b 20", "allocation c 20"]);
}

#[tokio::test(start_paused = true)]
async fn test_finished_deployment_at_start_is_ignored() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(Some(deployment(4, false, vec![alloc("a", 4, "failed", false)])));
    client.push_deployment(Some(deployment(4, false, vec![alloc("a", 4, "failed", false)])));
    client.push_deployment(Some(deployment(5, true, vec![])));
    client.push_deployment(Some(deployment(5, false, vec![])));

    let observer = RecordingObserver::default();
    let outcome = assert_ok!(
        monitor(&client)
            .run(&observer, &CancellationToken::new())
            .await
    );

    assert!(outcome.success);
    assert_eq!(outcome.version, 5);
    assert_eq!(observer.events.calls(), vec!["started 0 v5", "succeeded v5"]);
}

#[tokio::test(start_paused = true)]
async fn test_first_deployment_finishing_between_polls_is_reported() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(None);
    client.push_deployment(Some(deployment(1, false, vec![alloc("a", 1, "failed", false)])));

    let observer = RecordingObserver::default();
    let outcome = assert_ok!(
        monitor(&client)
            .run(&observer, &CancellationToken::new())
            .await
    );

    assert!(!outcome.success);
    assert_eq!(outcome.version, 1);
    assert_eq!(
        observer.events.calls(),
        vec!["started 0 v1", "failed v1 [a]", "diagnostics [not_found]"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_superseding_deployment_starts_new_tracking() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(Some(deployment(5, true, vec![alloc("a", 5, "pending", false)])));
    client.push_deployment(Some(deployment(6, true, vec![alloc("b", 6, "pending", false)])));
    client.push_deployment(Some(deployment(6, false, vec![alloc("b", 6, "running", true)])));

    let observer = RecordingObserver::default();
    let outcome = assert_ok!(
        monitor(&client)
            .run(&observer, &CancellationToken::new())
            .await
    );

    assert_eq!(outcome.version, 6);
    assert_eq!(
        observer.events.calls(),
        vec!["started 0 v5", "started 1 v6", "updated v6 [b]", "succeeded v6"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_monitor_waits_for_next_deployment() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(Some(deployment(7, true, vec![])));
    client.push_deployment(Some(deployment(7, false, vec![])));
    client.push_deployment(Some(deployment(8, true, vec![])));
    client.push_deployment(Some(deployment(8, false, vec![])));

    let observer = RecordingObserver::default();
    let mut monitor = monitor(&client);
    let cancel = CancellationToken::new();

    let first = assert_ok!(monitor.run(&observer, &cancel).await);
    let second = assert_ok!(monitor.run(&observer, &cancel).await);

    assert_eq!(first.version, 7);
    assert_eq!(second.version, 8);
    assert_eq!(
        observer.events.calls(),
        vec!["started 0 v7", "succeeded v7", "started 1 v8", "succeeded v8"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_monitor() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_deployment(None);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });
    }

    let observer = RecordingObserver::default();
    let err = assert_err!(monitor(&client).run(&observer, &cancel).await);

    assert!(matches!(err, CliError::Cancelled));
    assert!(observer.events.calls().is_empty());
}
