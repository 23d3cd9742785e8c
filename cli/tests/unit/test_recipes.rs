//! Postgres recipe tests

use std::sync::Arc;
use std::time::Duration;

use platform_api::MachineState;

use deckhand::errors::CliError;
use deckhand::recipes::machines::WaitOptions;
use deckhand::recipes::phase::RecipePhase;
use deckhand::recipes::postgres::{
    postgres_reboot, postgres_sql, postgres_upgrade, Replacement, PG_FAILOVER_SCRIPT,
    PG_IS_HEALTHY_SCRIPT, PG_RESTART_SCRIPT, PG_ROLE_SCRIPT,
};

use crate::fakes::*;

fn exec(id: &str, command: &str) -> String {
    format!("exec {} {}", addr(id), command)
}

fn http(method: &str, path: &str) -> String {
    format!("http {} {} fdaa:0:1::3:4280", method, path)
}

/// Three-member cluster with `d2` as the leader
fn cluster(roles: &[(&str, &str)]) -> (Arc<FakeControlPlane>, FakeDialer) {
    let machines = roles
        .iter()
        .map(|(id, _)| machine(id, MachineState::Started))
        .collect();
    let client = Arc::new(FakeControlPlane::with_machines(machines));

    let dialer = FakeDialer::default();
    for (id, role) in roles {
        dialer.set_role(&addr(id), role);
    }
    (client, dialer)
}

fn standard_roles() -> Vec<(&'static str, &'static str)> {
    vec![("d1", "replica"), ("d2", "leader"), ("d3", "replica")]
}

fn quick_wait() -> WaitOptions {
    WaitOptions {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn test_reboot_orders_replicas_failover_leader() {
    let (client, dialer) = cluster(&standard_roles());
    let session = open_session(client, &dialer).await;

    let report = postgres_reboot(session).await.unwrap();

    assert_eq!(
        dialer.calls.calls(),
        vec![
            "establish acme".to_string(),
            exec("d1", PG_ROLE_SCRIPT),
            exec("d2", PG_ROLE_SCRIPT),
            exec("d3", PG_ROLE_SCRIPT),
            exec("d1", PG_RESTART_SCRIPT),
            exec("d3", PG_RESTART_SCRIPT),
            exec("d2", PG_FAILOVER_SCRIPT),
            exec("d2", PG_RESTART_SCRIPT),
            "close".to_string(),
        ]
    );
    assert_eq!(report.phase, RecipePhase::Done);
    assert_eq!(report.roles.leaders().len(), 1);
    assert_eq!(report.roles.leaders()[0].machine_id, "d2");
    assert_eq!(report.roles.replicas().len(), 2);
    assert!(report.replacements.is_empty());
}

#[tokio::test]
async fn test_reboot_skips_unknown_roles() {
    let (client, dialer) = cluster(&[
        ("d1", "replica"),
        ("d2", "leader"),
        ("d4", "barman"),
    ]);
    let session = open_session(client, &dialer).await;

    let report = postgres_reboot(session).await.unwrap();

    let d4_calls: Vec<String> = dialer
        .calls
        .calls()
        .into_iter()
        .filter(|c| c.contains(&addr("d4")))
        .collect();
    assert_eq!(d4_calls, vec![exec("d4", PG_ROLE_SCRIPT)]);
    assert_eq!(report.roles.get("barman").len(), 1);
    assert_eq!(report.roles.len(), 3);
}

#[tokio::test]
async fn test_replica_failure_aborts_before_failover() {
    let (client, dialer) = cluster(&standard_roles());
    dialer.fail_with_stderr(&addr("d1"), PG_RESTART_SCRIPT, "pg_ctl: server did not stop");
    let session = open_session(client, &dialer).await;

    let err = postgres_reboot(session).await.unwrap_err();

    match err {
        CliError::RemoteError { target, message } => {
            assert!(target.starts_with("d1"));
            assert_eq!(message, "pg_ctl: server did not stop");
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    let calls = dialer.calls.calls();
    assert!(!calls.iter().any(|c| c.contains(PG_FAILOVER_SCRIPT)));
    assert!(!calls.contains(&exec("d2", PG_RESTART_SCRIPT)));
    assert_eq!(calls.last().map(String::as_str), Some("close"));
}

#[tokio::test]
async fn test_role_discovery_failure_is_fatal() {
    let (client, dialer) = cluster(&standard_roles());
    dialer.fail_with_stderr(&addr("d3"), PG_ROLE_SCRIPT, "role: permission denied");
    let session = open_session(client, &dialer).await;

    let err = postgres_reboot(session).await.unwrap_err();

    assert!(matches!(err, CliError::RemoteError { .. }));
    assert!(dialer.calls.matching(&exec("d1", PG_RESTART_SCRIPT)).is_empty());
    assert_eq!(dialer.calls.matching("close").len(), 1);
}

#[tokio::test]
async fn test_unreachable_member_stops_discovery() {
    let (client, dialer) = cluster(&standard_roles());
    dialer.set_unreachable(&addr("d2"));
    let session = open_session(client, &dialer).await;

    let err = postgres_reboot(session).await.unwrap_err();

    assert!(matches!(err, CliError::TunnelError(_)));
    assert_eq!(
        dialer.calls.matching("exec"),
        vec![exec("d1", PG_ROLE_SCRIPT), exec("d2", PG_ROLE_SCRIPT)]
    );
    assert_eq!(dialer.calls.matching("close").len(), 1);
}

#[tokio::test]
async fn test_reboot_without_machines() {
    let client = Arc::new(FakeControlPlane::new());
    let dialer = FakeDialer::default();
    let session = open_session(client, &dialer).await;

    let err = postgres_reboot(session).await.unwrap_err();

    assert!(matches!(err, CliError::RecipeError(_)));
    assert_eq!(dialer.calls.calls(), vec!["establish acme", "close"]);
}

#[tokio::test]
async fn test_upgrade_replaces_replicas_then_leader() {
    let (client, dialer) = cluster(&[("d1", "replica"), ("d2", "leader")]);
    let session = open_session(client.clone(), &dialer).await;

    let report = postgres_upgrade(session, "flyio/postgres:15", quick_wait())
        .await
        .unwrap();

    assert_eq!(
        dialer.calls.calls(),
        vec![
            "establish acme".to_string(),
            exec("d1", PG_ROLE_SCRIPT),
            exec("d2", PG_ROLE_SCRIPT),
            http("POST", "/v1/machines/d1/stop"),
            http("DELETE", "/v1/machines/d1/"),
            exec("e1", PG_IS_HEALTHY_SCRIPT),
            exec("d2", PG_FAILOVER_SCRIPT),
            http("POST", "/v1/machines/d2/stop"),
            http("DELETE", "/v1/machines/d2/"),
            exec("e2", PG_IS_HEALTHY_SCRIPT),
            "close".to_string(),
        ]
    );
    assert_eq!(
        report.replacements,
        vec![
            Replacement {
                old_machine_id: "d1".to_string(),
                new_machine_id: "e1".to_string(),
            },
            Replacement {
                old_machine_id: "d2".to_string(),
                new_machine_id: "e2".to_string(),
            },
        ]
    );
    assert_eq!(report.phase, RecipePhase::Done);
}

#[tokio::test]
async fn test_upgrade_keeps_config_but_swaps_image() {
    let (client, dialer) = cluster(&[("d1", "replica"), ("d2", "leader")]);
    let session = open_session(client.clone(), &dialer).await;

    postgres_upgrade(session, "flyio/postgres:15", quick_wait())
        .await
        .unwrap();

    let launched = client.launched.lock().unwrap().clone();
    assert_eq!(launched.len(), 2);
    for input in &launched {
        let original = machine("d1", MachineState::Started).config;
        assert_eq!(input.region, "ord");
        assert_eq!(input.app_id, "app-1");
        assert_eq!(input.config.image, "flyio/postgres:15");
        assert_eq!(input.config.size, original.size);
        assert_eq!(input.config.env, original.env);
    }
}

#[tokio::test]
async fn test_upgrade_health_failure_stops_before_leader() {
    let (client, dialer) = cluster(&[("d1", "replica"), ("d2", "leader")]);
    dialer.fail_with_stderr(&addr("e1"), PG_IS_HEALTHY_SCRIPT, "not accepting connections");
    let session = open_session(client.clone(), &dialer).await;

    let err = postgres_upgrade(session, "flyio/postgres:15", quick_wait())
        .await
        .unwrap_err();

    assert!(matches!(err, CliError::RemoteError { .. }));
    assert!(dialer.calls.matching(&exec("d2", PG_FAILOVER_SCRIPT)).is_empty());
    assert_eq!(client.launched.lock().unwrap().len(), 1);
    assert_eq!(dialer.calls.matching("close").len(), 1);
}

#[tokio::test]
async fn test_upgrade_requires_image() {
    let (client, dialer) = cluster(&standard_roles());
    let session = open_session(client, &dialer).await;

    let err = postgres_upgrade(session, "  ", quick_wait()).await.unwrap_err();

    assert!(matches!(err, CliError::ValidationError(_)));
    assert_eq!(dialer.calls.calls(), vec!["establish acme", "close"]);
}

#[tokio::test]
async fn test_sql_runs_on_leader() {
    let (client, dialer) = cluster(&standard_roles());
    let session = open_session(client, &dialer).await;

    let output = postgres_sql(session, "select 'x'").await.unwrap();

    assert_eq!(output, "ok");
    assert_eq!(
        dialer.calls.matching(&format!("exec {} /fly/scripts/run_sql", addr("d2"))),
        vec![exec("d2", "/fly/scripts/run_sql 'select '\\''x'\\'''")]
    );
    assert_eq!(dialer.calls.matching("close").len(), 1);
}
