/// Connection health probe and claim tests
mod common;

use common::{target, MockConnector, ProbeMode};
use rospool::pool::{Connection, TargetConnections};
use std::sync::Arc;
use std::time::Duration;

fn new_pool(connector: &Arc<MockConnector>) -> Arc<TargetConnections> {
    Arc::new(TargetConnections::new("rtr1", connector.clone()))
}

async fn freed_with(mode: ProbeMode) -> (Arc<MockConnector>, Arc<Connection>) {
    let connector = MockConnector::new();
    let pool = new_pool(&connector);
    let target = target("rtr1");

    let connection = pool.get(&target).await.unwrap();
    connector.session(0).set_probe_mode(mode);
    connection.free(target.timeout()).await.unwrap();
    (connector, connection)
}

#[tokio::test]
async fn healthcheck_with_reply_row_is_healthy() {
    let (connector, connection) = freed_with(ProbeMode::Respond).await;
    assert!(connection.is_healthy().await);
    assert_eq!(connector.session(0).probes(), 1);
}

#[tokio::test]
async fn healthcheck_terminator_without_rows_is_healthy() {
    let (_, connection) = freed_with(ProbeMode::Terminator).await;
    assert!(connection.is_healthy().await);
}

#[tokio::test]
async fn healthcheck_end_of_stream_is_healthy() {
    let (_, connection) = freed_with(ProbeMode::EndOfStream).await;
    assert!(connection.is_healthy().await);
}

#[tokio::test]
async fn trap_reply_still_counts_as_alive() {
    let connector = MockConnector::new();
    let pool = new_pool(&connector);
    let target = target("rtr1");

    let connection = pool.get(&target).await.unwrap();
    connector.session(0).set_probe_mode(ProbeMode::Trap);
    connection.free(target.timeout()).await.unwrap();
    assert!(connection.is_healthy().await);

    let reused = pool.get(&target).await.unwrap();
    assert_eq!(reused.id(), connection.id());
    assert_eq!(connector.dials(), 1);
    assert_eq!(connector.session(0).probes(), 2);
}

#[tokio::test]
async fn healthcheck_transport_error_is_unhealthy() {
    let (_, connection) = freed_with(ProbeMode::Error).await;
    assert!(!connection.is_healthy().await);
    assert!(!connection.is_in_use().await);
}

#[tokio::test(start_paused = true)]
async fn healthcheck_timeout_is_unhealthy() {
    let (_, connection) = freed_with(ProbeMode::Hang).await;
    assert!(!connection.is_healthy().await);
}

#[tokio::test]
async fn closed_session_is_unhealthy() {
    let connector = MockConnector::new();
    let pool = new_pool(&connector);
    let target = target("rtr1");

    let connection = pool.get(&target).await.unwrap();
    connection.session().close().await;
    connection.free(target.timeout()).await.unwrap();

    assert!(!connection.is_healthy().await);
}

#[tokio::test]
async fn try_use_claims_idle_healthy_connection() {
    let (connector, connection) = freed_with(ProbeMode::Respond).await;

    assert!(connection.try_use(Duration::from_secs(1)).await);
    assert!(connection.is_in_use().await);
    // One probe on free, one on claim
    assert_eq!(connector.session(0).probes(), 2);
}

#[tokio::test]
async fn try_use_rejects_connection_in_use_without_healthcheck() {
    let connector = MockConnector::new();
    let pool = new_pool(&connector);

    let connection = pool.get(&target("rtr1")).await.unwrap();
    assert!(!connection.try_use(Duration::from_secs(1)).await);
    assert_eq!(connector.session(0).probes(), 0);
}

#[tokio::test]
async fn cached_unhealthy_flag_fails_fast() {
    let connector = MockConnector::new();
    let pool = new_pool(&connector);
    let target = target("rtr1");

    let connection = pool.get(&target).await.unwrap();
    let session = connector.session(0);
    session.set_probe_mode(ProbeMode::Error);
    connection.free(target.timeout()).await.unwrap();
    assert_eq!(session.probes(), 1);

    // The device recovered, but the cached flag is not re-checked on claim
    session.set_probe_mode(ProbeMode::Respond);
    assert!(!connection.try_use(target.timeout()).await);
    assert_eq!(session.probes(), 1);

    let other = pool.get(&target).await.unwrap();
    assert_eq!(other.id(), 1);
    assert_eq!(connector.dials(), 2);
}

#[tokio::test]
async fn failed_claim_healthcheck_marks_unhealthy() {
    let (connector, connection) = freed_with(ProbeMode::Respond).await;

    connector.session(0).set_probe_mode(ProbeMode::Error);
    assert!(!connection.try_use(Duration::from_secs(1)).await);
    assert!(!connection.is_healthy().await);
    assert!(!connection.is_in_use().await);
}

#[tokio::test]
async fn free_revives_connection_whose_healthcheck_succeeds_again() {
    let (connector, connection) = freed_with(ProbeMode::Error).await;
    assert!(!connection.is_healthy().await);

    connector.session(0).set_probe_mode(ProbeMode::Respond);
    connection.free(Duration::from_secs(1)).await.unwrap();
    assert!(connection.is_healthy().await);
}

#[tokio::test(start_paused = true)]
async fn last_release_never_goes_backwards() {
    let connector = MockConnector::new();
    let pool = new_pool(&connector);
    let target = target("rtr1");

    let connection = pool.get(&target).await.unwrap();
    let created = connection.last_release().await;

    connection.free(target.timeout()).await.unwrap();
    let first = connection.last_release().await;
    assert!(first >= created);

    tokio::time::advance(Duration::from_secs(42)).await;
    assert!(connection.try_use(target.timeout()).await);
    assert_eq!(connection.last_release().await, first);

    connection.free(target.timeout()).await.unwrap();
    let second = connection.last_release().await;
    assert!(second >= first + Duration::from_secs(42));
}

#[tokio::test]
async fn release_without_connection_is_noop() {
    assert!(Connection::release(None, Duration::from_secs(1)).is_none());

    let connector = MockConnector::new();
    let pool = new_pool(&connector);
    let connection = pool.get(&target("rtr1")).await.unwrap();

    let handle = Connection::release(Some(Arc::clone(&connection)), Duration::from_secs(1));
    handle.unwrap().await.unwrap();
    assert!(!connection.is_in_use().await);
}

#[tokio::test]
async fn status_is_a_consistent_snapshot() {
    let (_, connection) = freed_with(ProbeMode::Respond).await;

    let status = connection.status().await;
    assert!(!status.in_use);
    assert!(status.healthy);
    assert_eq!(status.last_release, connection.last_release().await);
}
