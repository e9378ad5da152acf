mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use common::{MockServer, T0};
use tether_api_client::{ErrorKind, MemoryStore, SessionClient};

const REFRESH: &str = "/api/auth/refresh";

#[tokio::test]
async fn concurrent_refreshes_share_one_network_call() {
    let server = MockServer::start().await;
    server.respond_after(REFRESH, 200, "{}", Duration::from_millis(150));
    let (client, _, _) = server.client();

    let results = join_all((0..8).map(|_| client.refresh())).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(server.hits(REFRESH), 1);
    assert!(!client.refresher().is_in_flight());
    assert!(!client.snapshot().expired);
}

#[tokio::test]
async fn concurrent_refresh_failure_fans_out_identically() {
    let server = MockServer::start().await;
    server.respond_after(
        REFRESH,
        401,
        r#"{"error":"invalid_grant","error_description":"Session expired"}"#,
        Duration::from_millis(100),
    );
    let (client, time, _) = server.client();

    let results = join_all((0..5).map(|_| client.refresh())).await;

    assert_eq!(server.hits(REFRESH), 1);
    for result in &results {
        let err = result.as_ref().expect_err("refresh should fail");
        assert_eq!(err.kind, ErrorKind::Refresh);
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Session expired");
    }
    let state = client.snapshot();
    assert!(state.expired);
    assert_eq!(state.error, "Session expired");
    assert!(!client.refresher().is_in_flight());

    // Once settled, the next stale refresh goes back to the network.
    time.advance(Duration::from_secs(60));
    server.respond(REFRESH, 200, "{}");
    client.refresh().await.expect("second refresh");
    assert_eq!(server.hits(REFRESH), 2);
    assert!(!client.snapshot().expired);
}

#[tokio::test]
async fn fresh_clock_skips_network_and_leaves_clock_alone() {
    let server = MockServer::start().await;
    server.respond(REFRESH, 200, "{}");
    let (client, time, _) = server.client();
    client.clock().mark_refreshed(T0);

    time.set(T0 + 50_000);
    client.refresh().await.expect("fresh refresh");

    assert_eq!(server.hits(REFRESH), 0);
    assert_eq!(client.clock().last_refreshed_at(), Some(T0));
}

#[tokio::test]
async fn stale_clock_refreshes_once_and_advances_clock() {
    let server = MockServer::start().await;
    server.respond(REFRESH, 200, "{}");
    let (client, time, _) = server.client();
    client.clock().mark_refreshed(T0);

    time.set(T0 + 50_000);
    client.refresh().await.expect("no-op refresh");
    assert_eq!(server.hits(REFRESH), 0);

    time.set(T0 + 60_000);
    client.refresh().await.expect("stale refresh");
    assert_eq!(server.hits(REFRESH), 1);
    assert_eq!(client.clock().last_refreshed_at(), Some(T0 + 60_000));
}

#[tokio::test]
async fn clock_is_stamped_before_the_response_settles() {
    let server = MockServer::start().await;
    server.respond_after(REFRESH, 200, "{}", Duration::from_millis(300));
    let (client, _, _) = server.client();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.refresh().await }
    });

    for _ in 0..100 {
        if server.hits(REFRESH) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(server.hits(REFRESH), 1);
    assert!(client.refresher().is_in_flight());
    assert_eq!(client.clock().last_refreshed_at(), Some(T0));

    pending
        .await
        .expect("join refresh")
        .expect("refresh succeeds");
    assert!(!client.refresher().is_in_flight());
}

#[tokio::test]
async fn clients_sharing_a_clock_do_not_double_refresh() {
    let server = MockServer::start().await;
    server.respond_after(REFRESH, 200, "{}", Duration::from_millis(100));
    let (first, time, store) = server.client();
    let second = server.client_with(time.clone(), store.clone());

    let (a, b) = tokio::join!(first.refresh(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        second.refresh().await
    });

    a.expect("first refresh");
    b.expect("second refresh sees fresh clock");
    assert_eq!(server.hits(REFRESH), 1);
}

#[tokio::test]
async fn separate_clocks_refresh_independently() {
    let server = MockServer::start().await;
    server.respond(REFRESH, 200, "{}");
    let (first, time, _) = server.client();
    let second = server.client_with(time, Arc::new(MemoryStore::new()));

    first.refresh().await.expect("first refresh");
    second.refresh().await.expect("second refresh");
    assert_eq!(server.hits(REFRESH), 2);
}

#[tokio::test]
async fn unreachable_refresh_endpoint_expires_session() {
    let (client, _) = common::offline_client();

    let err = client.refresh().await.expect_err("refresh should fail");

    assert_eq!(err.kind, ErrorKind::Refresh);
    assert_eq!(err.status, None);
    let state = client.snapshot();
    assert!(state.expired);
    assert!(!state.error.is_empty());
    assert!(!client.refresher().is_in_flight());
}

#[tokio::test]
async fn refresh_gateway_timeout_keeps_raw_message() {
    let server = MockServer::start().await;
    server.respond(REFRESH, 504, "<html>gateway timeout</html>");
    let (client, _, _) = server.client();

    let err = client.refresh().await.expect_err("refresh should fail");

    assert_eq!(err.kind, ErrorKind::Refresh);
    assert_eq!(err.status, Some(504));
    assert_eq!(err.message, "<html>gateway timeout</html>");
    assert_eq!(client.snapshot().status, 504);
}

async fn wait_until_settled(client: &SessionClient) {
    for _ in 0..200 {
        if !client.refresher().is_in_flight() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn abandoned_refresh_still_settles_and_clears_slot() {
    let server = MockServer::start().await;
    server.respond_after(REFRESH, 200, "{}", Duration::from_millis(100));
    let (client, time, _) = server.client();
    client.state().set_expired(true);

    let first = tokio::time::timeout(Duration::from_millis(20), client.refresh()).await;
    assert!(first.is_err(), "caller should have given up");
    assert!(client.refresher().is_in_flight());

    wait_until_settled(&client).await;
    assert!(!client.refresher().is_in_flight());
    assert_eq!(server.hits(REFRESH), 1);
    assert!(!client.snapshot().expired);

    // A later stale refresh starts a new call instead of joining the old one.
    time.advance(Duration::from_secs(60));
    client.refresh().await.expect("second refresh");
    assert_eq!(server.hits(REFRESH), 2);
}

#[tokio::test]
async fn abandoned_refresh_failure_still_expires_session() {
    let server = MockServer::start().await;
    server.respond_after(
        REFRESH,
        401,
        r#"{"error":"invalid_grant"}"#,
        Duration::from_millis(100),
    );
    let (client, _, _) = server.client();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    pending.abort();

    wait_until_settled(&client).await;
    assert!(!client.refresher().is_in_flight());
    let state = client.snapshot();
    assert!(state.expired);
    assert_eq!(state.error, "invalid_grant");
}
