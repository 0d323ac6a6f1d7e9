// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::time::{Duration, Instant};

use opcua_multihomed::{
    manager::{DeviceConfig, ManagerConfig, MultiInterfaceManager},
    types::StatusCode,
};
use utils::{test_client, MockServer, DIAL_TIMEOUT};

mod utils;

fn manager_config() -> ManagerConfig {
    let mut config = ManagerConfig::new(test_client().auto_reconnect(false).config());
    config.health_check_interval = 100;
    config.connect_timeout = 3000;
    config.close_timeout = 1000;
    config
}

async fn wait_until(mut f: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !f() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Condition was not met in time");
}

#[tokio::test]
async fn devices_connect_from_their_own_address() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    let port_a = utils::free_local_port();
    let port_b = utils::free_local_port();

    let mut config = manager_config();
    config.devices.push(DeviceConfig::new(
        "A",
        a.url(),
        format!("127.0.0.1:{}", port_a).parse().unwrap(),
    ));
    let manager = {
        let mut m = MultiInterfaceManager::new(config).unwrap();
        m.add_device("B", &b.url(), &format!("127.0.0.1:{}", port_b))
            .unwrap();
        m
    };

    let summary = manager.connect_all().await;
    assert!(summary.all_connected());
    assert_eq!(summary.connected, 2);

    assert_eq!(a.observed(|o| o.peers[0].port()), port_a);
    assert_eq!(b.observed(|o| o.peers[0].port()), port_b);

    // Already connected devices are left alone
    let again = manager.connect_all().await;
    assert_eq!(again.connected, 2);
    assert_eq!(a.observed(|o| o.sessions_created), 1);

    manager.close().await;
    assert_eq!(a.observed(|o| o.sessions_closed), 1);
    assert_eq!(b.observed(|o| o.sessions_closed), 1);
    assert!(manager.statuses().iter().all(|s| !s.connected));
}

#[tokio::test]
async fn one_failure_does_not_stop_the_others() {
    let a = MockServer::start().await;
    let mut manager = MultiInterfaceManager::new(manager_config()).unwrap();
    manager.add_device("A", &a.url(), "127.0.0.1:0").unwrap();
    let refused = format!("opc.tcp://127.0.0.1:{}/", utils::free_local_port());
    manager.add_device("B", &refused, "127.0.0.1:0").unwrap();

    let summary = manager.connect_all().await;
    assert_eq!(summary.connected, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "B");

    assert!(manager.device("A").unwrap().is_connected());
    let b = manager.device("B").unwrap();
    assert!(!b.is_connected());
    assert!(b.last_error().is_some());

    manager.close().await;
}

#[tokio::test]
async fn unreachable_device_fails_fast() {
    // Reconnecting is on, a device that never connected still fails on its first attempt
    let mut config = ManagerConfig::new(test_client().config());
    config.connect_timeout = 15_000;
    let mut manager = MultiInterfaceManager::new(config).unwrap();
    let refused = format!("opc.tcp://127.0.0.1:{}/", utils::free_local_port());
    manager.add_device("A", &refused, "127.0.0.1:0").unwrap();

    let start = Instant::now();
    let summary = manager.connect_all().await;
    assert!(start.elapsed() < DIAL_TIMEOUT);
    assert_eq!(
        summary.failed,
        vec![("A".to_string(), StatusCode::BadCommunicationError)]
    );
    assert_eq!(
        manager.device("A").unwrap().last_error(),
        Some(StatusCode::BadCommunicationError)
    );
    manager.close().await;
}

#[tokio::test]
async fn monitoring_records_health() {
    let server = MockServer::start().await;
    let mut manager = MultiInterfaceManager::new(manager_config()).unwrap();
    let device = manager
        .add_device("A", &server.url(), "127.0.0.1:0")
        .unwrap();

    assert!(manager.connect_all().await.all_connected());
    manager.start_monitoring();
    // Second call is ignored
    manager.start_monitoring();

    wait_until(|| {
        device
            .last_health_check()
            .is_some_and(|h| h.result.is_ok())
    })
    .await;
    assert!(device.last_error().is_none());

    server.set_behaviour(|b| b.server_status = StatusCode::BadServerHalted);
    wait_until(|| device.last_error() == Some(StatusCode::BadServerHalted)).await;
    // A failed check does not drop the connection
    assert!(device.is_connected());

    let status = device.status();
    assert_eq!(
        status.last_health_check.map(|h| h.result),
        Some(Err(StatusCode::BadServerHalted))
    );
    assert!(status.to_string().contains("unhealthy"));

    manager.close().await;
    let reads = server.observed(|o| o.reads);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.observed(|o| o.reads), reads);
}

#[tokio::test]
async fn lost_device_is_reported() {
    let server = MockServer::start().await;
    let mut manager = MultiInterfaceManager::new(manager_config()).unwrap();
    let device = manager
        .add_device("A", &server.url(), "127.0.0.1:0")
        .unwrap();
    assert!(manager.connect_all().await.all_connected());
    manager.start_monitoring();

    // Stops the listener too, so reconnecting fails and the event loop ends
    drop(server);
    wait_until(|| !device.is_connected()).await;
    assert!(device.last_error().is_some());

    manager.close().await;
}

#[tokio::test]
async fn closed_manager_does_not_reconnect() {
    let server = MockServer::start().await;
    let mut manager = MultiInterfaceManager::new(manager_config()).unwrap();
    manager.add_device("A", &server.url(), "127.0.0.1:0").unwrap();
    assert!(manager.connect_all().await.all_connected());

    manager.close().await;
    manager.close().await;
    assert_eq!(server.observed(|o| o.sessions_closed), 1);

    let summary = manager.connect_all().await;
    assert_eq!(summary.connected, 0);
    assert_eq!(
        summary.failed,
        vec![("A".to_string(), StatusCode::BadInvalidState)]
    );
}

#[tokio::test]
async fn close_waits_for_in_flight_health_check() {
    let server = MockServer::start().await;
    // Only health checks read, keep alives stay out of the way
    let client = test_client()
        .auto_reconnect(false)
        .keep_alive_interval(Duration::from_secs(60));
    let mut config = ManagerConfig::new(client.config());
    config.health_check_interval = 100;
    config.close_timeout = 1000;
    let mut manager = MultiInterfaceManager::new(config).unwrap();
    let device = manager
        .add_device("A", &server.url(), "127.0.0.1:0")
        .unwrap();
    assert!(manager.connect_all().await.all_connected());

    server.set_behaviour(|b| b.read_delay = Duration::from_secs(30));
    manager.start_monitoring();
    wait_until(|| server.observed(|o| o.reads) == 1).await;
    assert!(device.last_health_check().is_none());

    // The check is abandoned, not waited out
    tokio::time::timeout(Duration::from_secs(5), manager.close())
        .await
        .unwrap();
    assert_eq!(server.observed(|o| o.sessions_closed), 1);
    assert!(!device.is_connected());
    // A session closed under a running check would have recorded its failure
    assert!(device.last_health_check().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.observed(|o| o.reads), 1);
    assert!(device.last_health_check().is_none());
}

#[tokio::test]
async fn health_check_of_session() {
    let server = MockServer::start().await;
    let client = utils::default_client();
    let (session, handle) = client
        .connect(
            &server.url(),
            "127.0.0.1:0",
            opcua_multihomed::client::IdentityToken::Anonymous,
            utils::CONNECT_TIMEOUT,
        )
        .await
        .unwrap();

    MultiInterfaceManager::health_check(&session, "A")
        .await
        .unwrap();
    server.set_behaviour(|b| b.server_status = StatusCode::BadResourceUnavailable);
    assert_eq!(
        MultiInterfaceManager::health_check(&session, "A").await,
        Err(StatusCode::BadResourceUnavailable)
    );

    session.disconnect().await.unwrap();
    let _ = handle.await;
}
