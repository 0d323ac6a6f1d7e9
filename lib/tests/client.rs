// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::{Duration, Instant},
};

use futures::{Stream, StreamExt};
use opcua_multihomed::{
    client::{
        ClientEndpoint, ClientUserToken, IdentityToken, SessionActivity, SessionConnectMode,
        SessionPollResult, SessionState,
    },
    net::LocalAddress,
    types::{NodeId, ServerState, StatusCode, VariableId, Variant},
};
use utils::{default_client, test_client, MockServer, CONNECT_TIMEOUT, PASSWORD, USER_NAME};

mod utils;

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
async fn connect_from_bound_address() {
    let server = MockServer::start().await;
    let client = default_client();

    let port = utils::free_local_port();
    let (session, handle) = client
        .connect(
            &server.url(),
            &format!("127.0.0.1:{}", port),
            IdentityToken::Anonymous,
            CONNECT_TIMEOUT,
        )
        .await
        .unwrap();

    assert!(session.is_connected());
    assert_eq!(session.local_address().to_string(), format!("127.0.0.1:{}", port));
    assert_eq!(
        session.source_address(),
        Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    );
    let peers = server.observed(|o| o.peers.clone());
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].ip(), Ipv4Addr::LOCALHOST);
    assert_eq!(peers[0].port(), port);
    assert_eq!(
        server.observed(|o| o.identities.clone()),
        vec!["anonymous:open".to_string()]
    );

    session.disconnect().await.unwrap();
    let _ = handle.await;
}

#[tokio::test]
async fn connect_with_any_port() {
    let server = MockServer::start().await;
    let client = default_client();

    let (session, handle) = client
        .connect(
            &server.url(),
            "127.0.0.1:0",
            IdentityToken::Anonymous,
            CONNECT_TIMEOUT,
        )
        .await
        .unwrap();

    let peer = server.observed(|o| o.peers[0]);
    assert_eq!(peer.ip(), Ipv4Addr::LOCALHOST);
    assert_ne!(peer.port(), 0);
    // The session knows which port the system picked
    assert_eq!(session.source_address(), Some(peer));

    session.disconnect().await.unwrap();
    let _ = handle.await;
}

#[tokio::test]
async fn read_server_time() {
    let server = MockServer::start().await;
    let client = default_client();
    let (session, handle) = client
        .connect(&server.url(), "", IdentityToken::Anonymous, CONNECT_TIMEOUT)
        .await
        .unwrap();

    let node_id: NodeId = VariableId::Server_ServerStatus_CurrentTime.into();
    let value = session.read_node(&node_id).await.unwrap();
    assert!(matches!(value.value, Some(Variant::DateTime(_))));

    let missing = session.read_node(&NodeId::new(2, "missing")).await.unwrap();
    assert_eq!(missing.status, Some(StatusCode::BadNodeIdUnknown));

    session.disconnect().await.unwrap();
    let _ = handle.await;
}

#[tokio::test]
async fn user_name_login() {
    let server = MockServer::start().await;
    let client = default_client();
    let (session, handle) = client
        .connect(
            &server.url(),
            "127.0.0.1:0",
            IdentityToken::UserName(USER_NAME.to_string(), PASSWORD.to_string()),
            CONNECT_TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(
        server.observed(|o| o.identities.clone()),
        vec![format!("username:{}", USER_NAME)]
    );
    session.disconnect().await.unwrap();
    let _ = handle.await;
}

#[tokio::test]
async fn configured_endpoint_and_user() {
    let server = MockServer::start().await;
    let mut endpoint = ClientEndpoint::new(server.url())
        .with_local_address("127.0.0.1:0".parse::<LocalAddress>().unwrap());
    endpoint.user_token_id = "operator".to_string();
    let client = test_client()
        .endpoint("device", endpoint)
        .default_endpoint("device")
        .user_token("operator", ClientUserToken::user_pass(USER_NAME, PASSWORD))
        .client()
        .unwrap();

    let (session, event_loop) = client.new_session(None).unwrap();
    let handle = event_loop.spawn();
    assert!(session.wait_for_connection().await);
    assert_eq!(server.observed(|o| o.sessions_activated), 1);

    session.disconnect().await.unwrap();
    let _ = handle.await;
}

#[tokio::test]
async fn bad_password_is_rejected() {
    let server = MockServer::start().await;
    let client = test_client().auto_reconnect(false).client().unwrap();
    let res = client
        .connect(
            &server.url(),
            "127.0.0.1:0",
            IdentityToken::UserName(USER_NAME.to_string(), "wrong".to_string()),
            CONNECT_TIMEOUT,
        )
        .await;
    assert_eq!(res.err(), Some(StatusCode::BadIdentityTokenRejected));
}

#[tokio::test]
async fn hello_rejected() {
    let server = MockServer::start().await;
    server.set_behaviour(|b| b.reject_hello = Some(StatusCode::BadTcpEndpointUrlInvalid));
    let client = test_client().auto_reconnect(false).client().unwrap();
    let res = client
        .connect(
            &server.url(),
            "127.0.0.1:0",
            IdentityToken::Anonymous,
            CONNECT_TIMEOUT,
        )
        .await;
    assert_eq!(res.err(), Some(StatusCode::BadTcpEndpointUrlInvalid));
}

#[tokio::test]
async fn unreachable_server_fails_fast() {
    // Reconnects are on, but they only apply once a session existed
    let client = default_client();
    let url = format!("opc.tcp://127.0.0.1:{}/", utils::free_local_port());
    let start = Instant::now();
    let res = client
        .connect(&url, "127.0.0.1:0", IdentityToken::Anonymous, CONNECT_TIMEOUT)
        .await;
    assert_eq!(res.err(), Some(StatusCode::BadCommunicationError));
    assert!(start.elapsed() < utils::DIAL_TIMEOUT);
}

#[tokio::test]
async fn event_loop_ends_on_first_failure() {
    let client = default_client();
    let url = format!("opc.tcp://127.0.0.1:{}/", utils::free_local_port());
    let endpoint = ClientEndpoint::new(url)
        .with_local_address("127.0.0.1:0".parse::<LocalAddress>().unwrap());
    let (session, event_loop) = client
        .new_session_from_endpoint(&endpoint, IdentityToken::Anonymous)
        .unwrap();

    let status = tokio::time::timeout(CONNECT_TIMEOUT, event_loop.run())
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BadCommunicationError);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn disconnect_closes_session() {
    let server = MockServer::start().await;
    let client = default_client();
    let (session, handle) = client
        .connect(&server.url(), "127.0.0.1:0", IdentityToken::Anonymous, CONNECT_TIMEOUT)
        .await
        .unwrap();

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(server.observed(|o| o.sessions_closed), 1);
    assert!(session.server_session_id().is_null());

    // A closed transport is a normal end of the event loop
    let status = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(status.is_good());
}

#[tokio::test]
async fn reconnect_reactivates_session() {
    let server = MockServer::start().await;
    let client = default_client();
    let (session, handle) = client
        .connect(&server.url(), "127.0.0.1:0", IdentityToken::Anonymous, CONNECT_TIMEOUT)
        .await
        .unwrap();
    let session_id = session.server_session_id();

    server.drop_connections();
    wait_until(|| server.observed(|o| o.sessions_activated) == 2).await;
    assert!(session.wait_for_connection().await);

    // Same session on a new connection
    assert_eq!(server.observed(|o| o.sessions_created), 1);
    assert_eq!(session.server_session_id(), session_id);
    assert_eq!(server.observed(|o| o.peers.len()), 2);
    assert_eq!(session.source_address(), server.observed(|o| o.peers.last().copied()));

    let node_id: NodeId = VariableId::Server_ServerStatus_CurrentTime.into();
    session.read_node(&node_id).await.unwrap();

    session.disconnect().await.unwrap();
    let _ = handle.await;
}

#[tokio::test]
async fn event_loop_reports_keep_alive() {
    let server = MockServer::start().await;
    let client = test_client().client().unwrap();
    let endpoint = ClientEndpoint::new(server.url())
        .with_local_address("127.0.0.1:0".parse::<LocalAddress>().unwrap());
    let (_session, event_loop) = client
        .new_session_from_endpoint(&endpoint, IdentityToken::Anonymous)
        .unwrap();

    let mut stream = Box::pin(event_loop.enter());
    assert!(matches!(
        next_poll(&mut stream).await,
        SessionPollResult::BeginConnect
    ));
    let mut connected = false;
    let mut succeeded = false;
    loop {
        match next_poll(&mut stream).await {
            SessionPollResult::Reconnected(SessionConnectMode::NewSession(_)) => {
                connected = true;
            }
            SessionPollResult::SessionActivity(SessionActivity::KeepAliveSucceeded) => {
                assert!(connected);
                succeeded = true;
                server.set_behaviour(|b| b.server_state = ServerState::Suspended);
            }
            SessionPollResult::SessionActivity(SessionActivity::KeepAliveFailed(status)) => {
                assert!(succeeded);
                assert_eq!(status, StatusCode::BadServerHalted);
                break;
            }
            _ => {}
        }
    }
}

async fn next_poll(
    stream: &mut (impl Stream<Item = Result<SessionPollResult, StatusCode>> + Unpin),
) -> SessionPollResult {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}
