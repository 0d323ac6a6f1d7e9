// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

mod mock_server;

use std::time::Duration;

use opcua_multihomed::client::{Client, ClientBuilder};

pub use mock_server::*;

/// A client that gives up quickly, so failing tests fail fast.
#[allow(unused)]
pub fn test_client() -> ClientBuilder {
    ClientBuilder::new()
        .application_name("integration_client")
        .application_uri("urn:integration_client")
        .dial_timeout(DIAL_TIMEOUT)
        .request_timeout(Duration::from_secs(2))
        .keep_alive_interval(Duration::from_millis(200))
        .reconnect_interval(Duration::from_millis(100))
        .session_retry_limit(-1)
}

#[allow(unused)]
pub fn default_client() -> Client {
    test_client().client().unwrap()
}

#[allow(unused)]
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(unused)]
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(2);
