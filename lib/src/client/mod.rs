// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The client module contains what is needed to connect to an OPC UA server from a chosen local
//! address, activate a session and read values.
//!
//! A [`Client`] is made from a [`ClientConfig`], either built with a [`ClientBuilder`] or loaded
//! from a YAML file. Each [`ClientEndpoint`] names the server url and optionally the local address
//! and interface the connection leaves from. Only security policy `None` is supported.
//!
//! Creating a session returns a [`Session`] and a [`SessionEventLoop`]. Nothing happens until the
//! event loop is polled, usually by spawning it. The event loop opens the transport, creates and
//! activates the session, sends periodic keep-alive reads and reconnects according to the
//! [`SessionRetryPolicy`] when the connection drops.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use opcua_multihomed::client::{ClientBuilder, ClientEndpoint, IdentityToken};
//! use opcua_multihomed::types::{StatusCode, VariableId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StatusCode> {
//!     let client = ClientBuilder::new()
//!         .application_name("My First Client")
//!         .application_uri("urn:MyFirstClient")
//!         .auto_reconnect(true)
//!         .reconnect_interval(Duration::from_secs(5))
//!         .endpoint(
//!             "device_a",
//!             ClientEndpoint::new("opc.tcp://192.168.100.1:4840")
//!                 .with_local_address("192.168.100.10:0".parse()?),
//!         )
//!         .client()
//!         .ok_or(StatusCode::BadConfigurationError)?;
//!
//!     let (session, event_loop) = client.new_session(Some("device_a"))?;
//!     let handle = event_loop.spawn();
//!     session.wait_for_connection().await;
//!
//!     let state = session.read_node(&VariableId::Server_ServerStatus_State.into()).await?;
//!     println!("Server state {:?}", state.value);
//!
//!     session.disconnect().await?;
//!     let _ = handle.await;
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod retry;
mod session;
mod transport;

pub use builder::ClientBuilder;
pub use config::{
    ClientConfig, ClientEndpoint, ClientUserToken, DecodingOptions, ANONYMOUS_USER_TOKEN_ID,
};
pub use retry::SessionRetryPolicy;
pub use session::{
    Client, Session, SessionActivity, SessionConnectMode, SessionEventLoop, SessionInfo,
    SessionPollResult, SessionState,
};
pub use transport::{
    AsyncSecureChannel, SecureChannelEventLoop, TransportConfiguration, TransportPollResult,
};

/// The identity a session activates with.
#[derive(Debug, Clone)]
pub enum IdentityToken {
    /// Anonymous identity token
    Anonymous,
    /// User name and a password. The password is sent unencrypted over policy `None`.
    UserName(String, String),
}
