// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! OPC UA client connections for multi-homed hosts.
//!
//! A host with several network cards may reach a different device through each card, even when
//! every device answers on the same remote address (e.g. `opc.tcp://192.168.100.1:4840`). The
//! operating system's routing table cannot tell those devices apart, so the client has to pick the
//! local address (and optionally the interface) that the TCP connection leaves through.
//!
//! This crate provides:
//!
//! * [`types`] and [`core`] - the OPC UA binary encoding and UA TCP framing needed by a client
//!   using security policy `None`.
//! * [`net`] - parsing of local addresses, a [`net::Dialer`] that binds before connecting, and
//!   enumeration of the host's interface addresses.
//! * [`client`] - a session based client whose transport is bound to a local address.
//! * [`manager`] - a connection manager that connects several devices, health checks them
//!   periodically and shuts them down together.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use opcua_multihomed::client::{ClientBuilder, IdentityToken};
//! use opcua_multihomed::types::{NodeId, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StatusCode> {
//!     let client = ClientBuilder::new()
//!         .application_name("Multi-homed Client")
//!         .application_uri("urn:MultiHomedClient")
//!         .dial_timeout(Duration::from_secs(10))
//!         .client()
//!         .ok_or(StatusCode::BadConfigurationError)?;
//!
//!     // Leave through the card that owns 192.168.100.10
//!     let (session, _handle) = client
//!         .connect(
//!             "opc.tcp://192.168.100.1:4840",
//!             "192.168.100.10:0",
//!             IdentityToken::Anonymous,
//!             Duration::from_secs(10),
//!         )
//!         .await?;
//!
//!     let value = session.read_node(&NodeId::new(0, 2258u32)).await?;
//!     println!("Server time {:?}", value.value);
//!     session.disconnect().await
//! }
//! ```

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;

/// Tracing macro for obtaining a lock on a `Mutex`. Sometimes deadlocks can happen in code,
/// and if they do, this macro is useful for finding out where they happened.
#[macro_export]
macro_rules! trace_lock {
    ( $x:expr ) => {{
        //            use std::thread;
        //            trace!("Thread {:?}, {} locking at {}, line {}", thread::current().id(), stringify!($x), file!(), line!());
        let v = $x.lock();
        //            trace!("Thread {:?}, {} lock completed", thread::current().id(), stringify!($x));
        v
    }};
}

/// Tracing macro for obtaining a read lock on a `RwLock`.
#[macro_export]
macro_rules! trace_read_lock {
    ( $x:expr ) => {{
        let v = $x.read();
        v
    }};
}

/// Tracing macro for obtaining a write lock on a `RwLock`.
#[macro_export]
macro_rules! trace_write_lock {
    ( $x:expr ) => {{
        let v = $x.write();
        v
    }};
}

pub mod client;
#[cfg(feature = "console-logging")]
pub mod console_logging;
pub mod core;
pub mod manager;
pub mod net;
pub mod sync;
pub mod types;
