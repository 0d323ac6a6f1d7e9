// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The client side of UA TCP: a bound TCP connection, the send buffer, the table of requests in
//! flight and the secure channel wrapped around them.

mod buffer;
mod channel;
mod core;
mod state;
pub mod tcp;

pub use channel::{AsyncSecureChannel, SecureChannelEventLoop};
pub(crate) use core::OutgoingMessage;
pub use core::TransportPollResult;
pub use tcp::TransportConfiguration;
