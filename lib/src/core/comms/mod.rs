// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains all code related to sending / receiving messages from a transport
//! and turning those messages into and out of chunks.

pub mod chunker;
pub mod message_chunk;
pub mod secure_channel;
pub mod security_header;
pub mod security_policy;
pub mod tcp_codec;
pub mod tcp_types;
pub mod url;

pub mod prelude {
    pub use super::chunker::*;
    pub use super::message_chunk::*;
    pub use super::secure_channel::*;
    pub use super::security_header::*;
    pub use super::security_policy::*;
    pub use super::tcp_codec::*;
    pub use super::tcp_types::*;
    pub use super::url::*;
}
