// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Functionality shared by anything speaking OPC UA TCP: message chunking, the secure channel,
//! the socket codec, configuration and handles.

/// Unwraps a `SupportedMessage` into the boxed message of the named variant, or returns
/// `BadUnknownResponse` from the enclosing function.
#[macro_export]
macro_rules! supported_message_as {
    ($v: expr, $i: ident) => {
        match $v {
            $crate::core::supported_message::SupportedMessage::$i(value) => *value,
            other => {
                error!(
                    "Expected a {} but got {:?}",
                    stringify!($i),
                    other.object_id()
                );
                return Err($crate::types::StatusCode::BadUnknownResponse);
            }
        }
    };
}

/// Contains debugging utility helper functions
pub mod debug {
    /// Prints out the content of a slice in hex and visible char format to aid debugging.
    pub fn log_buffer(message: &str, buf: &[u8]) {
        if !log_enabled!(target: "hex", log::Level::Trace) {
            return;
        }
        trace!(target: "hex", "{}", message);

        const LINE_LEN: usize = 32;
        for (line, bytes) in buf.chunks(LINE_LEN).enumerate() {
            let hex: String = bytes.iter().map(|b| format!(" {:02x}", b)).collect();
            let chars: String = bytes
                .iter()
                .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
                .collect();
            let padding = "   ".repeat(LINE_LEN - bytes.len());
            trace!(target: "hex", "{:08x}:{}{} {}", line * LINE_LEN, hex, padding, chars);
        }
    }
}

pub mod constants {
    /// Default OPC UA port number, implied by an `opc.tcp://` url without a port.
    pub const DEFAULT_OPC_UA_SERVER_PORT: u16 = 4840;
}

pub mod comms;
pub mod config;
pub mod handle;
pub mod supported_message;

/// Contains most of the things that are typically required from a client.
pub mod prelude {
    pub use super::{comms::prelude::*, config::Config, supported_message::*};
    pub use crate::types::*;
}
