// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use crate::types::{
    data_types::*, date_time::DateTime, extension_object::ExtensionObject, node_id::NodeId,
    string::UAString,
};

ua_struct! {
    /// Common to every request from a client to a server.
    RequestHeader {
        /// The secret session identifier. Null before a session is created.
        authentication_token: NodeId,
        timestamp: UtcTime,
        /// Client defined handle echoed in the response.
        request_handle: IntegerId,
        return_diagnostics: u32,
        audit_entry_id: UAString,
        /// Milliseconds. 0 means no timeout.
        timeout_hint: u32,
        additional_header: ExtensionObject,
    }
}

impl RequestHeader {
    pub fn new(
        authentication_token: &NodeId,
        timestamp: &DateTime,
        request_handle: IntegerId,
    ) -> RequestHeader {
        RequestHeader {
            authentication_token: authentication_token.clone(),
            timestamp: *timestamp,
            request_handle,
            ..Default::default()
        }
    }

    pub fn dummy() -> RequestHeader {
        RequestHeader::new(&NodeId::null(), &DateTime::now(), 1)
    }
}
