// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use crate::types::{
    data_types::*, date_time::DateTime, diagnostic_info::DiagnosticInfo,
    extension_object::ExtensionObject, request_header::RequestHeader, status_code::StatusCode,
    string::UAString,
};

ua_struct! {
    /// Common to every response from a server to a client.
    ResponseHeader {
        timestamp: UtcTime,
        request_handle: IntegerId,
        service_result: StatusCode,
        service_diagnostics: DiagnosticInfo,
        string_table: Option<Vec<UAString>>,
        additional_header: ExtensionObject,
    }
}

impl ResponseHeader {
    pub fn new_good(request_header: &RequestHeader) -> ResponseHeader {
        ResponseHeader::new_service_result(request_header, StatusCode::Good)
    }

    pub fn new_service_result(
        request_header: &RequestHeader,
        service_result: StatusCode,
    ) -> ResponseHeader {
        ResponseHeader {
            timestamp: DateTime::now(),
            request_handle: request_header.request_handle,
            service_result,
            ..Default::default()
        }
    }
}
