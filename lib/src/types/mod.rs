// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OPC UA built-in types, the service structures built on them and their binary encoding.

#[macro_use]
mod macros;

pub mod basic_types;
pub mod byte_string;
pub mod constants;
pub mod data_types;
pub mod data_value;
pub mod date_time;
pub mod diagnostic_info;
pub mod encoding;
pub mod extension_object;
pub mod guid;
pub mod localized_text;
pub mod node_id;
pub mod node_ids;
pub mod qualified_name;
pub mod request_header;
pub mod response_header;
pub mod service_types;
pub mod status_code;
pub mod string;
pub mod variant;

pub use self::{
    byte_string::ByteString,
    data_types::*,
    data_value::DataValue,
    date_time::{DateTime, DateTimeUtc},
    diagnostic_info::DiagnosticInfo,
    encoding::{BinaryEncoder, DecodingOptions, EncodingResult},
    extension_object::{ExtensionObject, ExtensionObjectEncoding},
    guid::Guid,
    localized_text::LocalizedText,
    node_id::{ExpandedNodeId, Identifier, NodeId},
    node_ids::{ObjectId, VariableId},
    qualified_name::QualifiedName,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    service_types::*,
    status_code::StatusCode,
    string::{UAString, XmlElement},
    variant::{Array, Variant, VariantTypeId},
};
