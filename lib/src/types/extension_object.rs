// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `ExtensionObject`.

use std::io::{Cursor, Read, Write};

use serde::{Deserialize, Serialize};

use crate::types::{
    byte_string::ByteString, encoding::*, node_id::NodeId, status_code::StatusCode,
    string::XmlElement,
};

/// How the body of an extension object is encoded.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub enum ExtensionObjectEncoding {
    None,
    ByteString(ByteString),
    XmlElement(XmlElement),
}

/// A structure serialized into a body and identified by the node id of its encoding.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionObject {
    pub node_id: NodeId,
    pub body: ExtensionObjectEncoding,
}

impl Default for ExtensionObject {
    fn default() -> Self {
        Self::null()
    }
}

impl BinaryEncoder<ExtensionObject> for ExtensionObject {
    fn byte_len(&self) -> usize {
        self.node_id.byte_len()
            + match &self.body {
                ExtensionObjectEncoding::None => 1,
                ExtensionObjectEncoding::ByteString(value) => 1 + value.byte_len(),
                ExtensionObjectEncoding::XmlElement(value) => 1 + value.byte_len(),
            }
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.node_id.encode(stream)?;
        match &self.body {
            ExtensionObjectEncoding::None => {
                size += write_u8(stream, 0x0)?;
            }
            ExtensionObjectEncoding::ByteString(value) => {
                size += write_u8(stream, 0x1)?;
                size += value.encode(stream)?;
            }
            ExtensionObjectEncoding::XmlElement(value) => {
                size += write_u8(stream, 0x2)?;
                size += value.encode(stream)?;
            }
        }
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let _depth_lock = decoding_options.depth_lock()?;
        let node_id = NodeId::decode(stream, decoding_options)?;
        let encoding_type = read_u8(stream)?;
        let body = match encoding_type {
            0x0 => ExtensionObjectEncoding::None,
            0x1 => ExtensionObjectEncoding::ByteString(ByteString::decode(stream, decoding_options)?),
            0x2 => ExtensionObjectEncoding::XmlElement(XmlElement::decode(stream, decoding_options)?),
            _ => {
                error!("Invalid encoding type {} in stream", encoding_type);
                return Err(StatusCode::BadDecodingError);
            }
        };
        Ok(ExtensionObject { node_id, body })
    }
}

impl ExtensionObject {
    pub fn null() -> ExtensionObject {
        ExtensionObject {
            node_id: NodeId::null(),
            body: ExtensionObjectEncoding::None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.node_id.is_null()
    }

    pub fn is_empty(&self) -> bool {
        self.is_null() || matches!(self.body, ExtensionObjectEncoding::None)
    }

    /// Wraps an encodable structure, binary encoded, under the given encoding id.
    pub fn from_encodable<N, T>(node_id: N, encodable: &T) -> ExtensionObject
    where
        N: Into<NodeId>,
        T: BinaryEncoder<T>,
    {
        ExtensionObject {
            node_id: node_id.into(),
            body: ExtensionObjectEncoding::ByteString(ByteString::from(encodable.encode_to_vec())),
        }
    }

    /// Decodes the binary body as `T`. The caller is expected to have checked the node id.
    pub fn decode_inner<T>(&self, decoding_options: &DecodingOptions) -> EncodingResult<T>
    where
        T: BinaryEncoder<T>,
    {
        match &self.body {
            ExtensionObjectEncoding::ByteString(ByteString { value: Some(value) }) => {
                T::decode(&mut Cursor::new(value), decoding_options)
            }
            _ => {
                error!("decode_inner called on an extension object without a binary body");
                Err(StatusCode::BadDecodingError)
            }
        }
    }
}
