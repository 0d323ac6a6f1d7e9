// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `NodeId` and `ExpandedNodeId`.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{
    byte_string::ByteString, encoding::*, guid::Guid, status_code::StatusCode,
    string::UAString,
};

/// The kind of identifier, numeric, string, guid or byte
#[derive(Eq, PartialEq, Clone, Debug, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(UAString),
    Guid(Guid),
    ByteString(ByteString),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={}", v),
            Identifier::String(v) => write!(f, "s={}", v),
            Identifier::Guid(v) => write!(f, "g={}", v),
            Identifier::ByteString(v) => write!(f, "b={}", hex_string(v.as_ref())),
        }
    }
}

impl FromStr for Identifier {
    type Err = StatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s.split_at(s.len().min(2));
        match kind {
            "i=" => value
                .parse::<u32>()
                .map(Identifier::Numeric)
                .map_err(|_| StatusCode::BadNodeIdInvalid),
            "s=" if !value.is_empty() => Ok(Identifier::String(UAString::from(value))),
            "g=" => Guid::from_str(value)
                .map(Identifier::Guid)
                .map_err(|_| StatusCode::BadNodeIdInvalid),
            "b=" => parse_hex(value)
                .map(|v| Identifier::ByteString(ByteString::from(v)))
                .ok_or(StatusCode::BadNodeIdInvalid),
            _ => Err(StatusCode::BadNodeIdInvalid),
        }
    }
}

// Opaque identifiers are written as hex so that no base64 dependency is needed
fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

impl From<u32> for Identifier {
    fn from(v: u32) -> Self {
        Identifier::Numeric(v)
    }
}

impl<'a> From<&'a str> for Identifier {
    fn from(v: &'a str) -> Self {
        Identifier::String(UAString::from(v))
    }
}

impl From<String> for Identifier {
    fn from(v: String) -> Self {
        Identifier::String(UAString::from(v))
    }
}

impl From<UAString> for Identifier {
    fn from(v: UAString) -> Self {
        Identifier::String(v)
    }
}

impl From<Guid> for Identifier {
    fn from(v: Guid) -> Self {
        Identifier::Guid(v)
    }
}

impl From<ByteString> for Identifier {
    fn from(v: ByteString) -> Self {
        Identifier::ByteString(v)
    }
}

/// An identifier for a node in the address space of an OPC UA Server.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// The index for a namespace
    pub namespace: u16,
    /// The identifier for the node in the address space
    pub identifier: Identifier,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};{}", self.namespace, self.identifier)
        } else {
            write!(f, "{}", self.identifier)
        }
    }
}

impl BinaryEncoder<NodeId> for NodeId {
    fn byte_len(&self) -> usize {
        match &self.identifier {
            Identifier::Numeric(value) if self.namespace == 0 && *value <= 255 => 2,
            Identifier::Numeric(value) if self.namespace <= 255 && *value <= 65535 => 4,
            Identifier::Numeric(_) => 7,
            Identifier::String(value) => 3 + value.byte_len(),
            Identifier::Guid(value) => 3 + value.byte_len(),
            Identifier::ByteString(value) => 3 + value.byte_len(),
        }
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        self.encode_with_flags(stream, 0)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let encoding = read_u8(stream)?;
        Self::decode_with_encoding(stream, encoding, decoding_options)
    }
}

impl NodeId {
    /// Writes the node id, OR-ing `flags` into the encoding byte. `ExpandedNodeId` uses the two
    /// high bits to say a namespace uri or server index follows.
    fn encode_with_flags<S: Write>(&self, stream: &mut S, flags: u8) -> EncodingResult<usize> {
        let mut size = 0;
        match &self.identifier {
            Identifier::Numeric(value) if self.namespace == 0 && *value <= 255 => {
                // Two byte form
                size += write_u8(stream, flags)?;
                size += write_u8(stream, *value as u8)?;
            }
            Identifier::Numeric(value) if self.namespace <= 255 && *value <= 65535 => {
                // Four byte form
                size += write_u8(stream, flags | 0x1)?;
                size += write_u8(stream, self.namespace as u8)?;
                size += write_u16(stream, *value as u16)?;
            }
            Identifier::Numeric(value) => {
                size += write_u8(stream, flags | 0x2)?;
                size += write_u16(stream, self.namespace)?;
                size += write_u32(stream, *value)?;
            }
            Identifier::String(value) => {
                size += write_u8(stream, flags | 0x3)?;
                size += write_u16(stream, self.namespace)?;
                size += value.encode(stream)?;
            }
            Identifier::Guid(value) => {
                size += write_u8(stream, flags | 0x4)?;
                size += write_u16(stream, self.namespace)?;
                size += value.encode(stream)?;
            }
            Identifier::ByteString(value) => {
                size += write_u8(stream, flags | 0x5)?;
                size += write_u16(stream, self.namespace)?;
                size += value.encode(stream)?;
            }
        }
        Ok(size)
    }

    fn decode_with_encoding<S: Read>(
        stream: &mut S,
        encoding: u8,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let node_id = match encoding & 0x0f {
            0x0 => NodeId::new(0, u32::from(read_u8(stream)?)),
            0x1 => {
                let namespace = read_u8(stream)?;
                NodeId::new(u16::from(namespace), u32::from(read_u16(stream)?))
            }
            0x2 => {
                let namespace = read_u16(stream)?;
                NodeId::new(namespace, read_u32(stream)?)
            }
            0x3 => {
                let namespace = read_u16(stream)?;
                NodeId::new(namespace, UAString::decode(stream, decoding_options)?)
            }
            0x4 => {
                let namespace = read_u16(stream)?;
                NodeId::new(namespace, Guid::decode(stream, decoding_options)?)
            }
            0x5 => {
                let namespace = read_u16(stream)?;
                NodeId::new(namespace, ByteString::decode(stream, decoding_options)?)
            }
            other => {
                error!("Unrecognized node id type {}", other);
                return Err(StatusCode::BadDecodingError);
            }
        };
        Ok(node_id)
    }
}

impl FromStr for NodeId {
    type Err = StatusCode;

    /// Parses `ns=<namespaceindex>;<type>=<value>` where type is one of `i`, `s`, `g` or `b`.
    /// The `ns=0;` part may be omitted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^(ns=(?P<ns>[0-9]+);)?(?P<t>[isgb]=.+)$")
                .unwrap_or_else(|_| unreachable!());
        }

        let captures = RE.captures(s).ok_or(StatusCode::BadNodeIdInvalid)?;
        let namespace = match captures.name("ns") {
            Some(ns) => ns
                .as_str()
                .parse::<u16>()
                .map_err(|_| StatusCode::BadNodeIdInvalid)?,
            None => 0,
        };
        let identifier = captures
            .name("t")
            .ok_or(StatusCode::BadNodeIdInvalid)
            .and_then(|t| Identifier::from_str(t.as_str()))?;
        Ok(NodeId {
            namespace,
            identifier,
        })
    }
}

impl From<&NodeId> for NodeId {
    fn from(v: &NodeId) -> Self {
        v.clone()
    }
}

impl<'a> From<(u16, &'a str)> for NodeId {
    fn from(v: (u16, &'a str)) -> Self {
        Self::new(v.0, v.1)
    }
}

impl From<(u16, u32)> for NodeId {
    fn from(v: (u16, u32)) -> Self {
        Self::new(v.0, v.1)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::null()
    }
}

impl NodeId {
    pub fn new<T>(namespace: u16, value: T) -> NodeId
    where
        T: Into<Identifier>,
    {
        NodeId {
            namespace,
            identifier: value.into(),
        }
    }

    /// Test if the node id is null, i.e. 0 namespace and 0 identifier
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }

    pub fn null() -> NodeId {
        NodeId::new(0, 0u32)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.identifier, Identifier::Numeric(_))
    }

    /// Extracts the numeric id of a namespace 0 node, e.g. a service encoding id.
    pub fn as_ns0_numeric(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(id) if self.namespace == 0 => Some(id),
            _ => None,
        }
    }
}

/// A NodeId that allows the namespace URI to be specified instead of an index.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Default, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    pub node_id: NodeId,
    pub namespace_uri: UAString,
    pub server_index: u32,
}

impl BinaryEncoder<ExpandedNodeId> for ExpandedNodeId {
    fn byte_len(&self) -> usize {
        let mut size = self.node_id.byte_len();
        if !self.namespace_uri.is_null() {
            size += self.namespace_uri.byte_len();
        }
        if self.server_index != 0 {
            size += 4;
        }
        size
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut flags = 0;
        if !self.namespace_uri.is_null() {
            flags |= 0x80;
        }
        if self.server_index != 0 {
            flags |= 0x40;
        }
        let mut size = self.node_id.encode_with_flags(stream, flags)?;
        if !self.namespace_uri.is_null() {
            size += self.namespace_uri.encode(stream)?;
        }
        if self.server_index != 0 {
            size += self.server_index.encode(stream)?;
        }
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let encoding = read_u8(stream)?;
        let node_id = NodeId::decode_with_encoding(stream, encoding, decoding_options)?;
        let namespace_uri = if encoding & 0x80 != 0 {
            UAString::decode(stream, decoding_options)?
        } else {
            UAString::null()
        };
        let server_index = if encoding & 0x40 != 0 {
            read_u32(stream)?
        } else {
            0
        };
        Ok(ExpandedNodeId {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        ExpandedNodeId {
            node_id,
            namespace_uri: UAString::null(),
            server_index: 0,
        }
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            write!(f, "svr={};{}", self.server_index, self.node_id)
        } else {
            write!(
                f,
                "svr={};nsu={};{}",
                self.server_index,
                self.namespace_uri.as_ref().replace('%', "%25").replace(';', "%3b"),
                self.node_id.identifier
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn round_trip(node_id: &NodeId) -> NodeId {
        let bytes = node_id.encode_to_vec();
        assert_eq!(bytes.len(), node_id.byte_len());
        NodeId::decode(&mut Cursor::new(bytes), &DecodingOptions::default()).unwrap()
    }

    #[test]
    fn parse_node_ids() {
        assert_eq!(NodeId::from_str("i=2258").unwrap(), NodeId::new(0, 2258u32));
        assert_eq!(
            NodeId::from_str("ns=2;s=Device.Temperature").unwrap(),
            NodeId::new(2, "Device.Temperature")
        );
        assert_eq!(
            NodeId::from_str("ns=1;b=0aff").unwrap(),
            NodeId::new(1, ByteString::from(vec![0x0a, 0xff]))
        );
        assert!(NodeId::from_str("ns=1;g=72962b91-fa75-4ae6-8d28-b404dc7daf63")
            .unwrap()
            .identifier
            .ne(&Identifier::Numeric(0)));
        assert_eq!(NodeId::from_str("2258"), Err(StatusCode::BadNodeIdInvalid));
        assert_eq!(NodeId::from_str("ns=x;i=1"), Err(StatusCode::BadNodeIdInvalid));
        assert_eq!(NodeId::from_str("i=abc"), Err(StatusCode::BadNodeIdInvalid));
        assert_eq!(NodeId::from_str("ns=70000;i=1"), Err(StatusCode::BadNodeIdInvalid));
    }

    #[test]
    fn display_matches_parse() {
        for s in ["i=2256", "ns=3;s=Line 1", "ns=1;b=00ff"] {
            assert_eq!(NodeId::from_str(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn compact_encodings() {
        assert_eq!(NodeId::new(0, 255u32).encode_to_vec(), vec![0x00, 0xff]);
        assert_eq!(
            NodeId::new(5, 1025u32).encode_to_vec(),
            vec![0x01, 0x05, 0x01, 0x04]
        );
        assert_eq!(NodeId::new(300, 1u32).byte_len(), 7);
        for node_id in [
            NodeId::new(0, 2256u32),
            NodeId::new(1000, 0x1_0000u32),
            NodeId::new(2, "temperature"),
            NodeId::new(1, Guid::new()),
        ] {
            assert_eq!(round_trip(&node_id), node_id);
        }
    }

    #[test]
    fn expanded_node_id_flags() {
        let expanded = ExpandedNodeId {
            node_id: NodeId::new(0, 12u32),
            namespace_uri: UAString::from("urn:device"),
            server_index: 3,
        };
        let bytes = expanded.encode_to_vec();
        assert_eq!(bytes[0], 0xc0);
        assert_eq!(bytes.len(), expanded.byte_len());
        let decoded =
            ExpandedNodeId::decode(&mut Cursor::new(bytes), &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, expanded);
    }
}
