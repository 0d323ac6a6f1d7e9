// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `Variant`.

use std::{
    fmt,
    io::{Read, Write},
};

use serde::{Deserialize, Serialize};

use crate::types::{
    byte_string::ByteString,
    date_time::DateTime,
    encoding::*,
    extension_object::ExtensionObject,
    guid::Guid,
    localized_text::LocalizedText,
    node_id::{ExpandedNodeId, NodeId},
    qualified_name::QualifiedName,
    status_code::StatusCode,
    string::{UAString, XmlElement},
};

const ARRAY_VALUES_BIT: u8 = 0x80;
const ARRAY_DIMENSIONS_BIT: u8 = 0x40;
const TYPE_ID_MASK: u8 = 0x3f;

// Built-in type ids that may only appear as array elements (Variant) or never inside a
// variant in this crate (DataValue, DiagnosticInfo).
const DATA_VALUE_TYPE_ID: u8 = 23;
const VARIANT_TYPE_ID: u8 = 24;
const DIAGNOSTIC_INFO_TYPE_ID: u8 = 25;

macro_rules! variant_types {
    ( $( $name:ident($t:ty) = $id:literal ),* $(,)? ) => {
        /// A union of the built-in types. Arrays are one-dimensional, with optional dimensions
        /// carried through untouched.
        #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
        pub enum Variant {
            Empty,
            $( $name($t), )*
            Array(Box<Array>),
        }

        /// The type of a variant without its payload.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum VariantTypeId {
            Empty,
            $( $name, )*
            /// Only valid as the element type of an array
            Variant,
        }

        impl VariantTypeId {
            /// The built-in type id written in the low bits of the encoding mask.
            pub fn encoding_mask(&self) -> u8 {
                match self {
                    VariantTypeId::Empty => 0,
                    $( VariantTypeId::$name => $id, )*
                    VariantTypeId::Variant => VARIANT_TYPE_ID,
                }
            }

            pub fn from_encoding_mask(encoding_mask: u8) -> Result<Self, StatusCode> {
                match encoding_mask & TYPE_ID_MASK {
                    0 => Ok(VariantTypeId::Empty),
                    $( $id => Ok(VariantTypeId::$name), )*
                    VARIANT_TYPE_ID => Ok(VariantTypeId::Variant),
                    other => {
                        error!("Unrecognized or unsupported variant type id {}", other);
                        Err(StatusCode::BadDecodingError)
                    }
                }
            }
        }

        impl Variant {
            pub fn type_id(&self) -> VariantTypeId {
                match self {
                    Variant::Empty => VariantTypeId::Empty,
                    $( Variant::$name(_) => VariantTypeId::$name, )*
                    Variant::Array(array) => array.value_type,
                }
            }

            fn byte_len_value(&self) -> usize {
                match self {
                    Variant::Empty => 0,
                    $( Variant::$name(value) => value.byte_len(), )*
                    Variant::Array(array) => array.byte_len_values(),
                }
            }

            fn encode_value<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
                match self {
                    Variant::Empty => Ok(0),
                    $( Variant::$name(value) => value.encode(stream), )*
                    Variant::Array(array) => array.encode_values(stream),
                }
            }

            fn decode_value<S: Read>(
                stream: &mut S,
                type_id: VariantTypeId,
                decoding_options: &DecodingOptions,
            ) -> EncodingResult<Variant> {
                match type_id {
                    VariantTypeId::Empty => Ok(Variant::Empty),
                    $( VariantTypeId::$name => Ok(Variant::$name(<$t>::decode(stream, decoding_options)?)), )*
                    VariantTypeId::Variant => Variant::decode(stream, decoding_options),
                }
            }
        }
    };
}

variant_types! {
    Boolean(bool) = 1,
    SByte(i8) = 2,
    Byte(u8) = 3,
    Int16(i16) = 4,
    UInt16(u16) = 5,
    Int32(i32) = 6,
    UInt32(u32) = 7,
    Int64(i64) = 8,
    UInt64(u64) = 9,
    Float(f32) = 10,
    Double(f64) = 11,
    String(UAString) = 12,
    DateTime(DateTime) = 13,
    Guid(Guid) = 14,
    ByteString(ByteString) = 15,
    XmlElement(XmlElement) = 16,
    NodeId(NodeId) = 17,
    ExpandedNodeId(ExpandedNodeId) = 18,
    StatusCode(StatusCode) = 19,
    QualifiedName(QualifiedName) = 20,
    LocalizedText(LocalizedText) = 21,
    ExtensionObject(ExtensionObject) = 22,
}

/// A one-dimensional array of values that all share `value_type`.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Array {
    pub value_type: VariantTypeId,
    pub values: Vec<Variant>,
    pub dimensions: Option<Vec<i32>>,
}

impl Array {
    pub fn new(value_type: VariantTypeId, values: Vec<Variant>) -> Result<Array, StatusCode> {
        let valid = match value_type {
            VariantTypeId::Empty => false,
            VariantTypeId::Variant => true,
            value_type => values
                .iter()
                .all(|v| !v.is_array() && v.type_id() == value_type),
        };
        if valid {
            Ok(Array {
                value_type,
                values,
                dimensions: None,
            })
        } else {
            error!("Array of {:?} contains values of a different type", value_type);
            Err(StatusCode::BadInvalidArgument)
        }
    }

    fn byte_len_values(&self) -> usize {
        let values: usize = self
            .values
            .iter()
            .map(|v| self.byte_len_element(v))
            .sum();
        4 + values
            + self
                .dimensions
                .as_ref()
                .map_or(0, |d| 4 + d.len() * 4)
    }

    fn byte_len_element(&self, value: &Variant) -> usize {
        if self.value_type == VariantTypeId::Variant {
            value.byte_len()
        } else {
            value.byte_len_value()
        }
    }

    fn encode_values<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = write_i32(stream, self.values.len() as i32)?;
        for value in &self.values {
            size += if self.value_type == VariantTypeId::Variant {
                value.encode(stream)?
            } else {
                value.encode_value(stream)?
            };
        }
        if self.dimensions.is_some() {
            size += write_array(stream, &self.dimensions)?;
        }
        Ok(size)
    }
}

impl BinaryEncoder<Variant> for Variant {
    fn byte_len(&self) -> usize {
        1 + self.byte_len_value()
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let size = write_u8(stream, self.encoding_mask())?;
        Ok(size + self.encode_value(stream)?)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let _depth_lock = decoding_options.depth_lock()?;
        let encoding_mask = read_u8(stream)?;
        let type_id_bits = encoding_mask & TYPE_ID_MASK;
        if type_id_bits == DATA_VALUE_TYPE_ID || type_id_bits == DIAGNOSTIC_INFO_TYPE_ID {
            error!("Variant of type {} is not supported", type_id_bits);
            return Err(StatusCode::BadDecodingError);
        }
        let type_id = VariantTypeId::from_encoding_mask(encoding_mask)?;

        if encoding_mask & ARRAY_VALUES_BIT == 0 {
            if type_id == VariantTypeId::Variant {
                error!("A variant cannot contain a scalar variant");
                return Err(StatusCode::BadDecodingError);
            }
            return Variant::decode_value(stream, type_id, decoding_options);
        }

        let len = read_i32(stream)?;
        if len < -1 {
            error!("Invalid variant array length {}", len);
            return Err(StatusCode::BadDecodingError);
        }
        let len = len.max(0) as usize;
        if len > decoding_options.max_array_length {
            error!(
                "Variant array length {} exceeds decoding limit {}",
                len, decoding_options.max_array_length
            );
            return Err(StatusCode::BadDecodingError);
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(Variant::decode_value(stream, type_id, decoding_options)?);
        }
        let dimensions = if encoding_mask & ARRAY_DIMENSIONS_BIT != 0 {
            read_array::<_, i32>(stream, decoding_options)?
        } else {
            None
        };
        Ok(Variant::Array(Box::new(Array {
            value_type: type_id,
            values,
            dimensions,
        })))
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Empty
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "Empty"),
            Variant::Boolean(v) => write!(f, "{}", v),
            Variant::SByte(v) => write!(f, "{}", v),
            Variant::Byte(v) => write!(f, "{}", v),
            Variant::Int16(v) => write!(f, "{}", v),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int64(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) | Variant::XmlElement(v) => write!(f, "{}", v),
            Variant::DateTime(v) => write!(f, "{}", v),
            Variant::Guid(v) => write!(f, "{}", v),
            Variant::ByteString(v) => write!(f, "ByteString({} bytes)", v.as_ref().len()),
            Variant::NodeId(v) => write!(f, "{}", v),
            Variant::ExpandedNodeId(v) => write!(f, "{}", v),
            Variant::StatusCode(v) => write!(f, "{}", v),
            Variant::QualifiedName(v) => write!(f, "{}:{}", v.namespace_index, v.name),
            Variant::LocalizedText(v) => write!(f, "{}", v),
            Variant::ExtensionObject(v) => write!(f, "ExtensionObject({})", v.node_id),
            Variant::Array(array) => {
                write!(f, "[")?;
                for (i, value) in array.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! from_scalar {
    ( $( $t:ty => $name:ident ),* ) => {
        $(
            impl From<$t> for Variant {
                fn from(v: $t) -> Self {
                    Variant::$name(v.into())
                }
            }
        )*
    };
}

from_scalar! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    &str => String,
    String => String,
    UAString => String,
    DateTime => DateTime,
    Guid => Guid,
    ByteString => ByteString,
    NodeId => NodeId,
    ExpandedNodeId => ExpandedNodeId,
    StatusCode => StatusCode,
    QualifiedName => QualifiedName,
    LocalizedText => LocalizedText,
    ExtensionObject => ExtensionObject
}

impl From<Array> for Variant {
    fn from(v: Array) -> Self {
        Variant::Array(Box::new(v))
    }
}

impl Variant {
    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array(_))
    }

    /// Integer content widened to i64, for any of the integer types.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Variant::SByte(v) => Some(i64::from(v)),
            Variant::Byte(v) => Some(i64::from(v)),
            Variant::Int16(v) => Some(i64::from(v)),
            Variant::UInt16(v) => Some(i64::from(v)),
            Variant::Int32(v) => Some(i64::from(v)),
            Variant::UInt32(v) => Some(i64::from(v)),
            Variant::Int64(v) => Some(v),
            Variant::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<&DateTime> {
        match self {
            Variant::DateTime(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn encoding_mask(&self) -> u8 {
        match self {
            Variant::Array(array) => {
                let mut encoding_mask = array.value_type.encoding_mask() | ARRAY_VALUES_BIT;
                if array.dimensions.is_some() {
                    encoding_mask |= ARRAY_DIMENSIONS_BIT;
                }
                encoding_mask
            }
            value => value.type_id().encoding_mask(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn decode(bytes: Vec<u8>) -> EncodingResult<Variant> {
        Variant::decode(&mut Cursor::new(bytes), &DecodingOptions::default())
    }

    #[test]
    fn scalar_encoding() {
        let v = Variant::from(0u32);
        assert_eq!(v.encode_to_vec(), vec![7, 0, 0, 0, 0]);
        let v = Variant::from("Running");
        assert_eq!(decode(v.encode_to_vec()).unwrap(), v);
        assert_eq!(Variant::Empty.encode_to_vec(), vec![0]);
    }

    #[test]
    fn array_encoding() {
        let array = Array::new(
            VariantTypeId::Int32,
            vec![Variant::from(1i32), Variant::from(-1i32)],
        )
        .unwrap();
        let v = Variant::from(array);
        let bytes = v.encode_to_vec();
        assert_eq!(bytes[0], 6 | ARRAY_VALUES_BIT);
        assert_eq!(bytes.len(), v.byte_len());
        assert_eq!(decode(bytes).unwrap(), v);
    }

    #[test]
    fn array_of_variants() {
        let array = Array::new(
            VariantTypeId::Variant,
            vec![Variant::from(true), Variant::from("x")],
        )
        .unwrap();
        let v = Variant::from(array);
        assert_eq!(decode(v.encode_to_vec()).unwrap(), v);
    }

    #[test]
    fn mixed_array_rejected() {
        assert_eq!(
            Array::new(
                VariantTypeId::Int32,
                vec![Variant::from(1i32), Variant::from(1u32)]
            ),
            Err(StatusCode::BadInvalidArgument)
        );
    }

    #[test]
    fn unsupported_types_rejected() {
        // scalar variant inside a variant
        assert_eq!(decode(vec![24, 1, 1]), Err(StatusCode::BadDecodingError));
        // DataValue and DiagnosticInfo
        assert_eq!(decode(vec![23, 0]), Err(StatusCode::BadDecodingError));
        assert_eq!(decode(vec![25, 0]), Err(StatusCode::BadDecodingError));
        assert_eq!(decode(vec![0x3f]), Err(StatusCode::BadDecodingError));
    }
}
