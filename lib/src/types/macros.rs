// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Declarative generators for the structures and enumerations of the service layer. Fields are
//! encoded in declaration order, which must match the order in the OPC UA binary schema.

/// Declares a structure whose binary encoding is the concatenation of its fields. An optional
/// `: ObjectIdName` names the default binary encoding id and implements `MessageInfo`.
macro_rules! ua_struct {
    (
        $(#[$meta:meta])*
        $name:ident $( : $object_id:ident )? {
            $( $(#[$field_meta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            $( $(#[$field_meta])* pub $field: $ty, )*
        }

        impl $crate::types::encoding::BinaryEncoder<$name> for $name {
            fn byte_len(&self) -> usize {
                0 $( + <$ty as $crate::types::encoding::BinaryEncoder<$ty>>::byte_len(&self.$field) )*
            }

            #[allow(unused_mut)]
            fn encode<S: std::io::Write>(
                &self,
                stream: &mut S,
            ) -> $crate::types::encoding::EncodingResult<usize> {
                let mut size = 0;
                $(
                    size += <$ty as $crate::types::encoding::BinaryEncoder<$ty>>::encode(
                        &self.$field,
                        stream,
                    )?;
                )*
                Ok(size)
            }

            #[allow(unused_variables)]
            fn decode<S: std::io::Read>(
                stream: &mut S,
                decoding_options: &$crate::types::encoding::DecodingOptions,
            ) -> $crate::types::encoding::EncodingResult<Self> {
                $(
                    let $field = <$ty as $crate::types::encoding::BinaryEncoder<$ty>>::decode(
                        stream,
                        decoding_options,
                    )?;
                )*
                Ok($name { $( $field, )* })
            }
        }

        $(
            impl $crate::types::service_types::MessageInfo for $name {
                fn object_id(&self) -> $crate::types::node_ids::ObjectId {
                    $crate::types::node_ids::ObjectId::$object_id
                }
            }
        )?
    };
}

/// Declares an enumeration encoded on the wire as an Int32.
macro_rules! ua_enum {
    (
        $(#[$meta:meta])*
        $name:ident ( default $default:ident ) {
            $( $(#[$variant_meta:meta])* $variant:ident = $value:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$variant_meta])* $variant = $value, )*
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::convert::TryFrom<i32> for $name {
            type Error = $crate::types::status_code::StatusCode;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok($name::$variant), )*
                    _ => {
                        error!("Invalid value {} for enum {}", value, stringify!($name));
                        Err($crate::types::status_code::StatusCode::BadDecodingError)
                    }
                }
            }
        }

        impl $crate::types::encoding::BinaryEncoder<$name> for $name {
            fn byte_len(&self) -> usize {
                4
            }

            fn encode<S: std::io::Write>(
                &self,
                stream: &mut S,
            ) -> $crate::types::encoding::EncodingResult<usize> {
                $crate::types::encoding::write_i32(stream, *self as i32)
            }

            fn decode<S: std::io::Read>(
                stream: &mut S,
                _decoding_options: &$crate::types::encoding::DecodingOptions,
            ) -> $crate::types::encoding::EncodingResult<Self> {
                use std::convert::TryFrom;
                $name::try_from($crate::types::encoding::read_i32(stream)?)
            }
        }
    };
}
