// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Every request and response this crate can put on or take off the wire, so that they can be
//! passed around without knowing which one is which.

use std::io::{Read, Write};

use crate::types::{encoding::*, node_id::NodeId, node_ids::ObjectId, service_types::*};

macro_rules! supported_messages {
    [ $( $request:ident : $request_id:ident => $response:ident : $response_id:ident ),* $(,)? ] => {
        #[derive(Debug, PartialEq, Clone)]
        pub enum SupportedMessage {
            /// A message whose encoding id is known but which this crate doesn't handle
            Invalid(ObjectId),
            ServiceFault(Box<ServiceFault>),
            $( $request(Box<$request>), $response(Box<$response>), )*
        }

        impl BinaryEncoder<SupportedMessage> for SupportedMessage {
            fn byte_len(&self) -> usize {
                match self {
                    SupportedMessage::Invalid(_) => 0,
                    SupportedMessage::ServiceFault(value) => value.byte_len(),
                    $(
                        SupportedMessage::$request(value) => value.byte_len(),
                        SupportedMessage::$response(value) => value.byte_len(),
                    )*
                }
            }

            fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
                match self {
                    SupportedMessage::Invalid(object_id) => {
                        error!("Unsupported message {:?} cannot be encoded", object_id);
                        Err(crate::types::StatusCode::BadEncodingError)
                    }
                    SupportedMessage::ServiceFault(value) => value.encode(stream),
                    $(
                        SupportedMessage::$request(value) => value.encode(stream),
                        SupportedMessage::$response(value) => value.encode(stream),
                    )*
                }
            }

            /// A message cannot be decoded without knowing its encoding id first, use
            /// `decode_by_object_id`.
            fn decode<S: Read>(_: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
                error!("Cannot decode a stream to a supported message type");
                Err(crate::types::StatusCode::BadDecodingError)
            }
        }

        impl SupportedMessage {
            pub fn object_id(&self) -> ObjectId {
                match self {
                    SupportedMessage::Invalid(object_id) => *object_id,
                    SupportedMessage::ServiceFault(value) => value.object_id(),
                    $(
                        SupportedMessage::$request(value) => value.object_id(),
                        SupportedMessage::$response(value) => value.object_id(),
                    )*
                }
            }

            pub fn request_handle(&self) -> u32 {
                match self {
                    SupportedMessage::Invalid(_) => 0,
                    SupportedMessage::ServiceFault(value) => value.response_header.request_handle,
                    $(
                        SupportedMessage::$request(value) => value.request_header.request_handle,
                        SupportedMessage::$response(value) => value.response_header.request_handle,
                    )*
                }
            }

            pub fn is_request(&self) -> bool {
                match self {
                    $( SupportedMessage::$request(_) => true, )*
                    _ => false,
                }
            }

            pub fn decode_by_object_id<S: Read>(
                stream: &mut S,
                object_id: ObjectId,
                decoding_options: &DecodingOptions,
            ) -> EncodingResult<Self> {
                trace!("decoding object_id {:?}", object_id);
                let message = match object_id {
                    ObjectId::ServiceFault_Encoding_DefaultBinary => {
                        ServiceFault::decode(stream, decoding_options)?.into()
                    }
                    $(
                        ObjectId::$request_id => $request::decode(stream, decoding_options)?.into(),
                        ObjectId::$response_id => $response::decode(stream, decoding_options)?.into(),
                    )*
                    _ => {
                        debug!("decoding unsupported for object id {:?}", object_id);
                        SupportedMessage::Invalid(object_id)
                    }
                };
                Ok(message)
            }
        }

        impl From<ServiceFault> for SupportedMessage {
            fn from(value: ServiceFault) -> Self {
                SupportedMessage::ServiceFault(Box::new(value))
            }
        }

        $(
            impl From<$request> for SupportedMessage {
                fn from(value: $request) -> Self {
                    SupportedMessage::$request(Box::new(value))
                }
            }

            impl From<$response> for SupportedMessage {
                fn from(value: $response) -> Self {
                    SupportedMessage::$response(Box::new(value))
                }
            }
        )*
    };
}

supported_messages![
    OpenSecureChannelRequest: OpenSecureChannelRequest_Encoding_DefaultBinary
        => OpenSecureChannelResponse: OpenSecureChannelResponse_Encoding_DefaultBinary,
    CloseSecureChannelRequest: CloseSecureChannelRequest_Encoding_DefaultBinary
        => CloseSecureChannelResponse: CloseSecureChannelResponse_Encoding_DefaultBinary,
    CreateSessionRequest: CreateSessionRequest_Encoding_DefaultBinary
        => CreateSessionResponse: CreateSessionResponse_Encoding_DefaultBinary,
    ActivateSessionRequest: ActivateSessionRequest_Encoding_DefaultBinary
        => ActivateSessionResponse: ActivateSessionResponse_Encoding_DefaultBinary,
    CloseSessionRequest: CloseSessionRequest_Encoding_DefaultBinary
        => CloseSessionResponse: CloseSessionResponse_Encoding_DefaultBinary,
    ReadRequest: ReadRequest_Encoding_DefaultBinary
        => ReadResponse: ReadResponse_Encoding_DefaultBinary,
];

impl SupportedMessage {
    /// The node id written in front of the message body.
    pub fn node_id(&self) -> NodeId {
        self.object_id().into()
    }
}
