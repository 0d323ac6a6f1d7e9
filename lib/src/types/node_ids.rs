// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Namespace 0 node ids for the encodings and variables this crate uses.

use std::convert::TryFrom;

use crate::types::{node_id::NodeId, status_code::StatusCode};

macro_rules! node_ids {
    ( $enum:ident { $( $name:ident = $value:expr ),* $(,)? } ) => {
        #[allow(non_camel_case_types)]
        #[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
        pub enum $enum {
            $( $name = $value, )*
        }

        impl TryFrom<u32> for $enum {
            type Error = ();

            fn try_from(value: u32) -> Result<Self, ()> {
                match value {
                    $( $value => Ok($enum::$name), )*
                    _ => Err(()),
                }
            }
        }

        impl From<$enum> for NodeId {
            fn from(value: $enum) -> NodeId {
                NodeId::new(0, value as u32)
            }
        }
    };
}

node_ids!(ObjectId {
    AnonymousIdentityToken_Encoding_DefaultBinary = 321,
    UserNameIdentityToken_Encoding_DefaultBinary = 324,
    ServiceFault_Encoding_DefaultBinary = 397,
    OpenSecureChannelRequest_Encoding_DefaultBinary = 446,
    OpenSecureChannelResponse_Encoding_DefaultBinary = 449,
    CloseSecureChannelRequest_Encoding_DefaultBinary = 452,
    CloseSecureChannelResponse_Encoding_DefaultBinary = 455,
    CreateSessionRequest_Encoding_DefaultBinary = 461,
    CreateSessionResponse_Encoding_DefaultBinary = 464,
    ActivateSessionRequest_Encoding_DefaultBinary = 467,
    ActivateSessionResponse_Encoding_DefaultBinary = 470,
    CloseSessionRequest_Encoding_DefaultBinary = 473,
    CloseSessionResponse_Encoding_DefaultBinary = 476,
    ReadRequest_Encoding_DefaultBinary = 631,
    ReadResponse_Encoding_DefaultBinary = 634,
    Server = 2253,
});

node_ids!(VariableId {
    Server_ServerStatus = 2256,
    Server_ServerStatus_StartTime = 2257,
    Server_ServerStatus_CurrentTime = 2258,
    Server_ServerStatus_State = 2259,
    Server_ServerStatus_BuildInfo = 2260,
});

impl NodeId {
    /// The `ObjectId` of a namespace 0 numeric node id.
    pub fn as_object_id(&self) -> Result<ObjectId, StatusCode> {
        self.as_ns0_numeric()
            .and_then(|id| ObjectId::try_from(id).ok())
            .ok_or(StatusCode::BadNodeIdUnknown)
    }
}
