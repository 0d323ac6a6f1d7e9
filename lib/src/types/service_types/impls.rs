// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use crate::core::comms::security_policy::SECURITY_POLICY_NONE_URI;
use crate::types::{
    extension_object::ExtensionObject,
    node_id::NodeId,
    node_ids::ObjectId,
    qualified_name::QualifiedName,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    service_types::{
        AnonymousIdentityToken, AttributeId, EndpointDescription, MessageSecurityMode,
        ReadValueId, ServiceFault, UserNameIdentityToken, UserTokenPolicy, UserTokenType,
    },
    status_code::StatusCode,
    string::UAString,
};

impl ServiceFault {
    pub fn new(request_header: &RequestHeader, service_result: StatusCode) -> ServiceFault {
        ServiceFault {
            response_header: ResponseHeader::new_service_result(request_header, service_result),
        }
    }
}

impl From<&str> for MessageSecurityMode {
    fn from(s: &str) -> Self {
        match s {
            "None" => MessageSecurityMode::None,
            "Sign" => MessageSecurityMode::Sign,
            "SignAndEncrypt" => MessageSecurityMode::SignAndEncrypt,
            _ => {
                error!("Specified security mode \"{}\" is not recognized", s);
                MessageSecurityMode::Invalid
            }
        }
    }
}

impl MessageSecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSecurityMode::None => "None",
            MessageSecurityMode::Sign => "Sign",
            MessageSecurityMode::SignAndEncrypt => "SignAndEncrypt",
            MessageSecurityMode::Invalid => "Invalid",
        }
    }
}

impl From<&str> for EndpointDescription {
    /// An endpoint known only by its url, security policy `None`.
    fn from(endpoint_url: &str) -> Self {
        EndpointDescription {
            endpoint_url: UAString::from(endpoint_url),
            security_mode: MessageSecurityMode::None,
            security_policy_uri: UAString::from(SECURITY_POLICY_NONE_URI),
            ..Default::default()
        }
    }
}

impl EndpointDescription {
    /// The first user token policy of the given type, if the endpoint offers one.
    pub fn find_policy(&self, token_type: UserTokenType) -> Option<&UserTokenPolicy> {
        self.user_identity_tokens
            .as_ref()?
            .iter()
            .find(|t| t.token_type == token_type)
    }
}

impl UserTokenPolicy {
    pub fn anonymous() -> UserTokenPolicy {
        UserTokenPolicy {
            policy_id: UAString::from("anonymous"),
            token_type: UserTokenType::Anonymous,
            ..Default::default()
        }
    }

    pub fn user_name() -> UserTokenPolicy {
        UserTokenPolicy {
            policy_id: UAString::from("username"),
            token_type: UserTokenType::UserName,
            ..Default::default()
        }
    }
}

impl AnonymousIdentityToken {
    /// Wraps the token the way ActivateSession expects it.
    pub fn extension_object(policy_id: &str) -> ExtensionObject {
        ExtensionObject::from_encodable(
            ObjectId::AnonymousIdentityToken_Encoding_DefaultBinary,
            &AnonymousIdentityToken {
                policy_id: UAString::from(policy_id),
            },
        )
    }
}

impl UserNameIdentityToken {
    pub fn extension_object(policy_id: &str, user: &str, password: &str) -> ExtensionObject {
        ExtensionObject::from_encodable(
            ObjectId::UserNameIdentityToken_Encoding_DefaultBinary,
            &UserNameIdentityToken {
                policy_id: UAString::from(policy_id),
                user_name: UAString::from(user),
                password: password.as_bytes().into(),
                encryption_algorithm: UAString::null(),
            },
        )
    }
}

impl From<&NodeId> for ReadValueId {
    /// Reads the value attribute of the node.
    fn from(node_id: &NodeId) -> Self {
        ReadValueId {
            node_id: node_id.clone(),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            data_encoding: QualifiedName::null(),
        }
    }
}
