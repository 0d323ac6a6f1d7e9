// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The structures of the services this crate speaks: secure channel, session and attribute read.

use crate::types::{
    byte_string::ByteString, data_types::*, data_value::DataValue,
    diagnostic_info::DiagnosticInfo, extension_object::ExtensionObject,
    localized_text::LocalizedText, node_id::NodeId, node_ids::ObjectId,
    qualified_name::QualifiedName, request_header::RequestHeader,
    response_header::ResponseHeader, status_code::StatusCode, string::UAString,
};

mod enums;
mod impls;

pub use self::enums::*;

/// Implemented by messages
pub trait MessageInfo {
    /// The id of the message's default binary encoding
    fn object_id(&self) -> ObjectId;
}

ua_struct! {
    ServiceFault: ServiceFault_Encoding_DefaultBinary {
        response_header: ResponseHeader,
    }
}

ua_struct! {
    ChannelSecurityToken {
        channel_id: u32,
        token_id: u32,
        created_at: UtcTime,
        /// Milliseconds
        revised_lifetime: u32,
    }
}

ua_struct! {
    OpenSecureChannelRequest: OpenSecureChannelRequest_Encoding_DefaultBinary {
        request_header: RequestHeader,
        client_protocol_version: u32,
        request_type: SecurityTokenRequestType,
        security_mode: MessageSecurityMode,
        client_nonce: ByteString,
        requested_lifetime: u32,
    }
}

ua_struct! {
    OpenSecureChannelResponse: OpenSecureChannelResponse_Encoding_DefaultBinary {
        response_header: ResponseHeader,
        server_protocol_version: u32,
        security_token: ChannelSecurityToken,
        server_nonce: ByteString,
    }
}

ua_struct! {
    CloseSecureChannelRequest: CloseSecureChannelRequest_Encoding_DefaultBinary {
        request_header: RequestHeader,
    }
}

ua_struct! {
    CloseSecureChannelResponse: CloseSecureChannelResponse_Encoding_DefaultBinary {
        response_header: ResponseHeader,
    }
}

ua_struct! {
    ApplicationDescription {
        application_uri: UAString,
        product_uri: UAString,
        application_name: LocalizedText,
        application_type: ApplicationType,
        gateway_server_uri: UAString,
        discovery_profile_uri: UAString,
        discovery_urls: Option<Vec<UAString>>,
    }
}

ua_struct! {
    UserTokenPolicy {
        policy_id: UAString,
        token_type: UserTokenType,
        issued_token_type: UAString,
        issuer_endpoint_url: UAString,
        security_policy_uri: UAString,
    }
}

ua_struct! {
    EndpointDescription {
        endpoint_url: UAString,
        server: ApplicationDescription,
        server_certificate: ByteString,
        security_mode: MessageSecurityMode,
        security_policy_uri: UAString,
        user_identity_tokens: Option<Vec<UserTokenPolicy>>,
        transport_profile_uri: UAString,
        security_level: u8,
    }
}

ua_struct! {
    SignedSoftwareCertificate {
        certificate_data: ByteString,
        signature: ByteString,
    }
}

ua_struct! {
    SignatureData {
        algorithm: UAString,
        signature: ByteString,
    }
}

ua_struct! {
    CreateSessionRequest: CreateSessionRequest_Encoding_DefaultBinary {
        request_header: RequestHeader,
        client_description: ApplicationDescription,
        server_uri: UAString,
        endpoint_url: UAString,
        session_name: UAString,
        client_nonce: ByteString,
        client_certificate: ByteString,
        /// Milliseconds
        requested_session_timeout: Duration,
        max_response_message_size: u32,
    }
}

ua_struct! {
    CreateSessionResponse: CreateSessionResponse_Encoding_DefaultBinary {
        response_header: ResponseHeader,
        session_id: NodeId,
        authentication_token: NodeId,
        revised_session_timeout: Duration,
        server_nonce: ByteString,
        server_certificate: ByteString,
        server_endpoints: Option<Vec<EndpointDescription>>,
        server_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
        server_signature: SignatureData,
        max_request_message_size: u32,
    }
}

ua_struct! {
    AnonymousIdentityToken: AnonymousIdentityToken_Encoding_DefaultBinary {
        policy_id: UAString,
    }
}

ua_struct! {
    UserNameIdentityToken: UserNameIdentityToken_Encoding_DefaultBinary {
        policy_id: UAString,
        user_name: UAString,
        /// Plain text unless `encryption_algorithm` is set
        password: ByteString,
        encryption_algorithm: UAString,
    }
}

ua_struct! {
    ActivateSessionRequest: ActivateSessionRequest_Encoding_DefaultBinary {
        request_header: RequestHeader,
        client_signature: SignatureData,
        client_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
        locale_ids: Option<Vec<UAString>>,
        user_identity_token: ExtensionObject,
        user_token_signature: SignatureData,
    }
}

ua_struct! {
    ActivateSessionResponse: ActivateSessionResponse_Encoding_DefaultBinary {
        response_header: ResponseHeader,
        server_nonce: ByteString,
        results: Option<Vec<StatusCode>>,
        diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}

ua_struct! {
    CloseSessionRequest: CloseSessionRequest_Encoding_DefaultBinary {
        request_header: RequestHeader,
        delete_subscriptions: bool,
    }
}

ua_struct! {
    CloseSessionResponse: CloseSessionResponse_Encoding_DefaultBinary {
        response_header: ResponseHeader,
    }
}

ua_struct! {
    ReadValueId {
        node_id: NodeId,
        attribute_id: u32,
        index_range: UAString,
        data_encoding: QualifiedName,
    }
}

ua_struct! {
    ReadRequest: ReadRequest_Encoding_DefaultBinary {
        request_header: RequestHeader,
        /// Milliseconds. 0 asks for a fresh value.
        max_age: Duration,
        timestamps_to_return: TimestampsToReturn,
        nodes_to_read: Option<Vec<ReadValueId>>,
    }
}

ua_struct! {
    ReadResponse: ReadResponse_Encoding_DefaultBinary {
        response_header: ResponseHeader,
        results: Option<Vec<DataValue>>,
        diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}
