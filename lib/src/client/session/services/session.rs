// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::sync::Arc;

use crate::{
    client::{
        session::{process_service_result, process_unexpected_response, session_debug},
        IdentityToken, Session,
    },
    core::{
        comms::{security_policy::SecurityPolicy, url::url_matches_except_host},
        supported_message::SupportedMessage,
    },
    types::{
        ActivateSessionRequest, AnonymousIdentityToken, CloseSessionRequest,
        CreateSessionRequest, EndpointDescription, ExtensionObject, MessageSecurityMode, NodeId,
        SignatureData, StatusCode, UAString, UserNameIdentityToken, UserTokenPolicy,
        UserTokenType,
    },
};

impl Session {
    /// Sends a [`CreateSessionRequest`] to the server, returning the session id of the created
    /// session. Internally, the session will store the authentication token which is used for requests
    /// subsequent to this call.
    ///
    /// See OPC UA Part 4 - Services 5.6.2 for complete description of the service and error responses.
    pub(crate) async fn create_session(&self) -> Result<NodeId, StatusCode> {
        let request = CreateSessionRequest {
            request_header: self.make_request_header(),
            client_description: self.application_description.clone(),
            server_uri: UAString::null(),
            endpoint_url: self.session_info.endpoint.endpoint_url.clone(),
            session_name: self.session_name.clone(),
            client_nonce: self.channel.client_nonce(),
            client_certificate: Default::default(),
            requested_session_timeout: self.session_timeout,
            max_response_message_size: self.max_response_message_size,
        };

        let response = self.send(request).await?;

        let SupportedMessage::CreateSessionResponse(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;

        session_debug!(
            self,
            "Created session {}, revised timeout {}ms",
            response.session_id,
            response.revised_session_timeout
        );

        self.session_id.store(Arc::new(response.session_id.clone()));
        self.auth_token
            .store(Arc::new(response.authentication_token.clone()));
        self.channel
            .update_from_created_session(&response.server_nonce);
        self.user_token_policies
            .store(Arc::new(self.matching_user_token_policies(&response.server_endpoints)));

        Ok(response.session_id)
    }

    /// The user token policies the server lists for the endpoint we are connected to. Servers
    /// may answer with the address they know themselves by, so the host is not compared.
    fn matching_user_token_policies(
        &self,
        server_endpoints: &Option<Vec<EndpointDescription>>,
    ) -> Vec<UserTokenPolicy> {
        let url = self.session_info.endpoint.endpoint_url.as_ref();
        server_endpoints
            .iter()
            .flatten()
            .filter(|e| {
                e.security_mode == MessageSecurityMode::None
                    && SecurityPolicy::from_uri(e.security_policy_uri.as_ref())
                        == SecurityPolicy::None
            })
            .find(|e| url_matches_except_host(e.endpoint_url.as_ref(), url))
            .and_then(|e| e.user_identity_tokens.clone())
            .unwrap_or_default()
    }

    /// Sends an [`ActivateSessionRequest`] to the server to activate this session
    ///
    /// See OPC UA Part 4 - Services 5.6.3 for complete description of the service and error responses.
    pub(crate) async fn activate_session(&self) -> Result<(), StatusCode> {
        let user_identity_token = self.user_identity_token()?;

        let locale_ids = if self.session_info.preferred_locales.is_empty() {
            None
        } else {
            Some(
                self.session_info
                    .preferred_locales
                    .iter()
                    .map(UAString::from)
                    .collect(),
            )
        };

        let request = ActivateSessionRequest {
            request_header: self.make_request_header(),
            client_signature: SignatureData::default(),
            client_software_certificates: None,
            locale_ids,
            user_identity_token,
            user_token_signature: SignatureData::default(),
        };

        let response = self.send(request).await?;

        if let SupportedMessage::ActivateSessionResponse(response) = response {
            process_service_result(&response.response_header)?;
            Ok(())
        } else {
            Err(process_unexpected_response(response))
        }
    }

    /// Build the identity token for ActivateSession. The policy id comes from the endpoint the
    /// server returned in CreateSession, or a conventional id when it listed none.
    fn user_identity_token(&self) -> Result<ExtensionObject, StatusCode> {
        let user_identity_token = &self.session_info.user_identity_token;
        let user_token_type = match user_identity_token {
            IdentityToken::Anonymous => UserTokenType::Anonymous,
            IdentityToken::UserName(_, _) => UserTokenType::UserName,
        };

        let policies = self.user_token_policies.load();
        let endpoint = EndpointDescription {
            user_identity_tokens: Some(policies.as_ref().clone()),
            ..self.session_info.endpoint.clone()
        };
        let policy = match endpoint.find_policy(user_token_type) {
            Some(policy) => policy.clone(),
            None if policies.is_empty() => match user_token_type {
                UserTokenType::UserName => UserTokenPolicy::user_name(),
                _ => UserTokenPolicy::anonymous(),
            },
            None => {
                error!(
                    "Cannot find user token type {:?} for this endpoint, cannot connect",
                    user_token_type
                );
                return Err(StatusCode::BadIdentityTokenRejected);
            }
        };

        if !policy.security_policy_uri.is_null()
            && SecurityPolicy::from_uri(policy.security_policy_uri.as_ref()) != SecurityPolicy::None
        {
            error!(
                "User token policy {} requires security policy {}, which is not supported",
                policy.policy_id, policy.security_policy_uri
            );
            return Err(StatusCode::BadSecurityPolicyRejected);
        }

        Ok(match user_identity_token {
            IdentityToken::Anonymous => {
                AnonymousIdentityToken::extension_object(policy.policy_id.as_ref())
            }
            IdentityToken::UserName(user, pass) => {
                warn!("Sending the password of user {} unencrypted", user);
                UserNameIdentityToken::extension_object(policy.policy_id.as_ref(), user, pass)
            }
        })
    }

    /// Close the session by sending a [`CloseSessionRequest`] to the server.
    ///
    /// This is not accessible by users, they must instead call `disconnect` to properly close the session.
    pub(crate) async fn close_session(&self) -> Result<(), StatusCode> {
        let request = CloseSessionRequest {
            delete_subscriptions: true,
            request_header: self.make_request_header(),
        };
        let response = self.send(request).await?;
        if let SupportedMessage::CloseSessionResponse(_) = response {
            self.reset();
            Ok(())
        } else {
            error!("close_session failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}
