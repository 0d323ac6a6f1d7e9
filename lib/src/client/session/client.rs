// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{str::FromStr, sync::Arc, time::Duration};

use tokio::{select, task::JoinHandle};

use crate::{
    client::{
        retry::SessionRetryPolicy, ClientConfig, ClientEndpoint, IdentityToken,
        ANONYMOUS_USER_TOKEN_ID,
    },
    core::comms::{security_policy::SecurityPolicy, url::is_opc_ua_binary_url},
    net::{Dialer, LocalAddress},
    types::{
        ApplicationDescription, ApplicationType, DecodingOptions, EndpointDescription,
        LocalizedText, MessageSecurityMode, StatusCode, UAString,
    },
};

use super::{Session, SessionEventLoop, SessionInfo};

/// Creates sessions from a [`ClientConfig`]. Every session gets its own transport, bound to the
/// local address of the endpoint it was made for.
pub struct Client {
    /// Client configuration
    config: ClientConfig,
    /// The session retry policy for new sessions
    session_retry_policy: SessionRetryPolicy,
}

impl Client {
    /// Create a new client from config.
    ///
    /// Note that this does not make any connection to the server.
    pub fn new(config: ClientConfig) -> Self {
        let session_retry_policy = config.session_retry_policy();
        Self {
            config,
            session_retry_policy,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a session for the endpoint with id `endpoint_id` in the config, or the default
    /// endpoint when `None`.
    ///
    /// This function returns both a reference to the session, and a `SessionEventLoop`. You must run and
    /// poll the event loop in order to actually establish a connection.
    pub fn new_session(
        &self,
        endpoint_id: Option<&str>,
    ) -> Result<(Arc<Session>, SessionEventLoop), StatusCode> {
        let endpoint = match endpoint_id {
            Some(id) => self.config.endpoints.get(id).ok_or_else(|| {
                error!("Cannot find endpoint with id {}", id);
                StatusCode::BadConfigurationError
            })?,
            None => self.default_endpoint()?,
        };
        let user_identity_token = self.client_identity_token(&endpoint.user_token_id)?;
        self.new_session_from_endpoint(endpoint, user_identity_token)
    }

    /// Create a session for an ad-hoc endpoint. The endpoint carries the local address and device
    /// the transport binds to, an unbound endpoint uses the ones from the config.
    ///
    /// This method will not attempt to create a session on the server, that will only happen once you start polling
    /// the session event loop.
    pub fn new_session_from_endpoint(
        &self,
        endpoint: &ClientEndpoint,
        user_identity_token: IdentityToken,
    ) -> Result<(Arc<Session>, SessionEventLoop), StatusCode> {
        if endpoint.security_policy() != SecurityPolicy::None {
            error!(
                "Endpoint {} security policy {} is not supported",
                endpoint.url, endpoint.security_policy
            );
            return Err(StatusCode::BadSecurityPolicyRejected);
        }
        if endpoint.security_mode() != MessageSecurityMode::None {
            error!(
                "Endpoint {} security mode {} is not supported",
                endpoint.url, endpoint.security_mode
            );
            return Err(StatusCode::BadSecurityModeRejected);
        }

        let local_address = if endpoint.local_address.is_bound() {
            endpoint.local_address
        } else {
            self.config.local_address
        };
        let mut dialer = Dialer::new(local_address).timeout(self.config.dial_timeout());
        if let Some(device) = endpoint.bind_device.as_ref().or(self.config.bind_device.as_ref()) {
            dialer = dialer.bind_device(device.as_str());
        }

        info!(
            "Creating a session for endpoint {} from local address \"{}\"",
            endpoint.url, local_address
        );
        self.new_session_from_info(
            SessionInfo {
                endpoint: EndpointDescription::from(endpoint.url.as_str()),
                user_identity_token,
                preferred_locales: self.config.preferred_locales.clone(),
            },
            dialer,
        )
    }

    /// Create a session directly from a [`SessionInfo`], connecting through `dialer`.
    pub fn new_session_from_info(
        &self,
        session_info: impl Into<SessionInfo>,
        dialer: Dialer,
    ) -> Result<(Arc<Session>, SessionEventLoop), StatusCode> {
        let session_info = session_info.into();
        if !is_opc_ua_binary_url(session_info.endpoint.endpoint_url.as_ref()) {
            error!(
                "Endpoint url {}, is not a valid / supported url",
                session_info.endpoint.endpoint_url
            );
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        }
        Ok(Session::new(
            session_info,
            self.config.session_name.as_str().into(),
            self.application_description(),
            self.session_retry_policy.clone(),
            self.decoding_options(),
            &self.config,
            dialer,
        ))
    }

    /// Connect to `endpoint_url` from `local_address` and wait until the session is activated.
    ///
    /// An empty `local_address` falls back to the configured one, and when that is unbound too
    /// the operating system picks the source address. The event
    /// loop is spawned on the runtime and its handle returned; the session stops when it ends.
    /// If the session is not connected within `timeout`, or the event loop gives up first, the
    /// event loop is stopped and the error returned.
    pub async fn connect(
        &self,
        endpoint_url: &str,
        local_address: &str,
        user_identity_token: IdentityToken,
        timeout: Duration,
    ) -> Result<(Arc<Session>, JoinHandle<StatusCode>), StatusCode> {
        let local_address = LocalAddress::from_str(local_address)?;
        let endpoint = ClientEndpoint::new(endpoint_url).with_local_address(local_address);
        self.connect_endpoint(&endpoint, user_identity_token, timeout)
            .await
    }

    /// Same as [`Client::connect`] for a [`ClientEndpoint`], which may also name a device to
    /// bind to.
    pub async fn connect_endpoint(
        &self,
        endpoint: &ClientEndpoint,
        user_identity_token: IdentityToken,
        timeout: Duration,
    ) -> Result<(Arc<Session>, JoinHandle<StatusCode>), StatusCode> {
        let (session, event_loop) = self.new_session_from_endpoint(endpoint, user_identity_token)?;

        let mut handle = event_loop.spawn();
        let res = select! {
            biased;
            r = &mut handle => event_loop_ended(r),
            connected = session.wait_for_connection() => {
                if connected {
                    Ok(())
                } else {
                    // The state channel closes when the event loop ends, its status is the cause
                    event_loop_ended((&mut handle).await)
                }
            }
            _ = tokio::time::sleep(timeout) => {
                error!(
                    "Timed out connecting to {} from \"{}\"",
                    endpoint.url,
                    session.local_address()
                );
                Err(StatusCode::BadTimeout)
            }
        };

        match res {
            Ok(()) => Ok((session, handle)),
            Err(e) => {
                handle.abort();
                Err(e)
            }
        }
    }

    /// Gets the [`ClientEndpoint`] information for the default endpoint, as defined
    /// by the configuration. If there is no default endpoint, this function will return an error.
    pub fn default_endpoint(&self) -> Result<&ClientEndpoint, StatusCode> {
        let default_endpoint_id = &self.config.default_endpoint;
        if default_endpoint_id.is_empty() {
            error!("No default endpoint has been specified");
            return Err(StatusCode::BadConfigurationError);
        }
        self.config
            .endpoints
            .get(default_endpoint_id)
            .ok_or_else(|| {
                error!(
                    "Cannot find default endpoint with id {}",
                    default_endpoint_id
                );
                StatusCode::BadConfigurationError
            })
    }

    /// Returns an identity token corresponding to the matching user in the configuration.
    fn client_identity_token(&self, user_token_id: &str) -> Result<IdentityToken, StatusCode> {
        if user_token_id == ANONYMOUS_USER_TOKEN_ID {
            return Ok(IdentityToken::Anonymous);
        }
        let token = self.config.user_tokens.get(user_token_id).ok_or_else(|| {
            error!("User token {} cannot be found", user_token_id);
            StatusCode::BadConfigurationError
        })?;
        Ok(IdentityToken::UserName(
            token.user.clone(),
            token.password.clone(),
        ))
    }

    fn application_description(&self) -> ApplicationDescription {
        ApplicationDescription {
            application_uri: UAString::from(&self.config.application_uri),
            product_uri: UAString::from(&self.config.product_uri),
            application_name: LocalizedText::new("", &self.config.application_name),
            application_type: ApplicationType::Client,
            gateway_server_uri: UAString::null(),
            discovery_profile_uri: UAString::null(),
            discovery_urls: None,
        }
    }

    fn decoding_options(&self) -> DecodingOptions {
        self.config.decoding_options.as_comms_decoding_options()
    }
}

fn event_loop_ended(r: Result<StatusCode, tokio::task::JoinError>) -> Result<(), StatusCode> {
    match r {
        Ok(status) if status.is_bad() => Err(status),
        Ok(_) => Err(StatusCode::BadConnectionClosed),
        Err(e) => {
            error!("Session event loop failed: {}", e);
            Err(StatusCode::BadUnexpectedError)
        }
    }
}
