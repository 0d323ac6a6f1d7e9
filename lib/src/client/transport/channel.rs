// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{net::SocketAddr, sync::Arc, time::Duration};

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::{
    client::session::SessionInfo,
    core::{
        comms::{
            secure_channel::{Role, SecureChannel},
            security_policy::SecurityPolicy,
        },
        supported_message::SupportedMessage,
    },
    net::Dialer,
    sync::RwLock,
    types::{
        ByteString, CloseSecureChannelRequest, DecodingOptions, MessageSecurityMode, NodeId,
        RequestHeader, SecurityTokenRequestType, StatusCode,
    },
};

use super::{
    core::{OutgoingMessage, TransportPollResult},
    state::{Request, RequestSend, SecureChannelState},
    tcp::{TcpTransport, TransportConfiguration},
};

/// Timeout of OpenSecureChannel and CloseSecureChannel requests.
const CHANNEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrapper around an open secure channel
pub struct AsyncSecureChannel {
    session_info: SessionInfo,
    pub(crate) secure_channel: Arc<RwLock<SecureChannel>>,
    transport_config: TransportConfiguration,
    dialer: Dialer,
    state: SecureChannelState,
    issue_channel_lock: tokio::sync::Mutex<()>,

    request_send: ArcSwapOption<RequestSend>,
}

/// Drives the transport of an open channel. Must be polled for requests to make progress.
pub struct SecureChannelEventLoop {
    transport: TcpTransport,
}

impl SecureChannelEventLoop {
    pub async fn poll(&mut self) -> TransportPollResult {
        self.transport.poll().await
    }

    /// The address the connection was made from.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

impl AsyncSecureChannel {
    pub fn new(
        session_info: SessionInfo,
        decoding_options: DecodingOptions,
        ignore_clock_skew: bool,
        auth_token: Arc<ArcSwap<NodeId>>,
        transport_config: TransportConfiguration,
        dialer: Dialer,
        channel_lifetime: u32,
    ) -> Self {
        let secure_channel = Arc::new(RwLock::new(SecureChannel::new(
            Role::Client,
            decoding_options,
        )));

        Self {
            transport_config,
            dialer,
            issue_channel_lock: tokio::sync::Mutex::new(()),
            state: SecureChannelState::new(
                ignore_clock_skew,
                secure_channel.clone(),
                auth_token,
                channel_lifetime,
            ),
            session_info,
            secure_channel,
            request_send: Default::default(),
        }
    }

    /// Send a request and wait for its response, renewing the security token first once 75% of
    /// its lifetime has passed.
    pub async fn send(
        &self,
        request: impl Into<SupportedMessage>,
        timeout: Duration,
    ) -> Result<SupportedMessage, StatusCode> {
        let sender = self.request_send.load().as_deref().cloned();
        let Some(send) = sender else {
            return Err(StatusCode::BadNotConnected);
        };

        let should_renew_security_token = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            secure_channel.should_renew_security_token()
        };

        if should_renew_security_token {
            // Check again under the lock so a burst of requests renews only once, and requests
            // issued during a renewal wait for the new token.
            let guard = self.issue_channel_lock.lock().await;
            let should_renew_security_token = {
                let secure_channel = trace_read_lock!(self.secure_channel);
                secure_channel.should_renew_security_token()
            };

            if should_renew_security_token {
                debug!("Renewing the secure channel security token");
                let request = self.state.begin_issue_or_renew_secure_channel(
                    SecurityTokenRequestType::Renew,
                    CHANNEL_REQUEST_TIMEOUT,
                    send.clone(),
                );

                let resp = request.send().await?;

                self.state.end_issue_or_renew_secure_channel(resp)?;
            }

            drop(guard);
        }

        Request::new(request, send, timeout).send().await
    }

    pub(crate) fn make_request_header(&self, timeout: Duration) -> RequestHeader {
        self.state.make_request_header(timeout)
    }

    /// A fresh nonce for CreateSession, kept on the channel.
    pub(crate) fn client_nonce(&self) -> ByteString {
        let mut secure_channel = trace_write_lock!(self.secure_channel);
        secure_channel.create_random_nonce();
        secure_channel.local_nonce_as_byte_string()
    }

    pub(crate) fn update_from_created_session(&self, nonce: &ByteString) {
        let mut secure_channel = trace_write_lock!(self.secure_channel);
        secure_channel.set_remote_nonce_from_byte_string(nonce);
    }

    /// The local address this channel's connections leave from.
    pub fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    /// One connection attempt: connect, HEL / ACK, then issue a security token.
    pub async fn connect_no_retry(&self) -> Result<SecureChannelEventLoop, StatusCode> {
        {
            let mut secure_channel = trace_write_lock!(self.secure_channel);
            secure_channel.clear_security_token();
        }

        let (mut transport, send) = self.create_transport().await?;

        let request = self.state.begin_issue_or_renew_secure_channel(
            SecurityTokenRequestType::Issue,
            CHANNEL_REQUEST_TIMEOUT,
            send.clone(),
        );

        let request_fut = request.send();
        tokio::pin!(request_fut);

        // Poll the transport while waiting, nothing else drives it yet.
        let resp = loop {
            tokio::select! {
                r = &mut request_fut => break r?,
                r = transport.poll() => {
                    if let TransportPollResult::Closed(e) = r {
                        return Err(e);
                    }
                }
            }
        };

        self.state.end_issue_or_renew_secure_channel(resp)?;
        self.request_send.store(Some(Arc::new(send)));

        Ok(SecureChannelEventLoop { transport })
    }

    async fn create_transport(
        &self,
    ) -> Result<(TcpTransport, tokio::sync::mpsc::Sender<OutgoingMessage>), StatusCode> {
        let endpoint = &self.session_info.endpoint;
        let security_policy = SecurityPolicy::from_uri(endpoint.security_policy_uri.as_ref());
        if security_policy != SecurityPolicy::None {
            error!(
                "connect, security policy \"{}\" is not supported",
                endpoint.security_policy_uri
            );
            return Err(StatusCode::BadSecurityPolicyRejected);
        }
        if endpoint.security_mode != MessageSecurityMode::None {
            error!(
                "connect, security mode {:?} is not supported",
                endpoint.security_mode
            );
            return Err(StatusCode::BadSecurityModeRejected);
        }

        debug!(
            "Connecting to {} from {}",
            endpoint.endpoint_url,
            self.dialer.local_address()
        );

        let (send, recv) = tokio::sync::mpsc::channel(self.transport_config.max_inflight.max(1));
        let transport = TcpTransport::connect(
            self.secure_channel.clone(),
            recv,
            self.transport_config.clone(),
            &self.dialer,
            endpoint.endpoint_url.as_ref(),
        )
        .await?;

        Ok((transport, send))
    }

    /// Ask the transport to send CloseSecureChannel and then close. Returns once the message is
    /// queued.
    pub async fn close_channel(&self) {
        let msg = CloseSecureChannelRequest {
            request_header: self.state.make_request_header(CHANNEL_REQUEST_TIMEOUT),
        };

        let sender = self.request_send.load().as_deref().cloned();
        let request = sender.map(|s| Request::new(msg, s, CHANNEL_REQUEST_TIMEOUT));

        if let Some(request) = request {
            if let Err(e) = request.send_no_response().await {
                error!("Failed to send disconnect message, queue full: {e}");
            }
        }
    }
}
