// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::{
    client::session::process_unexpected_response,
    core::{
        comms::secure_channel::SecureChannel, handle::AtomicHandle,
        supported_message::SupportedMessage,
    },
    sync::RwLock,
    types::{
        ByteString, DateTime, NodeId, OpenSecureChannelRequest, RequestHeader,
        SecurityTokenRequestType, StatusCode,
    },
};

use super::core::OutgoingMessage;

pub(crate) type RequestSend = mpsc::Sender<OutgoingMessage>;

/// State shared by every transport the channel opens: the clock offset, the session's
/// authentication token and the request handle counter.
pub struct SecureChannelState {
    /// Time offset between the client and the server.
    client_offset: ArcSwap<chrono::Duration>,
    /// Measure the offset from the server's clock on OPN responses.
    ignore_clock_skew: bool,
    secure_channel: Arc<RwLock<SecureChannel>>,
    /// Supplied in every request header after CreateSession.
    authentication_token: Arc<ArcSwap<NodeId>>,
    request_handle: AtomicHandle,
    /// Requested lifetime of secure channel tokens in milliseconds.
    channel_lifetime: u32,
}

/// One request on its way to the transport.
pub(crate) struct Request {
    payload: SupportedMessage,
    sender: RequestSend,
    timeout: Duration,
}

impl Request {
    pub fn new(payload: impl Into<SupportedMessage>, sender: RequestSend, timeout: Duration) -> Self {
        Self {
            payload: payload.into(),
            sender,
            timeout,
        }
    }

    /// Queue the request without waiting for a response, used for CloseSecureChannel.
    pub async fn send_no_response(self) -> Result<(), StatusCode> {
        let message = OutgoingMessage {
            request: self.payload,
            callback: None,
            deadline: Instant::now() + self.timeout,
        };

        match self.sender.send_timeout(message, self.timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(StatusCode::BadConnectionClosed),
            Err(SendTimeoutError::Timeout(_)) => Err(StatusCode::BadTimeout),
        }
    }

    pub async fn send(self) -> Result<SupportedMessage, StatusCode> {
        let (cb_send, cb_recv) = tokio::sync::oneshot::channel();

        let message = OutgoingMessage {
            request: self.payload,
            callback: Some(cb_send),
            deadline: Instant::now() + self.timeout,
        };

        match self.sender.send_timeout(message, self.timeout).await {
            Ok(()) => (),
            Err(SendTimeoutError::Closed(_)) => return Err(StatusCode::BadConnectionClosed),
            Err(SendTimeoutError::Timeout(_)) => return Err(StatusCode::BadTimeout),
        }

        // The transport drops the callback only when it is torn down mid-request
        cb_recv.await.unwrap_or(Err(StatusCode::BadConnectionClosed))
    }
}

impl SecureChannelState {
    const FIRST_REQUEST_HANDLE: u32 = 1;

    pub fn new(
        ignore_clock_skew: bool,
        secure_channel: Arc<RwLock<SecureChannel>>,
        authentication_token: Arc<ArcSwap<NodeId>>,
        channel_lifetime: u32,
    ) -> Self {
        SecureChannelState {
            client_offset: ArcSwap::new(Arc::new(chrono::Duration::zero())),
            ignore_clock_skew,
            secure_channel,
            authentication_token,
            request_handle: AtomicHandle::new(Self::FIRST_REQUEST_HANDLE),
            channel_lifetime,
        }
    }

    pub(super) fn begin_issue_or_renew_secure_channel(
        &self,
        request_type: SecurityTokenRequestType,
        timeout: Duration,
        sender: RequestSend,
    ) -> Request {
        trace!("issue_or_renew_secure_channel({:?})", request_type);

        let security_mode = trace_read_lock!(self.secure_channel).security_mode();

        debug!(
            "Making secure channel request, request_type = {:?}, security_mode = {:?}",
            request_type, security_mode
        );

        let request = OpenSecureChannelRequest {
            request_header: self.make_request_header(timeout),
            client_protocol_version: 0,
            request_type,
            security_mode,
            // Channels are unsecured, the server ignores the nonce
            client_nonce: ByteString::null(),
            requested_lifetime: self.channel_lifetime,
        };

        Request::new(request, sender, timeout)
    }

    fn set_client_offset(&self, offset: chrono::Duration) {
        // Only the channel's connect path calls this, one caller at a time.
        self.client_offset
            .store(Arc::new(**self.client_offset.load() + offset));
        debug!("Client offset set to {}", self.client_offset.load());
    }

    pub(super) fn end_issue_or_renew_secure_channel(
        &self,
        response: SupportedMessage,
    ) -> Result<(), StatusCode> {
        let SupportedMessage::OpenSecureChannelResponse(response) = response else {
            return Err(process_unexpected_response(response));
        };
        if response.response_header.service_result.is_bad() {
            error!(
                "OpenSecureChannel failed with {}",
                response.response_header.service_result
            );
            return Err(response.response_header.service_result);
        }

        let security_token = response.security_token.clone();

        // Timestamps in request headers and in decoded messages are shifted by the server's
        // clock offset when clock skew is ignored.
        if self.ignore_clock_skew && !response.response_header.timestamp.is_null() {
            let offset = response.response_header.timestamp - DateTime::now();
            self.set_client_offset(offset);
        }

        debug!(
            "Setting transport's security token, channel id {}, token id {}, lifetime {}ms",
            security_token.channel_id, security_token.token_id, security_token.revised_lifetime
        );
        let mut secure_channel = trace_write_lock!(self.secure_channel);
        secure_channel.set_client_offset(**self.client_offset.load());
        secure_channel.set_remote_nonce_from_byte_string(&response.server_nonce);
        secure_channel.set_security_token(security_token);
        Ok(())
    }

    /// Construct a request header for the session. All requests after create session are expected
    /// to supply an authentication token.
    pub fn make_request_header(&self, timeout: Duration) -> RequestHeader {
        RequestHeader {
            authentication_token: self.authentication_token.load().as_ref().clone(),
            timestamp: DateTime::now_with_offset(**self.client_offset.load()),
            request_handle: self.request_handle.next(),
            timeout_hint: timeout.as_millis().min(u32::MAX as u128) as u32,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use arc_swap::ArcSwap;

    use super::SecureChannelState;
    use crate::{
        core::{
            comms::secure_channel::{Role, SecureChannel},
            supported_message::SupportedMessage,
        },
        sync::RwLock,
        types::{
            ChannelSecurityToken, DateTime, DecodingOptions, NodeId, OpenSecureChannelResponse,
            RequestHeader, ResponseHeader, SecurityTokenRequestType, StatusCode,
        },
    };

    fn channel_state() -> (SecureChannelState, Arc<RwLock<SecureChannel>>) {
        let channel = Arc::new(RwLock::new(SecureChannel::new(
            Role::Client,
            DecodingOptions::default(),
        )));
        (
            SecureChannelState::new(
                true,
                channel.clone(),
                Arc::new(ArcSwap::new(Arc::new(NodeId::new(0, 99u32)))),
                30_000,
            ),
            channel,
        )
    }

    #[test]
    fn request_headers_carry_token_and_handles() {
        let (state, _) = channel_state();
        let first = state.make_request_header(Duration::from_secs(5));
        let second = state.make_request_header(Duration::from_secs(5));
        assert_eq!(first.authentication_token, NodeId::new(0, 99u32));
        assert_eq!(first.timeout_hint, 5000);
        assert_eq!(second.request_handle, first.request_handle + 1);
    }

    #[tokio::test]
    async fn open_response_installs_token() {
        let (state, channel) = channel_state();
        let (send, mut recv) = tokio::sync::mpsc::channel(1);
        let request = state.begin_issue_or_renew_secure_channel(
            SecurityTokenRequestType::Issue,
            Duration::from_secs(1),
            send,
        );
        request.send_no_response().await.unwrap();
        let SupportedMessage::OpenSecureChannelRequest(sent) = recv.recv().await.unwrap().request
        else {
            panic!("Expected an OpenSecureChannelRequest");
        };
        assert_eq!(sent.requested_lifetime, 30_000);

        let mut header = ResponseHeader::new_good(&RequestHeader::dummy());
        header.timestamp = DateTime::now();
        let response = OpenSecureChannelResponse {
            response_header: header,
            server_protocol_version: 0,
            security_token: ChannelSecurityToken {
                channel_id: 7,
                token_id: 3,
                created_at: DateTime::now(),
                revised_lifetime: 20_000,
            },
            server_nonce: Default::default(),
        };
        state
            .end_issue_or_renew_secure_channel(response.into())
            .unwrap();
        let channel = channel.read();
        assert_eq!(channel.secure_channel_id(), 7);
        assert_eq!(channel.token_id(), 3);
        assert_eq!(channel.token_lifetime(), 20_000);
    }

    #[test]
    fn wrong_response_is_rejected() {
        let (state, _) = channel_state();
        let response = crate::types::ServiceFault::new(
            &RequestHeader::dummy(),
            StatusCode::BadSecurityChecksFailed,
        );
        assert_eq!(
            state.end_issue_or_renew_secure_channel(response.into()),
            Err(StatusCode::BadSecurityChecksFailed)
        );
    }
}
