// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::{
    client::{
        retry::SessionRetryPolicy, transport::TransportConfiguration, AsyncSecureChannel,
        ClientConfig,
    },
    core::supported_message::SupportedMessage,
    net::{Dialer, LocalAddress},
    types::{
        ApplicationDescription, DecodingOptions, NodeId, RequestHeader, StatusCode, UAString,
        UserTokenPolicy,
    },
};

use super::{SessionEventLoop, SessionInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Connecting,
}

lazy_static! {
    static ref NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);
}

/// An OPC UA session over a secure channel bound to one local address.
///
/// Nothing happens until the [`SessionEventLoop`] returned with the session is polled.
pub struct Session {
    pub(super) channel: AsyncSecureChannel,
    pub(super) state_watch_rx: tokio::sync::watch::Receiver<SessionState>,
    pub(super) state_watch_tx: tokio::sync::watch::Sender<SessionState>,
    pub(super) session_id: Arc<ArcSwap<NodeId>>,
    pub(super) auth_token: Arc<ArcSwap<NodeId>>,
    pub(super) internal_session_id: AtomicU32,
    pub(super) session_info: SessionInfo,
    pub(super) session_name: UAString,
    pub(super) application_description: ApplicationDescription,
    pub(super) request_timeout: Duration,
    /// Requested session timeout in milliseconds
    pub(super) session_timeout: f64,
    pub(super) max_response_message_size: u32,
    /// Token policies the server advertised for our endpoint in CreateSession
    pub(super) user_token_policies: ArcSwap<Vec<UserTokenPolicy>>,
    /// Where the current or last connection came from
    pub(super) source_address: ArcSwapOption<SocketAddr>,
}

impl Session {
    pub(crate) fn new(
        session_info: SessionInfo,
        session_name: UAString,
        application_description: ApplicationDescription,
        session_retry_policy: SessionRetryPolicy,
        decoding_options: DecodingOptions,
        config: &ClientConfig,
        dialer: Dialer,
    ) -> (Arc<Self>, SessionEventLoop) {
        let auth_token: Arc<ArcSwap<NodeId>> = Default::default();
        let (state_watch_tx, state_watch_rx) =
            tokio::sync::watch::channel(SessionState::Disconnected);

        let max_message_size = config.decoding_options.max_message_size;
        let session = Arc::new(Session {
            channel: AsyncSecureChannel::new(
                session_info.clone(),
                decoding_options,
                true,
                auth_token.clone(),
                TransportConfiguration {
                    max_inflight: config.max_inflight_messages,
                    max_message_size,
                    max_chunk_count: config.decoding_options.max_chunk_count,
                    ..Default::default()
                },
                dialer,
                config.channel_lifetime,
            ),
            internal_session_id: AtomicU32::new(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            state_watch_rx,
            state_watch_tx,
            session_id: Default::default(),
            session_info,
            auth_token,
            session_name,
            application_description,
            request_timeout: config.request_timeout(),
            session_timeout: f64::from(config.session_timeout),
            max_response_message_size: max_message_size.min(u32::MAX as usize) as u32,
            user_token_policies: Default::default(),
            source_address: Default::default(),
        });

        (
            session.clone(),
            SessionEventLoop::new(session, session_retry_policy, config.keep_alive_interval()),
        )
    }

    /// Send a message and wait for response, using the default configured timeout.
    pub(super) async fn send(
        &self,
        request: impl Into<SupportedMessage>,
    ) -> Result<SupportedMessage, StatusCode> {
        self.channel.send(request, self.request_timeout).await
    }

    /// Create a request header with the default timeout.
    pub(super) fn make_request_header(&self) -> RequestHeader {
        self.channel.make_request_header(self.request_timeout)
    }

    /// Reset the session after a hard disconnect, clearing the session ID and incrementing the internal
    /// session counter.
    pub(crate) fn reset(&self) {
        self.session_id.store(Arc::new(NodeId::null()));
        self.auth_token.store(Arc::new(NodeId::null()));
        self.internal_session_id.store(
            NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            Ordering::Relaxed,
        );
    }

    /// Wait for the session to be in either a connected or disconnected state.
    async fn wait_for_state(&self, connected: bool) -> bool {
        let mut rx = self.state_watch_rx.clone();

        let res = rx
            .wait_for(|s| {
                connected && matches!(*s, SessionState::Connected)
                    || !connected && matches!(*s, SessionState::Disconnected)
            })
            .await
            .is_ok();
        res
    }

    /// The internal ID of the session, used to keep track of multiple sessions in the same program.
    pub fn session_id(&self) -> u32 {
        self.internal_session_id.load(Ordering::Relaxed)
    }

    /// The id the server gave the session, null until CreateSession succeeds.
    pub fn server_session_id(&self) -> NodeId {
        (**self.session_id.load()).clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state_watch_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn endpoint_url(&self) -> &str {
        self.session_info.endpoint.endpoint_url.as_ref()
    }

    pub fn local_address(&self) -> LocalAddress {
        self.channel.dialer().local_address()
    }

    /// The address the last connection was actually made from, with the port the system
    /// picked. `None` until the session has connected once.
    pub fn source_address(&self) -> Option<SocketAddr> {
        self.source_address.load().as_deref().copied()
    }

    /// Wait until the session is connected. Returns false if the event loop is gone.
    ///
    /// You should also monitor the session event loop. If it ends, this method will never return.
    pub async fn wait_for_connection(&self) -> bool {
        self.wait_for_state(true).await
    }

    /// Close the session and the channel, then wait for the event loop to report the session
    /// disconnected. The channel is closed even when CloseSession fails.
    pub async fn disconnect(&self) -> Result<(), StatusCode> {
        let res = self.close_session().await;
        self.channel.close_channel().await;

        self.wait_for_state(false).await;

        res
    }
}
