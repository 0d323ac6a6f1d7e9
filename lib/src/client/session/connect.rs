// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{net::SocketAddr, sync::Arc};

use tokio::{pin, select};

use crate::{
    client::transport::{SecureChannelEventLoop, TransportPollResult},
    types::{NodeId, StatusCode},
};

use super::{session_debug, session_error, session_warn, Session};

/// Makes one attempt at opening a channel from the session's local address and getting the
/// session activated on it. Retrying is up to the event loop.
pub(super) struct SessionConnector {
    inner: Arc<Session>,
}

/// How the session came to be activated on a new connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionConnectMode {
    /// The server created a new session with the inner [`NodeId`]
    NewSession(NodeId),
    /// The session with the inner [`NodeId`] survived the reconnect
    ReactivatedSession(NodeId),
}

impl SessionConnector {
    pub fn new(session: Arc<Session>) -> Self {
        Self { inner: session }
    }

    pub async fn try_connect(
        &self,
    ) -> Result<(SecureChannelEventLoop, SessionConnectMode), StatusCode> {
        let mut channel = self.inner.channel.connect_no_retry().await?;

        let source = channel.local_addr();
        let local_address = self.inner.local_address();
        if !local_address.accepts_source(&source) {
            session_error!(
                self.inner,
                "Connected from {source}, which is not the requested \"{local_address}\""
            );
            self.abandon(&mut channel).await;
            return Err(StatusCode::BadCommunicationError);
        }
        session_debug!(
            self.inner,
            "Channel open to {} from {source}",
            self.inner.endpoint_url()
        );

        let activation = self.activate();
        pin!(activation);
        // Session requests only move while the transport is polled
        let res = loop {
            select! {
                r = channel.poll() => {
                    if let TransportPollResult::Closed(c) = r {
                        return Err(c);
                    }
                },
                r = &mut activation => break r,
            }
        };

        match res {
            Ok(mode) => {
                self.activated(source, &mode);
                Ok((channel, mode))
            }
            Err(e) => {
                self.abandon(&mut channel).await;
                Err(e)
            }
        }
    }

    fn activated(&self, source: SocketAddr, mode: &SessionConnectMode) {
        self.inner.source_address.store(Some(Arc::new(source)));
        match mode {
            SessionConnectMode::NewSession(id) => {
                info!("Session {} activated from {}", id, source)
            }
            SessionConnectMode::ReactivatedSession(id) => {
                info!("Session {} reactivated from {}", id, source)
            }
        }
    }

    /// Close the channel and drain the transport until it is gone.
    async fn abandon(&self, channel: &mut SecureChannelEventLoop) {
        self.inner.channel.close_channel().await;
        while !matches!(channel.poll().await, TransportPollResult::Closed(_)) {}
    }

    async fn activate(&self) -> Result<SessionConnectMode, StatusCode> {
        // A session id survives from an earlier connection
        if self.inner.session_id.load().is_null() {
            return self.create_and_activate().await;
        }
        match self.inner.activate_session().await {
            Ok(_) => Ok(SessionConnectMode::ReactivatedSession(
                self.inner.server_session_id(),
            )),
            Err(status) => {
                session_warn!(
                    self.inner,
                    "Session could not be reactivated, {status}, creating a new one"
                );
                self.inner.reset();
                self.create_and_activate().await
            }
        }
    }

    async fn create_and_activate(&self) -> Result<SessionConnectMode, StatusCode> {
        let id = self.inner.create_session().await?;
        self.inner.activate_session().await?;
        Ok(SessionConnectMode::NewSession(id))
    }
}
