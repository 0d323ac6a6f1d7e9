// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{stream::BoxStream, Stream, StreamExt, TryStreamExt};

use crate::{
    client::{
        retry::{ExponentialBackoff, SessionRetryPolicy},
        session::{session_debug, session_error, session_warn},
        transport::{SecureChannelEventLoop, TransportPollResult},
    },
    types::{NodeId, ReadValueId, ServerState, StatusCode, TimestampsToReturn, VariableId},
};

use super::{
    connect::{SessionConnectMode, SessionConnector},
    session::SessionState,
    Session,
};

/// A list of possible events that happens while polling the session.
/// The client can use this list to monitor events such as disconnects.
#[derive(Debug)]
#[non_exhaustive]
pub enum SessionPollResult {
    /// A message was sent to or received from the server.
    Transport(TransportPollResult),
    /// Connection was lost with the inner [`StatusCode`].
    ConnectionLost(StatusCode),
    /// Connecting to the server failed with the inner [`StatusCode`], another attempt follows.
    ReconnectFailed(StatusCode),
    /// Session was connected, the mode is given by the inner [`SessionConnectMode`]
    Reconnected(SessionConnectMode),
    /// The session performed some periodic activity.
    SessionActivity(SessionActivity),
    /// The session begins (re)connecting to the server.
    BeginConnect,
}

enum SessionEventLoopState {
    Connected(SecureChannelEventLoop, BoxStream<'static, SessionActivity>),
    Connecting(SessionConnector, ExponentialBackoff, Instant),
    Disconnected,
}

/// The session event loop drives the client. It must be polled for anything to happen at all.
#[must_use = "The session event loop must be started for the session to work"]
pub struct SessionEventLoop {
    inner: Arc<Session>,
    retry: SessionRetryPolicy,
    keep_alive_interval: Duration,
    // Set once a session has been activated, the retry policy only applies after that
    has_connected: bool,
}

impl SessionEventLoop {
    pub(crate) fn new(
        inner: Arc<Session>,
        retry: SessionRetryPolicy,
        keep_alive_interval: Duration,
    ) -> Self {
        Self {
            inner,
            retry,
            keep_alive_interval,
            has_connected: false,
        }
    }

    /// Run the event loop until the session is closed manually, returning `Good`, or until it
    /// gives up reconnecting, returning the last error. The first connect is a single attempt,
    /// its failure ends the loop with the dial or activation error.
    pub async fn run(self) -> StatusCode {
        let stream = self.enter();
        tokio::pin!(stream);
        loop {
            match stream.try_next().await {
                Ok(None) => break StatusCode::Good,
                Err(e) => break e,
                _ => (),
            }
        }
    }

    /// Run the event loop on a tokio task.
    pub fn spawn(self) -> tokio::task::JoinHandle<StatusCode> {
        tokio::task::spawn(self.run())
    }

    /// Start the event loop, returning a stream that must be polled until it is closed.
    /// The stream will return `None` when the transport is closed manually, or
    /// `Some(Err(StatusCode))` when the stream fails to reconnect after a loss of connection.
    ///
    /// It yields events from normal session operation, which can be used to take specific actions
    /// based on changes to the session state.
    pub fn enter(self) -> impl Stream<Item = Result<SessionPollResult, StatusCode>> {
        futures::stream::try_unfold(
            (self, SessionEventLoopState::Disconnected),
            |(mut slf, state)| async move {
                let (res, state) = match state {
                    SessionEventLoopState::Connected(mut c, mut activity) => {
                        tokio::select! {
                            r = c.poll() => {
                                if let TransportPollResult::Closed(code) = r {
                                    session_warn!(slf.inner, "Transport disconnected: {code}");
                                    let _ = slf.inner.state_watch_tx.send(SessionState::Disconnected);

                                    if code.is_good() {
                                        return Ok(None);
                                    }

                                    Ok((
                                        SessionPollResult::ConnectionLost(code),
                                        SessionEventLoopState::Disconnected,
                                    ))
                                } else {
                                    Ok((
                                        SessionPollResult::Transport(r),
                                        SessionEventLoopState::Connected(c, activity),
                                    ))
                                }
                            }
                            r = activity.next() => {
                                let Some(r) = r else {
                                    session_error!(slf.inner, "Session activity loop ended unexpectedly");
                                    return Err(StatusCode::BadUnexpectedError);
                                };

                                Ok((
                                    SessionPollResult::SessionActivity(r),
                                    SessionEventLoopState::Connected(c, activity),
                                ))
                            }
                        }
                    }
                    SessionEventLoopState::Disconnected => {
                        let connector = SessionConnector::new(slf.inner.clone());

                        let _ = slf.inner.state_watch_tx.send(SessionState::Connecting);

                        Ok((
                            SessionPollResult::BeginConnect,
                            SessionEventLoopState::Connecting(
                                connector,
                                slf.retry.new_backoff(),
                                Instant::now(),
                            ),
                        ))
                    }
                    SessionEventLoopState::Connecting(connector, mut backoff, next_try) => {
                        tokio::time::sleep_until(next_try.into()).await;

                        match connector.try_connect().await {
                            Ok((channel, result)) => {
                                session_debug!(slf.inner, "Connected to {}", slf.inner.endpoint_url());
                                let _ = slf.inner.state_watch_tx.send(SessionState::Connected);
                                slf.has_connected = true;
                                Ok((
                                    SessionPollResult::Reconnected(result),
                                    SessionEventLoopState::Connected(
                                        channel,
                                        SessionActivityLoop::new(
                                            slf.inner.clone(),
                                            slf.keep_alive_interval,
                                        )
                                        .run()
                                        .boxed(),
                                    ),
                                ))
                            }
                            Err(e) => {
                                session_warn!(slf.inner, "Failed to connect to server, status code: {e}");
                                let retry = if slf.has_connected { backoff.next() } else { None };
                                match retry {
                                    Some(x) => Ok((
                                        SessionPollResult::ReconnectFailed(e),
                                        SessionEventLoopState::Connecting(
                                            connector,
                                            backoff,
                                            Instant::now() + x,
                                        ),
                                    )),
                                    None => {
                                        let _ = slf.inner.state_watch_tx.send(SessionState::Disconnected);
                                        Err(e)
                                    }
                                }
                            }
                        }
                    }
                }?;

                Ok(Some((res, (slf, state))))
            },
        )
    }
}

/// Periodic activity performed by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionActivity {
    /// A keep alive request was sent to the server and a response was received with a successful state.
    KeepAliveSucceeded,
    /// A keep alive request was sent to the server, but it failed or the server was in an invalid state.
    KeepAliveFailed(StatusCode),
}

struct SessionActivityLoop {
    inner: Arc<Session>,
    keep_alive: tokio::time::Interval,
}

impl SessionActivityLoop {
    pub fn new(inner: Arc<Session>, keep_alive_interval: Duration) -> Self {
        // The first tick of an interval is immediate, the session was only just activated
        let mut keep_alive = tokio::time::interval_at(
            tokio::time::Instant::now() + keep_alive_interval,
            keep_alive_interval,
        );
        keep_alive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        Self { inner, keep_alive }
    }

    async fn keep_alive(&self) -> SessionActivity {
        let node_id: NodeId = VariableId::Server_ServerStatus_State.into();
        let res = self
            .inner
            .read(
                &[ReadValueId::from(&node_id)],
                TimestampsToReturn::Server,
                1f64,
            )
            .await;

        let value = match res.map(|r| r.into_iter().next()) {
            Ok(Some(dv)) => dv,
            // An empty result for one node read is a server bug
            Ok(None) => return SessionActivity::KeepAliveFailed(StatusCode::BadUnknownResponse),
            Err(e) => return SessionActivity::KeepAliveFailed(e),
        };

        let Some(state) = value.value.as_ref().and_then(|v| v.as_i64()) else {
            return SessionActivity::KeepAliveFailed(StatusCode::BadUnknownResponse);
        };

        if state == ServerState::Running as i64 {
            SessionActivity::KeepAliveSucceeded
        } else {
            warn!("Keep alive failed, non-running server state {state}");
            SessionActivity::KeepAliveFailed(StatusCode::BadServerHalted)
        }
    }

    pub fn run(self) -> impl Stream<Item = SessionActivity> {
        futures::stream::unfold(self, |mut slf| async move {
            slf.keep_alive.tick().await;
            let activity = slf.keep_alive().await;
            Some((activity, slf))
        })
    }
}
