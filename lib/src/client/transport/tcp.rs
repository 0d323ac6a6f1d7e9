// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{net::SocketAddr, sync::Arc};

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::{
    io::{AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::mpsc,
};
use tokio_util::codec::FramedRead;

use super::{
    buffer::SendBuffer,
    core::{OutgoingMessage, TransportPollResult, TransportState},
};
use crate::{
    core::{
        comms::{
            secure_channel::SecureChannel,
            tcp_codec::{Message, TcpCodec},
            tcp_types::{AcknowledgeMessage, HelloMessage, MIN_CHUNK_SIZE},
        },
        supported_message::SupportedMessage,
    },
    net::Dialer,
    types::{encoding::BinaryEncoder, StatusCode},
};

#[derive(Debug, Clone, Copy)]
enum TransportCloseState {
    Open,
    Closing(StatusCode),
    Closed(StatusCode),
}

/// A UA TCP connection. Nothing is sent or received unless `poll` is called.
pub(crate) struct TcpTransport {
    state: TransportState,
    read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
    write: WriteHalf<TcpStream>,
    send_buffer: SendBuffer,
    should_close: bool,
    closed: TransportCloseState,
    /// Source address of the connection
    local_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct TransportConfiguration {
    pub max_pending_incoming: usize,
    pub max_inflight: usize,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub max_message_size: usize,
    pub max_chunk_count: usize,
}

impl Default for TransportConfiguration {
    fn default() -> Self {
        Self {
            max_pending_incoming: 5,
            max_inflight: 20,
            send_buffer_size: 65535,
            recv_buffer_size: 65535,
            max_message_size: 0,
            max_chunk_count: 0,
        }
    }
}

impl TcpTransport {
    /// Connect to `endpoint_url` through `dialer` and exchange HEL / ACK. The caller drives the
    /// returned transport with `poll`.
    pub async fn connect(
        secure_channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: mpsc::Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        dialer: &Dialer,
        endpoint_url: &str,
    ) -> Result<Self, StatusCode> {
        let socket = dialer.connect_url(endpoint_url).await?;
        let local_addr = socket.local_addr().map_err(|err| {
            error!("Cannot get the local address of the socket, err = {:?}", err);
            StatusCode::BadCommunicationError
        })?;
        let (reader, mut writer) = tokio::io::split(socket);

        let hello = HelloMessage::new(
            endpoint_url,
            config.send_buffer_size,
            config.recv_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        let mut framed_read = {
            let secure_channel = trace_read_lock!(secure_channel);
            FramedRead::new(reader, TcpCodec::new(secure_channel.decoding_options()))
        };

        writer
            .write_all(&hello.encode_to_vec())
            .await
            .map_err(|err| {
                error!("Cannot send hello to server, err = {:?}", err);
                StatusCode::BadCommunicationError
            })?;

        let ack = match framed_read.next().await {
            Some(Ok(Message::Acknowledge(ack))) => {
                trace!("Received acknowledgement: {:?}", ack);
                ack
            }
            Some(Ok(Message::Error(err))) => {
                let status = err.status_code();
                error!(
                    "Server rejected hello with {} ({})",
                    status, err.reason
                );
                return Err(if status.is_bad() {
                    status
                } else {
                    StatusCode::BadConnectionRejected
                });
            }
            other => {
                error!(
                    "Unexpected error while waiting for server ACK. Expected ACK, got {:?}",
                    other
                );
                return Err(StatusCode::BadConnectionClosed);
            }
        };

        let send_buffer = Self::revised_send_buffer(&config, &ack)?;

        Ok(Self {
            state: TransportState::new(
                secure_channel,
                outgoing_recv,
                config.max_pending_incoming,
                config.max_inflight,
            ),
            read: framed_read,
            write: writer,
            send_buffer,
            should_close: false,
            closed: TransportCloseState::Open,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server's receive limits bound what we send.
    fn revised_send_buffer(
        config: &TransportConfiguration,
        ack: &AcknowledgeMessage,
    ) -> Result<SendBuffer, StatusCode> {
        let receive_buffer_size = ack.receive_buffer_size as usize;
        if receive_buffer_size < MIN_CHUNK_SIZE {
            error!(
                "Server receive buffer size {} is below the minimum {}",
                receive_buffer_size, MIN_CHUNK_SIZE
            );
            return Err(StatusCode::BadConnectionRejected);
        }
        let mut send_buffer = SendBuffer::new(
            config.send_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        send_buffer.revise(
            receive_buffer_size,
            ack.max_message_size as usize,
            ack.max_chunk_count as usize,
        );
        debug!(
            "Revised send buffer size = {}, max message size = {}, max chunk count = {}",
            send_buffer.send_buffer_size, send_buffer.max_message_size, send_buffer.max_chunk_count
        );
        Ok(send_buffer)
    }

    fn handle_incoming_message(
        &mut self,
        incoming: Option<Result<Message, std::io::Error>>,
    ) -> TransportPollResult {
        let Some(incoming) = incoming else {
            debug!("Server closed the connection");
            return TransportPollResult::Closed(StatusCode::BadConnectionClosed);
        };
        match incoming {
            Ok(message) => {
                if let Err(e) = self.state.handle_incoming_message(message) {
                    TransportPollResult::Closed(e)
                } else {
                    TransportPollResult::IncomingMessage
                }
            }
            Err(err) => {
                error!("Error reading from stream {:?}", err);
                TransportPollResult::Closed(StatusCode::BadConnectionClosed)
            }
        }
    }

    async fn poll_inner(&mut self) -> TransportPollResult {
        // Outgoing messages are only accepted while the send buffer is empty, so the buffer
        // never holds more than one chunk.
        if self.send_buffer.should_encode_chunks() {
            if let Err(e) = self.send_buffer.encode_next_chunk() {
                return TransportPollResult::Closed(e);
            }
        }

        if self.send_buffer.can_read() {
            tokio::select! {
                r = self.send_buffer.read_into_async(&mut self.write) => {
                    if let Err(e) = r {
                        error!("write bytes task failed: {}", e);
                        return TransportPollResult::Closed(StatusCode::BadCommunicationError);
                    }
                    TransportPollResult::OutgoingMessageSent
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming)
                }
            }
        } else {
            if self.should_close {
                debug!("Writer is setting the connection state to finished(good)");
                return TransportPollResult::Closed(StatusCode::Good);
            }
            tokio::select! {
                outgoing = self.state.wait_for_outgoing_message(&mut self.send_buffer) => {
                    let Some((outgoing, request_id)) = outgoing else {
                        return TransportPollResult::Closed(StatusCode::Good);
                    };
                    if matches!(outgoing, SupportedMessage::CloseSecureChannelRequest(_)) {
                        self.should_close = true;
                        debug!("Writer is about to send a CloseSecureChannelRequest which means it should close in a moment");
                    }
                    let secure_channel = trace_read_lock!(self.state.secure_channel);
                    if let Err(e) = self.send_buffer.write(request_id, outgoing, &secure_channel) {
                        TransportPollResult::Closed(e)
                    } else {
                        TransportPollResult::OutgoingMessage
                    }
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming)
                }
            }
        }
    }

    /// Make progress on sending or receiving. Cancel safe: dropping the future loses nothing,
    /// and a close interrupted midway is finished by the next call.
    pub async fn poll(&mut self) -> TransportPollResult {
        match self.closed {
            TransportCloseState::Open => {}
            TransportCloseState::Closing(c) => {
                let r = self.state.close(c).await;
                self.closed = TransportCloseState::Closed(c);
                return TransportPollResult::Closed(r);
            }
            TransportCloseState::Closed(c) => {
                return TransportPollResult::Closed(c);
            }
        }

        let r = self.poll_inner().await;
        if let TransportPollResult::Closed(status) = &r {
            self.closed = TransportCloseState::Closing(*status);
            let r = self.state.close(*status).await;
            let _ = self.write.shutdown().await;
            self.closed = TransportCloseState::Closed(r);
        }
        r
    }
}
