// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{collections::HashMap, sync::Arc, time::Instant};

use futures::future::Either;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use crate::{
    core::{
        comms::{
            chunker::Chunker,
            message_chunk::{ChunkInfo, MessageChunk, MessageIsFinalType},
            secure_channel::SecureChannel,
            tcp_codec::Message,
        },
        supported_message::SupportedMessage,
    },
    types::StatusCode,
};

use super::buffer::SendBuffer;

pub(crate) type ResponseCallback = oneshot::Sender<Result<SupportedMessage, StatusCode>>;

#[derive(Debug)]
struct PendingChunk {
    info: ChunkInfo,
    chunk: MessageChunk,
}

struct MessageState {
    callback: ResponseCallback,
    chunks: Vec<PendingChunk>,
    deadline: Instant,
}

/// Requests in flight on one connection, keyed by request id.
pub(super) struct TransportState {
    /// Only polled while fewer than `max_inflight` requests await a response.
    outgoing_recv: mpsc::Receiver<OutgoingMessage>,
    message_states: HashMap<u32, MessageState>,
    max_inflight: usize,
    pub(super) secure_channel: Arc<RwLock<SecureChannel>>,
    /// Max intermediate chunks buffered for one response. 0 means no limit.
    max_pending_incoming: usize,
    last_received_sequence_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportPollResult {
    OutgoingMessage,
    OutgoingMessageSent,
    IncomingMessage,
    Closed(StatusCode),
}

pub(crate) struct OutgoingMessage {
    pub request: SupportedMessage,
    pub callback: Option<ResponseCallback>,
    pub deadline: Instant,
}

impl TransportState {
    pub fn new(
        secure_channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: mpsc::Receiver<OutgoingMessage>,
        max_pending_incoming: usize,
        max_inflight: usize,
    ) -> Self {
        Self {
            secure_channel,
            outgoing_recv,
            message_states: HashMap::new(),
            max_inflight: max_inflight.max(1),
            max_pending_incoming,
            last_received_sequence_number: 0,
        }
    }

    /// Wait for an outgoing message, expiring requests whose deadline passes in the meantime.
    pub async fn wait_for_outgoing_message(
        &mut self,
        send_buffer: &mut SendBuffer,
    ) -> Option<(SupportedMessage, u32)> {
        loop {
            let timeout_fut = match self.next_timeout() {
                Some(t) => Either::Left(tokio::time::sleep_until(t.into())),
                None => Either::Right(futures::future::pending::<()>()),
            };

            if self.max_inflight > self.message_states.len() {
                tokio::select! {
                    _ = timeout_fut => {
                        continue;
                    }
                    outgoing = self.outgoing_recv.recv() => {
                        let outgoing = outgoing?;
                        let request_id = send_buffer.next_request_id();
                        if let Some(callback) = outgoing.callback {
                            self.message_states.insert(request_id, MessageState {
                                callback,
                                chunks: Vec::new(),
                                deadline: outgoing.deadline,
                            });
                        }
                        break Some((outgoing.request, request_id));
                    }
                }
            } else {
                timeout_fut.await;
            }
        }
    }

    pub fn handle_incoming_message(&mut self, message: Message) -> Result<(), StatusCode> {
        match message {
            Message::Chunk(chunk) => self.process_chunk(chunk),
            Message::Error(error) => {
                let status = error.status_code();
                error!(
                    "Server sent an error {} ({}), closing connection",
                    status, error.reason
                );
                Err(if status.is_bad() {
                    status
                } else {
                    StatusCode::BadUnexpectedError
                })
            }
            m => {
                error!("Expected a chunk or an error, got {:?}", m);
                Err(StatusCode::BadUnexpectedError)
            }
        }
    }

    fn next_timeout(&mut self) -> Option<Instant> {
        let now = Instant::now();
        let mut next_timeout: Option<Instant> = None;
        let mut timed_out = Vec::new();
        for (id, state) in &self.message_states {
            if state.deadline <= now {
                timed_out.push(*id);
            } else if next_timeout.map_or(true, |t| t > state.deadline) {
                next_timeout = Some(state.deadline);
            }
        }
        for id in timed_out {
            if let Some(state) = self.message_states.remove(&id) {
                debug!("Message {} timed out", id);
                let _ = state.callback.send(Err(StatusCode::BadTimeout));
            }
        }
        next_timeout
    }

    fn process_chunk(&mut self, chunk: MessageChunk) -> Result<(), StatusCode> {
        let info = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            chunk.chunk_info(&secure_channel.decoding_options())?
        };
        let req_id = info.sequence_header.request_id;

        // Responses nobody waits for any more are dropped
        let Some(message_state) = self.message_states.get_mut(&req_id) else {
            debug!("Discarding chunk for request {} with no pending request", req_id);
            return Ok(());
        };

        match info.message_header.is_final {
            MessageIsFinalType::Intermediate => {
                trace!(
                    "receive chunk intermediate {}:{}",
                    req_id,
                    info.sequence_header.sequence_number
                );
                message_state.chunks.push(PendingChunk { info, chunk });
                let chunks_len = message_state.chunks.len();
                if self.max_pending_incoming > 0 && chunks_len > self.max_pending_incoming {
                    error!(
                        "too many pending incoming chunks {} > {}",
                        chunks_len, self.max_pending_incoming
                    );
                    if let Some(state) = self.message_states.remove(&req_id) {
                        let _ = state.callback.send(Err(StatusCode::BadEncodingLimitsExceeded));
                    }
                }
            }
            MessageIsFinalType::FinalError => {
                info!("Discarding response {} aborted by the server", req_id);
                if let Some(state) = self.message_states.remove(&req_id) {
                    let _ = state.callback.send(Err(StatusCode::BadCommunicationError));
                }
            }
            MessageIsFinalType::Final => {
                message_state.chunks.push(PendingChunk { info, chunk });
                if let Some(state) = self.message_states.remove(&req_id) {
                    let chunks = Self::merge_chunks(state.chunks);
                    let message = self.turn_received_chunks_into_message(&chunks);
                    // A response that fails to decode only fails its own request, unless the
                    // chunks are out of sequence, which breaks the channel.
                    match message {
                        Ok(message) => {
                            let _ = state.callback.send(Ok(message));
                        }
                        Err(StatusCode::BadSequenceNumberInvalid) => {
                            let _ = state.callback.send(Err(StatusCode::BadSequenceNumberInvalid));
                            return Err(StatusCode::BadSequenceNumberInvalid);
                        }
                        Err(e) => {
                            let _ = state.callback.send(Err(e));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn turn_received_chunks_into_message(
        &mut self,
        chunks: &[MessageChunk],
    ) -> Result<SupportedMessage, StatusCode> {
        let secure_channel = trace_read_lock!(self.secure_channel);
        self.last_received_sequence_number = Chunker::validate_chunks(
            self.last_received_sequence_number.wrapping_add(1),
            &secure_channel,
            chunks,
        )?;
        Chunker::decode(chunks, &secure_channel, None)
    }

    /// Orders the chunks of one response by sequence number, dropping duplicates.
    fn merge_chunks(mut chunks: Vec<PendingChunk>) -> Vec<MessageChunk> {
        if chunks.len() == 1 {
            return chunks.into_iter().map(|c| c.chunk).collect();
        }
        chunks.sort_by_key(|c| c.info.sequence_header.sequence_number);
        let mut ret: Vec<MessageChunk> = Vec::with_capacity(chunks.len());
        let mut expect_sequence_number = None;
        for c in chunks {
            let sequence_number = c.info.sequence_header.sequence_number;
            if let Some(expected) = expect_sequence_number {
                if sequence_number != expected {
                    warn!(
                        "received wrong chunk expected seq={}, got={}",
                        expected, sequence_number
                    );
                    continue;
                }
            }
            expect_sequence_number = Some(sequence_number.wrapping_add(1));
            ret.push(c.chunk);
        }
        ret
    }

    /// Close the transport, failing every pending request with `status`, or with
    /// `BadConnectionClosed` when `status` is good. Safe to call again after being cancelled.
    pub async fn close(&mut self, status: StatusCode) -> StatusCode {
        let request_status = if status.is_good() {
            StatusCode::BadConnectionClosed
        } else {
            status
        };

        for (_, pending) in self.message_states.drain() {
            let _ = pending.callback.send(Err(request_status));
        }

        self.outgoing_recv.close();
        while let Some(msg) = self.outgoing_recv.recv().await {
            if let Some(cb) = msg.callback {
                let _ = cb.send(Err(request_status));
            }
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use parking_lot::RwLock;
    use tokio::sync::{mpsc, oneshot};

    use super::{OutgoingMessage, TransportState};
    use crate::{
        client::transport::buffer::SendBuffer,
        core::{
            comms::{
                chunker::Chunker,
                secure_channel::{Role, SecureChannel},
                tcp_codec::Message,
                tcp_types::ErrorMessage,
            },
            supported_message::SupportedMessage,
        },
        types::{
            DataValue, DecodingOptions, ReadRequest, ReadResponse, RequestHeader, ResponseHeader,
            StatusCode,
        },
    };

    fn state() -> (TransportState, mpsc::Sender<OutgoingMessage>, SendBuffer) {
        let channel = Arc::new(RwLock::new(SecureChannel::new(
            Role::Client,
            DecodingOptions::default(),
        )));
        let (send, recv) = mpsc::channel(10);
        (
            TransportState::new(channel, recv, 0, 10),
            send,
            SendBuffer::new(8192, 0, 0),
        )
    }

    fn outgoing(
        deadline: Duration,
    ) -> (
        OutgoingMessage,
        oneshot::Receiver<Result<SupportedMessage, StatusCode>>,
    ) {
        let (cb, recv) = oneshot::channel();
        (
            OutgoingMessage {
                request: ReadRequest {
                    request_header: RequestHeader::dummy(),
                    ..Default::default()
                }
                .into(),
                callback: Some(cb),
                deadline: Instant::now() + deadline,
            },
            recv,
        )
    }

    fn response_chunks(request_id: u32) -> Vec<Message> {
        let server = SecureChannel::new(Role::Server, DecodingOptions::default());
        let response = ReadResponse {
            response_header: ResponseHeader::new_good(&RequestHeader::dummy()),
            results: Some(vec![DataValue::value_only(42i32)]),
            diagnostic_infos: None,
        };
        Chunker::encode(1, request_id, 0, 8192, &server, &response.into())
            .unwrap()
            .into_iter()
            .map(Message::Chunk)
            .collect()
    }

    #[tokio::test]
    async fn response_resolves_request() {
        let (mut state, send, mut buffer) = state();
        let (msg, recv) = outgoing(Duration::from_secs(10));
        send.send(msg).await.unwrap();
        let (_, request_id) = state.wait_for_outgoing_message(&mut buffer).await.unwrap();

        for chunk in response_chunks(request_id) {
            state.handle_incoming_message(chunk).unwrap();
        }
        let response = recv.await.unwrap().unwrap();
        assert!(matches!(response, SupportedMessage::ReadResponse(_)));
    }

    #[tokio::test]
    async fn unknown_request_id_is_ignored() {
        let (mut state, _send, _) = state();
        for chunk in response_chunks(5555) {
            state.handle_incoming_message(chunk).unwrap();
        }
    }

    #[tokio::test]
    async fn expired_request_times_out() {
        let (mut state, send, mut buffer) = state();
        let (msg, recv) = outgoing(Duration::from_millis(20));
        send.send(msg).await.unwrap();
        state.wait_for_outgoing_message(&mut buffer).await.unwrap();

        // Waiting for the next message expires the first one
        let _ = tokio::time::timeout(
            Duration::from_millis(200),
            state.wait_for_outgoing_message(&mut buffer),
        )
        .await;
        assert_eq!(recv.await.unwrap().unwrap_err(), StatusCode::BadTimeout);
    }

    #[tokio::test]
    async fn close_fails_pending_and_queued() {
        let (mut state, send, mut buffer) = state();
        let (first, first_recv) = outgoing(Duration::from_secs(10));
        let (second, second_recv) = outgoing(Duration::from_secs(10));
        send.send(first).await.unwrap();
        state.wait_for_outgoing_message(&mut buffer).await.unwrap();
        send.send(second).await.unwrap();

        assert_eq!(state.close(StatusCode::Good).await, StatusCode::Good);
        assert_eq!(
            first_recv.await.unwrap().unwrap_err(),
            StatusCode::BadConnectionClosed
        );
        assert_eq!(
            second_recv.await.unwrap().unwrap_err(),
            StatusCode::BadConnectionClosed
        );
    }

    #[test]
    fn error_message_closes_with_its_status() {
        let (mut state, _send, _) = state();
        let err = ErrorMessage::from_status_code(StatusCode::BadTcpServerTooBusy);
        assert_eq!(
            state.handle_incoming_message(Message::Error(err)),
            Err(StatusCode::BadTcpServerTooBusy)
        );
    }
}
