// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    collections::VecDeque,
    io::{BufRead, Cursor},
};

use tokio::io::AsyncWriteExt;

use crate::{
    core::{
        comms::{chunker::Chunker, message_chunk::MessageChunk, secure_channel::SecureChannel},
        supported_message::SupportedMessage,
    },
    types::StatusCode,
};

#[derive(Copy, Clone, Debug)]
enum SendBufferState {
    Reading(usize),
    Writing,
}

/// Outgoing bytes of the transport.
///
/// `write` splits a message into chunks and queues them. `encode_next_chunk` moves one chunk into
/// the buffer, and `read_into_async` drains the buffer into the socket. The last step may be
/// cancelled and resumed without losing bytes.
pub struct SendBuffer {
    buffer: Cursor<Vec<u8>>,
    chunks: VecDeque<MessageChunk>,
    last_request_id: u32,
    last_sent_sequence_number: u32,
    /// Maximum size of a message, total. Use 0 for no limit
    pub max_message_size: usize,
    /// Maximum number of chunks in a message. Use 0 for no limit
    pub max_chunk_count: usize,
    /// Maximum size of each individual chunk.
    pub send_buffer_size: usize,

    state: SendBufferState,
}

impl SendBuffer {
    pub fn new(buffer_size: usize, max_message_size: usize, max_chunk_count: usize) -> Self {
        Self {
            buffer: Cursor::new(Vec::with_capacity(buffer_size)),
            chunks: VecDeque::with_capacity(max_chunk_count.min(64)),
            last_request_id: 1000,
            last_sent_sequence_number: 0,
            max_message_size,
            max_chunk_count,
            send_buffer_size: buffer_size,
            state: SendBufferState::Writing,
        }
    }

    pub fn encode_next_chunk(&mut self) -> Result<(), StatusCode> {
        if matches!(self.state, SendBufferState::Reading(_)) {
            return Err(StatusCode::BadInvalidState);
        }

        let Some(next_chunk) = self.chunks.pop_front() else {
            return Ok(());
        };

        trace!("Sending chunk of {} bytes", next_chunk.data.len());
        let buffer = self.buffer.get_mut();
        buffer.clear();
        buffer.extend_from_slice(&next_chunk.data);
        self.buffer.set_position(0);
        self.state = SendBufferState::Reading(next_chunk.data.len());

        Ok(())
    }

    pub fn write(
        &mut self,
        request_id: u32,
        message: SupportedMessage,
        secure_channel: &SecureChannel,
    ) -> Result<u32, StatusCode> {
        trace!("Writing request to buffer");

        let chunks = Chunker::encode(
            self.last_sent_sequence_number.wrapping_add(1),
            request_id,
            self.max_message_size,
            self.send_buffer_size,
            secure_channel,
            &message,
        )?;

        if self.max_chunk_count > 0 && chunks.len() > self.max_chunk_count {
            error!(
                "Cannot write message since {} chunks exceeds {} chunk limit",
                chunks.len(),
                self.max_chunk_count
            );
            Err(StatusCode::BadCommunicationError)
        } else {
            // Sequence number monotonically increases per chunk
            self.last_sent_sequence_number = self
                .last_sent_sequence_number
                .wrapping_add(chunks.len() as u32);
            self.chunks.extend(chunks);
            Ok(request_id)
        }
    }

    pub fn next_request_id(&mut self) -> u32 {
        self.last_request_id = self.last_request_id.wrapping_add(1).max(1);
        self.last_request_id
    }

    pub async fn read_into_async(
        &mut self,
        write: &mut (impl tokio::io::AsyncWrite + Unpin),
    ) -> Result<(), tokio::io::Error> {
        let end = match self.state {
            SendBufferState::Writing => return Ok(()),
            SendBufferState::Reading(end) => end,
        };

        let pos = self.buffer.position() as usize;
        let buf = &self.buffer.get_ref()[pos..end];
        // The position only moves after the write completes, and `write` itself is cancel safe.
        let written = write.write(buf).await?;

        self.buffer.consume(written);

        if end == self.buffer.position() as usize {
            self.state = SendBufferState::Writing;
            self.buffer.get_mut().clear();
            self.buffer.set_position(0);
        }

        Ok(())
    }

    pub fn should_encode_chunks(&self) -> bool {
        !self.chunks.is_empty() && !self.can_read()
    }

    pub fn can_read(&self) -> bool {
        matches!(self.state, SendBufferState::Reading(_))
    }

    /// Applies the limits the server sent back in its ACK. Limits only ever shrink.
    pub fn revise(
        &mut self,
        send_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) {
        if self.send_buffer_size > send_buffer_size && send_buffer_size > 0 {
            self.buffer.get_mut().shrink_to(send_buffer_size);
            self.send_buffer_size = send_buffer_size;
        }
        if max_message_size > 0 && (self.max_message_size == 0 || self.max_message_size > max_message_size) {
            self.max_message_size = max_message_size;
        }
        if max_chunk_count > 0 && (self.max_chunk_count == 0 || self.max_chunk_count > max_chunk_count) {
            self.max_chunk_count = max_chunk_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::SendBuffer;

    use crate::core::comms::secure_channel::{Role, SecureChannel};
    use crate::types::{
        DateTime, DecodingOptions, NodeId, ReadRequest, ReadValueId, RequestHeader, StatusCode,
        TimestampsToReturn,
    };

    fn get_buffer_and_channel() -> (SendBuffer, SecureChannel) {
        let buffer = SendBuffer::new(8192, 81920, 5);
        let channel = SecureChannel::new(Role::Client, DecodingOptions::default());
        (buffer, channel)
    }

    fn read_request(count: u32) -> ReadRequest {
        ReadRequest {
            request_header: RequestHeader::new(&NodeId::null(), &DateTime::null(), 101),
            max_age: 0.0,
            timestamps_to_return: TimestampsToReturn::Both,
            nodes_to_read: Some(
                (0..count)
                    .map(|r| ReadValueId {
                        node_id: NodeId::new(1, r),
                        attribute_id: 13,
                        ..Default::default()
                    })
                    .collect(),
            ),
        }
    }

    #[tokio::test]
    async fn simple_message() {
        let (mut buffer, channel) = get_buffer_and_channel();

        let request_id = buffer.write(1, read_request(1).into(), &channel).unwrap();
        assert_eq!(request_id, 1);

        assert!(buffer.should_encode_chunks());
        buffer.encode_next_chunk().unwrap();
        assert!(buffer.can_read());
        assert!(!buffer.should_encode_chunks());

        let mut cursor = Cursor::new(Vec::new());
        buffer.read_into_async(&mut cursor).await.unwrap();
        assert!(!buffer.can_read());
        assert!(cursor.get_ref().len() > 50);
        assert_eq!(&cursor.get_ref()[0..4], b"MSGF");
    }

    #[tokio::test]
    async fn chunked_message() {
        let (mut buffer, channel) = get_buffer_and_channel();

        buffer.write(1, read_request(1000).into(), &channel).unwrap();
        assert_eq!(buffer.chunks.len(), 3);

        let mut cursor = Cursor::new(Vec::new());
        for _ in 0..3 {
            assert!(buffer.should_encode_chunks());
            buffer.encode_next_chunk().unwrap();
            assert!(!buffer.should_encode_chunks());
            buffer.read_into_async(&mut cursor).await.unwrap();
        }
        assert!(!buffer.should_encode_chunks());
        assert!(!buffer.can_read());
        let written = cursor.get_ref().len();
        assert!(written > 8192 * 2 && written < 8192 * 3);
    }

    #[tokio::test]
    async fn partial_writes_resume() {
        let (mut buffer, channel) = get_buffer_and_channel();
        buffer.write(1, read_request(1000).into(), &channel).unwrap();
        buffer.encode_next_chunk().unwrap();

        // A socket that accepts half a chunk at a time
        let mut half = [0u8; 4096];
        let mut cursor = Cursor::new(&mut half as &mut [u8]);
        buffer.read_into_async(&mut cursor).await.unwrap();
        assert!(buffer.can_read());
        assert_eq!(cursor.position(), 4096);
        cursor.set_position(0);
        buffer.read_into_async(&mut cursor).await.unwrap();
        assert!(!buffer.can_read());
        assert_eq!(cursor.position(), 4096);
    }

    #[test]
    fn message_limits() {
        let (mut buffer, channel) = get_buffer_and_channel();
        assert_eq!(
            buffer.write(1, read_request(10000).into(), &channel),
            Err(StatusCode::BadRequestTooLarge)
        );
        assert_eq!(
            buffer.write(2, read_request(4000).into(), &channel),
            Err(StatusCode::BadCommunicationError)
        );
    }

    #[test]
    fn revise_only_shrinks() {
        let mut buffer = SendBuffer::new(65535, 0, 0);
        buffer.revise(8192, 65536, 4);
        assert_eq!(buffer.send_buffer_size, 8192);
        assert_eq!(buffer.max_message_size, 65536);
        assert_eq!(buffer.max_chunk_count, 4);
        buffer.revise(65535, 0, 0);
        assert_eq!(buffer.send_buffer_size, 8192);
        assert_eq!(buffer.max_chunk_count, 4);
    }
}
