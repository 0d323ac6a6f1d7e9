// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A message chunk is a message or a portion of a message which has been split for transmission.
//! With security policy `None` the body is neither signed nor encrypted.

use std::io::{Cursor, Read, Write};

use crate::types::{encoding::*, status_code::StatusCode};

use super::{
    security_header::{
        AsymmetricSecurityHeader, SecurityHeader, SequenceHeader, SymmetricSecurityHeader,
    },
    security_policy::SecurityPolicy,
    tcp_types::{
        CHUNK_FINAL, CHUNK_FINAL_ERROR, CHUNK_INTERMEDIATE, CHUNK_MESSAGE,
        CLOSE_SECURE_CHANNEL_MESSAGE, MIN_CHUNK_SIZE, OPEN_SECURE_CHANNEL_MESSAGE,
    },
};

pub const MESSAGE_CHUNK_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageChunkType {
    Message,
    OpenSecureChannel,
    CloseSecureChannel,
}

impl MessageChunkType {
    pub fn is_open_secure_channel(&self) -> bool {
        *self == MessageChunkType::OpenSecureChannel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIsFinalType {
    Intermediate,
    Final,
    /// The sender gave up on the message part way through
    FinalError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunkHeader {
    pub message_type: MessageChunkType,
    pub is_final: MessageIsFinalType,
    /// Size of the whole chunk including this header
    pub message_size: u32,
    pub secure_channel_id: u32,
}

impl BinaryEncoder<MessageChunkHeader> for MessageChunkHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_CHUNK_HEADER_SIZE
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let message_type = match self.message_type {
            MessageChunkType::Message => CHUNK_MESSAGE,
            MessageChunkType::OpenSecureChannel => OPEN_SECURE_CHANNEL_MESSAGE,
            MessageChunkType::CloseSecureChannel => CLOSE_SECURE_CHANNEL_MESSAGE,
        };
        let is_final = match self.is_final {
            MessageIsFinalType::Intermediate => CHUNK_INTERMEDIATE,
            MessageIsFinalType::Final => CHUNK_FINAL,
            MessageIsFinalType::FinalError => CHUNK_FINAL_ERROR,
        };
        let mut size = write_raw(stream, message_type)?;
        size += write_u8(stream, is_final)?;
        size += write_u32(stream, self.message_size)?;
        size += write_u32(stream, self.secure_channel_id)?;
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let mut code = [0u8; 3];
        read_bytes(stream, &mut code)?;
        let message_type = match &code[..] {
            CHUNK_MESSAGE => MessageChunkType::Message,
            OPEN_SECURE_CHANNEL_MESSAGE => MessageChunkType::OpenSecureChannel,
            CLOSE_SECURE_CHANNEL_MESSAGE => MessageChunkType::CloseSecureChannel,
            _ => {
                error!("Invalid message code {:?}", code);
                return Err(StatusCode::BadDecodingError);
            }
        };
        let is_final = match read_u8(stream)? {
            CHUNK_FINAL => MessageIsFinalType::Final,
            CHUNK_INTERMEDIATE => MessageIsFinalType::Intermediate,
            CHUNK_FINAL_ERROR => MessageIsFinalType::FinalError,
            other => {
                error!("Invalid chunk type {}", other);
                return Err(StatusCode::BadDecodingError);
            }
        };
        Ok(MessageChunkHeader {
            message_type,
            is_final,
            message_size: read_u32(stream)?,
            secure_channel_id: read_u32(stream)?,
        })
    }
}

/// A chunk holding its raw bytes, headers included.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunk {
    pub data: Vec<u8>,
}

impl BinaryEncoder<MessageChunk> for MessageChunk {
    fn byte_len(&self) -> usize {
        self.data.len()
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_raw(stream, &self.data)
    }

    fn decode<S: Read>(in_stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let chunk_header =
            MessageChunkHeader::decode(in_stream, decoding_options).map_err(|err| {
                error!("Cannot decode chunk header {:?}", err);
                StatusCode::BadCommunicationError
            })?;

        let message_size = chunk_header.message_size as usize;
        if message_size < MESSAGE_CHUNK_HEADER_SIZE {
            error!("Chunk size {} is smaller than its header", message_size);
            return Err(StatusCode::BadTcpMessageTypeInvalid);
        }
        if decoding_options.max_message_size > 0 && message_size > decoding_options.max_message_size
        {
            error!(
                "Chunk size {} exceeds the limit {}",
                message_size, decoding_options.max_message_size
            );
            return Err(StatusCode::BadTcpMessageTooLarge);
        }

        let mut stream = Cursor::new(vec![0u8; message_size]);
        let header_size = chunk_header.encode(&mut stream)?;
        let mut data = stream.into_inner();
        read_bytes(in_stream, &mut data[header_size..])?;
        Ok(MessageChunk { data })
    }
}

impl MessageChunk {
    pub fn new(
        sequence_number: u32,
        request_id: u32,
        message_type: MessageChunkType,
        is_final: MessageIsFinalType,
        secure_channel_id: u32,
        security_header: &SecurityHeader,
        body: &[u8],
    ) -> Result<MessageChunk, StatusCode> {
        let sequence_header = SequenceHeader {
            sequence_number,
            request_id,
        };
        let message_size = MESSAGE_CHUNK_HEADER_SIZE
            + security_header.byte_len()
            + sequence_header.byte_len()
            + body.len();
        trace!("Creating a chunk with a size of {}", message_size);

        let chunk_header = MessageChunkHeader {
            message_type,
            is_final,
            message_size: message_size as u32,
            secure_channel_id,
        };
        let mut stream = Cursor::new(Vec::with_capacity(message_size));
        chunk_header.encode(&mut stream)?;
        security_header.encode(&mut stream)?;
        sequence_header.encode(&mut stream)?;
        write_raw(&mut stream, body)?;
        Ok(MessageChunk {
            data: stream.into_inner(),
        })
    }

    /// How much body fits in a chunk of `chunk_size` bytes once the headers are written.
    pub fn body_size_from_message_size(
        security_header: &SecurityHeader,
        chunk_size: usize,
    ) -> Result<usize, StatusCode> {
        if chunk_size < MIN_CHUNK_SIZE {
            error!(
                "Chunk size {} is less than the minimum {}",
                chunk_size, MIN_CHUNK_SIZE
            );
            return Err(StatusCode::BadTcpInternalError);
        }
        Ok(chunk_size - MESSAGE_CHUNK_HEADER_SIZE - security_header.byte_len() - 8)
    }

    pub fn message_header(
        &self,
        decoding_options: &DecodingOptions,
    ) -> Result<MessageChunkHeader, StatusCode> {
        MessageChunkHeader::decode(&mut Cursor::new(&self.data), decoding_options)
    }

    pub fn is_open_secure_channel(&self, decoding_options: &DecodingOptions) -> bool {
        self.message_header(decoding_options)
            .map(|h| h.message_type.is_open_secure_channel())
            .unwrap_or(false)
    }

    pub fn chunk_info(&self, decoding_options: &DecodingOptions) -> Result<ChunkInfo, StatusCode> {
        ChunkInfo::new(self, decoding_options)
    }
}

/// The headers of a chunk and where its body lies.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInfo {
    pub message_header: MessageChunkHeader,
    pub security_header: SecurityHeader,
    pub sequence_header: SequenceHeader,
    pub body_offset: usize,
    pub body_length: usize,
}

impl ChunkInfo {
    pub fn new(
        chunk: &MessageChunk,
        decoding_options: &DecodingOptions,
    ) -> Result<ChunkInfo, StatusCode> {
        let mut stream = Cursor::new(&chunk.data);
        let message_header = MessageChunkHeader::decode(&mut stream, decoding_options)?;

        let security_header = if message_header.message_type.is_open_secure_channel() {
            let security_header = AsymmetricSecurityHeader::decode(&mut stream, decoding_options)
                .map_err(|err| {
                    error!("Cannot decode asymmetric security header, {:?}", err);
                    StatusCode::BadCommunicationError
                })?;
            if security_header.security_policy() != SecurityPolicy::None {
                error!(
                    "Security policy of chunk is unsupported, policy = {}",
                    security_header.security_policy_uri
                );
                return Err(StatusCode::BadSecurityPolicyRejected);
            }
            SecurityHeader::Asymmetric(security_header)
        } else {
            SecurityHeader::Symmetric(
                SymmetricSecurityHeader::decode(&mut stream, decoding_options).map_err(|err| {
                    error!("Cannot decode symmetric security header, {:?}", err);
                    StatusCode::BadCommunicationError
                })?,
            )
        };

        let sequence_header = SequenceHeader::decode(&mut stream, decoding_options).map_err(|err| {
            error!("Cannot decode sequence header {:?}", err);
            StatusCode::BadCommunicationError
        })?;

        let body_offset = stream.position() as usize;
        Ok(ChunkInfo {
            message_header,
            security_header,
            sequence_header,
            body_offset,
            body_length: chunk.data.len() - body_offset,
        })
    }

    pub fn body<'a>(&self, chunk: &'a MessageChunk) -> &'a [u8] {
        &chunk.data[self.body_offset..self.body_offset + self.body_length]
    }
}
