// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The connection level messages of UA TCP: HEL, ACK and ERR, and the 8 byte header every
//! message starts with.

use std::io::{Read, Write};

use crate::types::{encoding::*, status_code::StatusCode, string::UAString};

pub const CHUNK_MESSAGE: &[u8] = b"MSG";
pub const OPEN_SECURE_CHANNEL_MESSAGE: &[u8] = b"OPN";
pub const CLOSE_SECURE_CHANNEL_MESSAGE: &[u8] = b"CLO";

const HELLO_MESSAGE: &[u8] = b"HEL";
const ACKNOWLEDGE_MESSAGE: &[u8] = b"ACK";
const ERROR_MESSAGE: &[u8] = b"ERR";

pub const CHUNK_FINAL: u8 = b'F';
pub const CHUNK_INTERMEDIATE: u8 = b'C';
pub const CHUNK_FINAL_ERROR: u8 = b'A';

/// Smallest buffer size either side may negotiate
pub const MIN_CHUNK_SIZE: usize = 8192;

pub const MESSAGE_HEADER_LEN: usize = 8;

/// Longest endpoint url a HEL may carry
pub const MAX_ENDPOINT_URL_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Invalid,
    Hello,
    Acknowledge,
    Chunk,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub message_size: u32,
}

impl BinaryEncoder<MessageHeader> for MessageHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let code = match self.message_type {
            MessageType::Hello => HELLO_MESSAGE,
            MessageType::Acknowledge => ACKNOWLEDGE_MESSAGE,
            MessageType::Error => ERROR_MESSAGE,
            MessageType::Chunk | MessageType::Invalid => {
                error!(
                    "A {:?} cannot be written as a connection message",
                    self.message_type
                );
                return Err(StatusCode::BadEncodingError);
            }
        };
        let mut size = write_raw(stream, code)?;
        size += write_u8(stream, CHUNK_FINAL)?;
        size += write_u32(stream, self.message_size)?;
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let mut code = [0u8; 4];
        read_bytes(stream, &mut code)?;
        let message_size = read_u32(stream)?;
        Ok(MessageHeader {
            message_type: MessageHeader::message_type(&code),
            message_size,
        })
    }
}

impl MessageHeader {
    pub fn new(message_type: MessageType) -> MessageHeader {
        MessageHeader {
            message_type,
            message_size: 0,
        }
    }

    /// Classifies the first four bytes of a message. Connection messages must be final,
    /// chunks may be final, intermediate or aborted.
    pub fn message_type(code: &[u8; 4]) -> MessageType {
        let message_type = match &code[0..3] {
            HELLO_MESSAGE => MessageType::Hello,
            ACKNOWLEDGE_MESSAGE => MessageType::Acknowledge,
            ERROR_MESSAGE => MessageType::Error,
            CHUNK_MESSAGE | OPEN_SECURE_CHANNEL_MESSAGE | CLOSE_SECURE_CHANNEL_MESSAGE => {
                MessageType::Chunk
            }
            _ => {
                error!("Message type {:?} doesn't match anything", &code[0..3]);
                return MessageType::Invalid;
            }
        };
        match code[3] {
            CHUNK_FINAL => message_type,
            CHUNK_INTERMEDIATE | CHUNK_FINAL_ERROR if message_type == MessageType::Chunk => {
                message_type
            }
            _ => MessageType::Invalid,
        }
    }
}

/// HEL, sent by the client as soon as the socket is connected.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    pub message_header: MessageHeader,
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: UAString,
}

impl BinaryEncoder<HelloMessage> for HelloMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN + 20 + self.endpoint_url.byte_len()
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.message_header.encode(stream)?;
        for v in [
            self.protocol_version,
            self.receive_buffer_size,
            self.send_buffer_size,
            self.max_message_size,
            self.max_chunk_count,
        ] {
            size += write_u32(stream, v)?;
        }
        size += self.endpoint_url.encode(stream)?;
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        Ok(HelloMessage {
            message_header: MessageHeader::decode(stream, decoding_options)?,
            protocol_version: read_u32(stream)?,
            receive_buffer_size: read_u32(stream)?,
            send_buffer_size: read_u32(stream)?,
            max_message_size: read_u32(stream)?,
            max_chunk_count: read_u32(stream)?,
            endpoint_url: UAString::decode(stream, decoding_options)?,
        })
    }
}

impl HelloMessage {
    pub fn new(
        endpoint_url: &str,
        send_buffer_size: usize,
        receive_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> HelloMessage {
        let mut msg = HelloMessage {
            message_header: MessageHeader::new(MessageType::Hello),
            protocol_version: 0,
            receive_buffer_size: receive_buffer_size as u32,
            send_buffer_size: send_buffer_size as u32,
            max_message_size: max_message_size as u32,
            max_chunk_count: max_chunk_count as u32,
            endpoint_url: UAString::from(endpoint_url),
        };
        msg.message_header.message_size = msg.byte_len() as u32;
        msg
    }

    pub fn is_endpoint_url_valid(&self) -> bool {
        match self.endpoint_url.value() {
            Some(url) => url.len() <= MAX_ENDPOINT_URL_LEN,
            None => {
                error!("Hello message contains no endpoint url");
                false
            }
        }
    }

    pub fn is_valid_buffer_sizes(&self) -> bool {
        self.receive_buffer_size as usize >= MIN_CHUNK_SIZE
            && self.send_buffer_size as usize >= MIN_CHUNK_SIZE
    }
}

/// ACK, the server's reply to HEL with its revised limits.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    pub message_header: MessageHeader,
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl BinaryEncoder<AcknowledgeMessage> for AcknowledgeMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN + 20
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.message_header.encode(stream)?;
        for v in [
            self.protocol_version,
            self.receive_buffer_size,
            self.send_buffer_size,
            self.max_message_size,
            self.max_chunk_count,
        ] {
            size += write_u32(stream, v)?;
        }
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        Ok(AcknowledgeMessage {
            message_header: MessageHeader::decode(stream, decoding_options)?,
            protocol_version: read_u32(stream)?,
            receive_buffer_size: read_u32(stream)?,
            send_buffer_size: read_u32(stream)?,
            max_message_size: read_u32(stream)?,
            max_chunk_count: read_u32(stream)?,
        })
    }
}

impl AcknowledgeMessage {
    /// Builds the reply to `hello`, accepting the smaller of each pair of buffer sizes.
    pub fn from_hello(
        hello: &HelloMessage,
        receive_buffer_size: u32,
        send_buffer_size: u32,
    ) -> AcknowledgeMessage {
        let mut ack = AcknowledgeMessage {
            message_header: MessageHeader::new(MessageType::Acknowledge),
            protocol_version: 0,
            receive_buffer_size: receive_buffer_size.min(hello.send_buffer_size),
            send_buffer_size: send_buffer_size.min(hello.receive_buffer_size),
            max_message_size: hello.max_message_size,
            max_chunk_count: hello.max_chunk_count,
        };
        ack.message_header.message_size = ack.byte_len() as u32;
        ack
    }
}

/// ERR, sent before a side closes the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub message_header: MessageHeader,
    pub error: u32,
    pub reason: UAString,
}

impl BinaryEncoder<ErrorMessage> for ErrorMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN + 4 + self.reason.byte_len()
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = self.message_header.encode(stream)?;
        size += write_u32(stream, self.error)?;
        size += self.reason.encode(stream)?;
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        Ok(ErrorMessage {
            message_header: MessageHeader::decode(stream, decoding_options)?,
            error: read_u32(stream)?,
            reason: UAString::decode(stream, decoding_options)?,
        })
    }
}

impl ErrorMessage {
    pub fn from_status_code(status_code: StatusCode) -> ErrorMessage {
        let mut error = ErrorMessage {
            message_header: MessageHeader::new(MessageType::Error),
            error: status_code.bits(),
            reason: UAString::from(status_code.description()),
        };
        error.message_header.message_size = error.byte_len() as u32;
        error
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_bits(self.error)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn hello_layout() {
        let hello = HelloMessage::new("opc.tcp://192.168.100.1:4840", 65535, 65535, 0, 0);
        let bytes = hello.encode_to_vec();
        assert_eq!(&bytes[0..4], b"HELF");
        assert_eq!(bytes.len(), hello.message_header.message_size as usize);
        let decoded =
            HelloMessage::decode(&mut Cursor::new(bytes), &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, hello);
        assert!(decoded.is_valid_buffer_sizes());
        assert!(decoded.is_endpoint_url_valid());
    }

    #[test]
    fn message_types() {
        assert_eq!(MessageHeader::message_type(b"MSGC"), MessageType::Chunk);
        assert_eq!(MessageHeader::message_type(b"OPNA"), MessageType::Chunk);
        assert_eq!(MessageHeader::message_type(b"ACKF"), MessageType::Acknowledge);
        assert_eq!(MessageHeader::message_type(b"ACKC"), MessageType::Invalid);
        assert_eq!(MessageHeader::message_type(b"XYZF"), MessageType::Invalid);
    }

    #[test]
    fn error_message_status() {
        let err = ErrorMessage::from_status_code(StatusCode::BadTcpMessageTooLarge);
        let bytes = err.encode_to_vec();
        let decoded =
            ErrorMessage::decode(&mut Cursor::new(bytes), &DecodingOptions::default()).unwrap();
        assert_eq!(decoded.status_code(), StatusCode::BadTcpMessageTooLarge);
    }
}
