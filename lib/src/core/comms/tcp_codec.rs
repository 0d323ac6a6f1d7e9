// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The codec is an implementation of a tokio Encoder/Decoder which can be used to read
//! data from the socket in terms of frames which in our case are any of the following:
//!
//! * HEL - Hello message
//! * ACK - Acknowledge message
//! * ERR - Error message
//! * MSG - Message chunk
//! * OPN - Open Secure Channel message
//! * CLO - Close Secure Channel message

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::types::{
    encoding::{BinaryEncoder, DecodingOptions},
    status_code::StatusCode,
};

use super::{
    message_chunk::MessageChunk,
    tcp_types::{
        AcknowledgeMessage, ErrorMessage, HelloMessage, MessageHeader, MessageType,
        MESSAGE_HEADER_LEN,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloMessage),
    Acknowledge(AcknowledgeMessage),
    Error(ErrorMessage),
    Chunk(MessageChunk),
}

/// Turns the bytes of a socket into whole frames. A frame is only taken off the buffer once all
/// of it has arrived.
pub struct TcpCodec {
    decoding_options: DecodingOptions,
}

impl Decoder for TcpCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Every frame starts with 8 bytes of header saying what follows and how big it is
        if buf.len() < MESSAGE_HEADER_LEN {
            return Ok(None);
        }
        let message_header = {
            let mut header = io::Cursor::new(&buf[0..MESSAGE_HEADER_LEN]);
            MessageHeader::decode(&mut header, &self.decoding_options)?
        };

        let message_size = message_header.message_size as usize;
        if message_size < MESSAGE_HEADER_LEN {
            error!("Message size {} is smaller than its header", message_size);
            return Err(StatusCode::BadTcpMessageTypeInvalid.into());
        }
        let max_message_size = self.decoding_options.max_message_size;
        if max_message_size > 0 && message_size > max_message_size {
            error!(
                "Message size {} exceeds the limit {}",
                message_size, max_message_size
            );
            return Err(StatusCode::BadTcpMessageTooLarge.into());
        }

        if buf.len() < message_size {
            buf.reserve(message_size - buf.len());
            return Ok(None);
        }

        let frame = buf.split_to(message_size);
        Self::decode_message(message_header, &frame, &self.decoding_options)
            .map(Some)
            .map_err(|err| {
                error!("Codec got an error {} while decoding a message", err);
                io::Error::from(err)
            })
    }
}

impl Encoder<Message> for TcpCodec {
    type Error = io::Error;

    fn encode(&mut self, data: Message, buf: &mut BytesMut) -> Result<(), io::Error> {
        match data {
            Message::Hello(msg) => self.write(msg, buf),
            Message::Acknowledge(msg) => self.write(msg, buf),
            Message::Error(msg) => self.write(msg, buf),
            Message::Chunk(msg) => self.write(msg, buf),
        }
    }
}

impl TcpCodec {
    pub fn new(decoding_options: DecodingOptions) -> TcpCodec {
        TcpCodec { decoding_options }
    }

    fn write<T>(&self, msg: T, buf: &mut BytesMut) -> Result<(), io::Error>
    where
        T: BinaryEncoder<T> + std::fmt::Debug,
    {
        buf.reserve(msg.byte_len());
        msg.encode(&mut buf.writer()).map(|_| ()).map_err(|err| {
            error!("Error writing message {:?}, err = {}", msg, err);
            io::Error::from(err)
        })
    }

    fn decode_message(
        message_header: MessageHeader,
        frame: &[u8],
        decoding_options: &DecodingOptions,
    ) -> Result<Message, StatusCode> {
        let mut stream = io::Cursor::new(frame);
        match message_header.message_type {
            MessageType::Acknowledge => Ok(Message::Acknowledge(AcknowledgeMessage::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Hello => Ok(Message::Hello(HelloMessage::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Error => Ok(Message::Error(ErrorMessage::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Chunk => Ok(Message::Chunk(MessageChunk::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Invalid => {
                error!("Message type for chunk is invalid.");
                Err(StatusCode::BadTcpMessageTypeInvalid)
            }
        }
    }
}
