// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains code for turning messages into chunks and chunks into messages.

use std::io::Cursor;

use crate::{
    core::{
        comms::{
            message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType},
            secure_channel::SecureChannel,
            security_policy::SecurityPolicy,
        },
        supported_message::SupportedMessage,
    },
    types::{
        encoding::BinaryEncoder, node_id::NodeId, node_ids::ObjectId, status_code::StatusCode,
    },
};

/// The Chunker is responsible for turning messages to chunks and chunks into messages.
pub struct Chunker;

impl Chunker {
    fn message_type(message: &SupportedMessage) -> MessageChunkType {
        match message {
            SupportedMessage::OpenSecureChannelRequest(_)
            | SupportedMessage::OpenSecureChannelResponse(_) => MessageChunkType::OpenSecureChannel,
            SupportedMessage::CloseSecureChannelRequest(_)
            | SupportedMessage::CloseSecureChannelResponse(_) => {
                MessageChunkType::CloseSecureChannel
            }
            _ => MessageChunkType::Message,
        }
    }

    /// Ensure all of the supplied chunks have a valid secure channel id, consecutive sequence
    /// numbers no lower than `starting_sequence_number` and the same request id.
    ///
    /// Returns the last sequence number in the series.
    pub fn validate_chunks(
        starting_sequence_number: u32,
        secure_channel: &SecureChannel,
        chunks: &[MessageChunk],
    ) -> Result<u32, StatusCode> {
        let decoding_options = secure_channel.decoding_options();
        let first = chunks.first().ok_or_else(|| {
            error!("No chunks to validate");
            StatusCode::BadUnexpectedError
        })?;
        let first_info = first.chunk_info(&decoding_options)?;
        let first_sequence_number = first_info.sequence_header.sequence_number;
        let expected_request_id = first_info.sequence_header.request_id;

        if first_sequence_number < starting_sequence_number {
            error!(
                "First sequence number of {} is less than last value {}",
                first_sequence_number, starting_sequence_number
            );
            return Err(StatusCode::BadSequenceNumberInvalid);
        }

        let secure_channel_id = secure_channel.secure_channel_id();
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(&decoding_options)?;

            if secure_channel_id != 0
                && chunk_info.message_header.secure_channel_id != secure_channel_id
            {
                error!(
                    "Secure channel id {} does not match expected id {}",
                    chunk_info.message_header.secure_channel_id, secure_channel_id
                );
                return Err(StatusCode::BadSecureChannelIdInvalid);
            }

            let sequence_number = chunk_info.sequence_header.sequence_number;
            let expected_sequence_number = first_sequence_number.wrapping_add(i as u32);
            if sequence_number != expected_sequence_number {
                error!(
                    "Chunk sequence number of {} is not the expected value of {}, idx {}",
                    sequence_number, expected_sequence_number, i
                );
                return Err(StatusCode::BadSequenceNumberInvalid);
            }

            if chunk_info.sequence_header.request_id != expected_request_id {
                error!(
                    "Chunk {} has request id {} but expected {}",
                    i, chunk_info.sequence_header.request_id, expected_request_id
                );
                return Err(StatusCode::BadSequenceNumberInvalid);
            }
        }
        Ok(first_sequence_number.wrapping_add(chunks.len() as u32 - 1))
    }

    /// Encodes a message using the supplied sequence number and secure channel info and emits the
    /// corresponding chunks.
    ///
    /// `max_message_size` is the largest message in bytes the peer accepts, `max_chunk_size`
    /// the largest chunk. Zero means no limit for either.
    pub fn encode(
        sequence_number: u32,
        request_id: u32,
        max_message_size: usize,
        max_chunk_size: usize,
        secure_channel: &SecureChannel,
        supported_message: &SupportedMessage,
    ) -> Result<Vec<MessageChunk>, StatusCode> {
        if secure_channel.security_policy() == SecurityPolicy::Unknown {
            error!("Security policy of the channel is unknown");
            return Err(StatusCode::BadSecurityPolicyRejected);
        }

        let node_id = supported_message.node_id();
        let message_size = supported_message.byte_len() + node_id.byte_len();
        if max_message_size > 0 && message_size > max_message_size {
            error!(
                "Max message size is {} and message {} exceeds that",
                max_message_size, message_size
            );
            return Err(if secure_channel.is_client_role() {
                StatusCode::BadRequestTooLarge
            } else {
                StatusCode::BadResponseTooLarge
            });
        }

        let message_type = Chunker::message_type(supported_message);
        let security_header = secure_channel.make_security_header(message_type);
        let secure_channel_id = secure_channel.secure_channel_id();

        let mut stream = Cursor::new(Vec::with_capacity(message_size));
        trace!("Encoding node id {:?}", node_id);
        node_id.encode(&mut stream)?;
        supported_message.encode(&mut stream)?;
        let data = stream.into_inner();

        let max_body_per_chunk = if max_chunk_size > 0 {
            MessageChunk::body_size_from_message_size(&security_header, max_chunk_size)?
        } else {
            data.len().max(1)
        };

        let data_chunks = data.chunks(max_body_per_chunk);
        let last = data_chunks.len() - 1;
        data_chunks
            .enumerate()
            .map(|(i, body)| {
                let is_final = if i == last {
                    MessageIsFinalType::Final
                } else {
                    MessageIsFinalType::Intermediate
                };
                MessageChunk::new(
                    sequence_number.wrapping_add(i as u32),
                    request_id,
                    message_type,
                    is_final,
                    secure_channel_id,
                    &security_header,
                    body,
                )
            })
            .collect()
    }

    /// Decodes a series of chunks to create a message. If `expected_node_id` is supplied the
    /// message must be of that type.
    pub fn decode(
        chunks: &[MessageChunk],
        secure_channel: &SecureChannel,
        expected_node_id: Option<NodeId>,
    ) -> Result<SupportedMessage, StatusCode> {
        let decoding_options = secure_channel.decoding_options();

        let mut infos = Vec::with_capacity(chunks.len());
        let mut data_size = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(&decoding_options)?;
            let expected_is_final = if i == chunks.len() - 1 {
                MessageIsFinalType::Final
            } else {
                MessageIsFinalType::Intermediate
            };
            if chunk_info.message_header.is_final != expected_is_final {
                error!(
                    "Chunk {} is {:?}, expected {:?}",
                    i, chunk_info.message_header.is_final, expected_is_final
                );
                return Err(StatusCode::BadDecodingError);
            }
            data_size += chunk_info.body_length;
            infos.push(chunk_info);
        }

        if decoding_options.max_message_size > 0 && data_size > decoding_options.max_message_size
        {
            error!(
                "Message of {} bytes exceeds the limit of {}",
                data_size, decoding_options.max_message_size
            );
            return Err(StatusCode::BadTcpMessageTooLarge);
        }

        let mut data = Vec::with_capacity(data_size);
        for (chunk, chunk_info) in chunks.iter().zip(infos.iter()) {
            data.extend_from_slice(chunk_info.body(chunk));
        }
        let mut stream = Cursor::new(data);

        // The body is prefixed with the node id of the message's binary encoding
        let node_id = NodeId::decode(&mut stream, &decoding_options)?;
        let object_id = Self::object_id_from_node_id(node_id, expected_node_id)?;

        match SupportedMessage::decode_by_object_id(&mut stream, object_id, &decoding_options) {
            Ok(SupportedMessage::Invalid(_)) => {
                debug!("Message {:?} is unsupported", object_id);
                Err(StatusCode::BadServiceUnsupported)
            }
            Ok(message) => Ok(message),
            Err(err) => {
                debug!("Cannot decode message {:?}, err = {:?}", object_id, err);
                Err(StatusCode::BadDecodingError)
            }
        }
    }

    fn object_id_from_node_id(
        node_id: NodeId,
        expected_node_id: Option<NodeId>,
    ) -> Result<ObjectId, StatusCode> {
        if node_id.namespace != 0 || !node_id.is_numeric() {
            error!(
                "Expecting chunk to contain an OPC UA request or response, got {}",
                node_id
            );
            return Err(StatusCode::BadUnexpectedError);
        }
        if let Some(expected_node_id) = expected_node_id {
            if expected_node_id != node_id {
                error!(
                    "Chunk node id {} does not match expected {}",
                    node_id, expected_node_id
                );
                return Err(StatusCode::BadUnexpectedError);
            }
        }
        node_id.as_object_id().map_err(|_| {
            error!("The node {} was not an object id", node_id);
            StatusCode::BadUnexpectedError
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        core::comms::secure_channel::Role,
        types::{
            ChannelSecurityToken, DataValue, DateTime, DecodingOptions, ReadResponse,
            RequestHeader, ResponseHeader, SecurityTokenRequestType, UAString, Variant,
        },
        types::{MessageSecurityMode, OpenSecureChannelRequest},
    };

    use super::*;

    fn channel(role: Role) -> SecureChannel {
        let mut channel = SecureChannel::new(role, DecodingOptions::default());
        channel.set_security_token(ChannelSecurityToken {
            channel_id: 5,
            token_id: 2,
            created_at: DateTime::now(),
            revised_lifetime: 60_000,
        });
        channel
    }

    fn big_read_response(values: usize) -> SupportedMessage {
        let results = (0..values)
            .map(|i| DataValue::value_only(Variant::from(UAString::from(format!("value {}", i)))))
            .collect();
        ReadResponse {
            response_header: ResponseHeader::new_good(&RequestHeader::dummy()),
            results: Some(results),
            diagnostic_infos: None,
        }
        .into()
    }

    #[test]
    fn open_secure_channel_single_chunk() {
        let channel = channel(Role::Client);
        let request: SupportedMessage = OpenSecureChannelRequest {
            request_header: RequestHeader::dummy(),
            client_protocol_version: 0,
            request_type: SecurityTokenRequestType::Issue,
            security_mode: MessageSecurityMode::None,
            client_nonce: Default::default(),
            requested_lifetime: 60_000,
        }
        .into();
        let chunks = Chunker::encode(1, 1, 0, 0, &channel, &request).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_open_secure_channel(&channel.decoding_options()));

        let decoded = Chunker::decode(&chunks, &channel, None).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn large_message_is_split_and_reassembled() {
        let channel = channel(Role::Server);
        let response = big_read_response(2000);
        let chunks = Chunker::encode(10, 3, 0, 8192, &channel, &response).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.data.len() <= 8192);
        }
        assert_eq!(
            Chunker::validate_chunks(10, &channel, &chunks).unwrap(),
            10 + chunks.len() as u32 - 1
        );
        let decoded = Chunker::decode(
            &chunks,
            &channel,
            Some(ObjectId::ReadResponse_Encoding_DefaultBinary.into()),
        )
        .unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn message_too_large_depends_on_role() {
        let response = big_read_response(100);
        assert_eq!(
            Chunker::encode(1, 1, 64, 0, &channel(Role::Client), &response),
            Err(StatusCode::BadRequestTooLarge)
        );
        assert_eq!(
            Chunker::encode(1, 1, 64, 0, &channel(Role::Server), &response),
            Err(StatusCode::BadResponseTooLarge)
        );
    }

    #[test]
    fn validate_rejects_bad_sequence() {
        let channel = channel(Role::Client);
        let response = big_read_response(2000);
        let mut chunks = Chunker::encode(10, 3, 0, 8192, &channel, &response).unwrap();
        assert_eq!(
            Chunker::validate_chunks(11, &channel, &chunks),
            Err(StatusCode::BadSequenceNumberInvalid)
        );
        chunks.swap(0, 1);
        assert_eq!(
            Chunker::validate_chunks(0, &channel, &chunks),
            Err(StatusCode::BadSequenceNumberInvalid)
        );
    }

    #[test]
    fn validate_rejects_other_channel() {
        let response = big_read_response(1);
        let chunks = Chunker::encode(1, 1, 0, 0, &channel(Role::Server), &response).unwrap();
        let mut other = SecureChannel::new(Role::Client, DecodingOptions::default());
        other.set_security_token(ChannelSecurityToken {
            channel_id: 99,
            token_id: 1,
            created_at: DateTime::now(),
            revised_lifetime: 1000,
        });
        assert_eq!(
            Chunker::validate_chunks(0, &other, &chunks),
            Err(StatusCode::BadSecureChannelIdInvalid)
        );
    }

    #[test]
    fn unexpected_message_type() {
        let channel = channel(Role::Client);
        let chunks = Chunker::encode(1, 1, 0, 0, &channel, &big_read_response(1)).unwrap();
        assert_eq!(
            Chunker::decode(
                &chunks,
                &channel,
                Some(ObjectId::CreateSessionResponse_Encoding_DefaultBinary.into())
            ),
            Err(StatusCode::BadUnexpectedError)
        );
    }
}
