// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Default decoding limits.

/// Default maximum number of elements in an array
pub const MAX_ARRAY_LENGTH: usize = 100_000;
/// Default maximum size of a string in bytes
pub const MAX_STRING_LENGTH: usize = 65_535;
/// Default maximum size of a byte string in bytes
pub const MAX_BYTE_STRING_LENGTH: usize = 65_535;
/// Default maximum size of a certificate to send
pub const MAX_CERTIFICATE_LENGTH: usize = 32_767;
/// Default maximum size of a message in bytes. 0 is any length, i.e. the other end can send a message of any size
pub const MAX_MESSAGE_SIZE: usize = 65_535 * MAX_CHUNK_COUNT;
/// Default maximum number of chunks in a message. 0 is any number
pub const MAX_CHUNK_COUNT: usize = 5;
/// Default maximum decoding depth for recursive data structures
pub const MAX_DECODING_DEPTH: usize = 10;
