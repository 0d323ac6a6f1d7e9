// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The `BinaryEncoder` trait, decoding limits and the little-endian primitives every OPC UA
//! binary type is built from.

use std::{
    fmt::Debug,
    io::{Cursor, Read, Write},
    sync::Arc,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    sync::Mutex,
    types::{constants, status_code::StatusCode},
};

pub type EncodingResult<T> = std::result::Result<T, StatusCode>;

/// Holds a reference on the depth gauge for as long as a recursive decode is in progress. Dropping
/// the lock gives the level back, even when the decode bails out early with an error.
#[derive(Debug)]
pub struct DepthLock {
    depth_gauge: Arc<Mutex<DepthGauge>>,
}

impl Drop for DepthLock {
    fn drop(&mut self) {
        let mut dg = trace_lock!(self.depth_gauge);
        dg.current_depth = dg.current_depth.saturating_sub(1);
    }
}

impl DepthLock {
    pub fn obtain(depth_gauge: Arc<Mutex<DepthGauge>>) -> EncodingResult<DepthLock> {
        {
            let mut dg = trace_lock!(depth_gauge);
            if dg.current_depth >= dg.max_depth {
                warn!("Decoding in stream aborted due maximum recursion depth being reached");
                return Err(StatusCode::BadDecodingError);
            }
            dg.current_depth += 1;
        }
        Ok(Self { depth_gauge })
    }
}

/// Limits how deep the decoder follows recursive structures such as `DiagnosticInfo`.
#[derive(Debug)]
pub struct DepthGauge {
    pub(crate) max_depth: usize,
    pub(crate) current_depth: usize,
}

impl Default for DepthGauge {
    fn default() -> Self {
        Self {
            max_depth: constants::MAX_DECODING_DEPTH,
            current_depth: 0,
        }
    }
}

impl DepthGauge {
    pub fn current_depth(&self) -> usize {
        self.current_depth
    }
}

#[derive(Clone, Debug)]
pub struct DecodingOptions {
    /// Time offset between the client and the server.
    pub client_offset: chrono::Duration,
    /// Maximum size of a message in bytes. 0 means no limit.
    pub max_message_size: usize,
    /// Maximum number of chunks. 0 means no limit.
    pub max_chunk_count: usize,
    /// Maximum length in bytes (not chars!) of a string. 0 actually means 0, i.e. no string permitted
    pub max_string_length: usize,
    /// Maximum length in bytes of a byte string. 0 actually means 0, i.e. no byte string permitted
    pub max_byte_string_length: usize,
    /// Maximum number of array elements. 0 actually means 0, i.e. no array permitted
    pub max_array_length: usize,
    pub decoding_depth_gauge: Arc<Mutex<DepthGauge>>,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        DecodingOptions {
            client_offset: chrono::Duration::zero(),
            max_message_size: constants::MAX_MESSAGE_SIZE,
            max_chunk_count: constants::MAX_CHUNK_COUNT,
            max_string_length: constants::MAX_STRING_LENGTH,
            max_byte_string_length: constants::MAX_BYTE_STRING_LENGTH,
            max_array_length: constants::MAX_ARRAY_LENGTH,
            decoding_depth_gauge: Arc::new(Mutex::new(DepthGauge::default())),
        }
    }
}

impl DecodingOptions {
    pub fn depth_lock(&self) -> EncodingResult<DepthLock> {
        DepthLock::obtain(self.decoding_depth_gauge.clone())
    }
}

/// OPC UA Binary Encoding interface. Anything that goes over the wire implements this.
pub trait BinaryEncoder<T> {
    /// Returns the exact byte length of the structure as it would be if `encode` were called.
    fn byte_len(&self) -> usize;
    /// Encodes the instance to the write stream.
    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize>;
    /// Decodes an instance from the read stream, honouring the limits in `decoding_options`.
    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<T>;

    /// Encodes straight into a new vector. Prefer reusing buffers outside of tests and
    /// one-off messages.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::with_capacity(self.byte_len()));
        let _ = self.encode(&mut buffer);
        buffer.into_inner()
    }
}

pub fn process_encode_io_result(result: std::io::Result<usize>) -> EncodingResult<usize> {
    result.map_err(|err| {
        trace!("Encoding error - {:?}", err);
        StatusCode::BadEncodingError
    })
}

pub fn process_decode_io_result<T>(result: std::io::Result<T>) -> EncodingResult<T>
where
    T: Debug,
{
    result.map_err(|err| {
        trace!("Decoding error - {:?}", err);
        StatusCode::BadDecodingError
    })
}

/// Byte length of an array including its Int32 length prefix.
pub fn byte_len_array<T: BinaryEncoder<T>>(values: &Option<Vec<T>>) -> usize {
    4 + values
        .as_ref()
        .map(|v| v.iter().map(|v| v.byte_len()).sum::<usize>())
        .unwrap_or(0)
}

/// Writes an array, writing -1 for a null array so it stays distinct from an empty one.
pub fn write_array<S: Write, T: BinaryEncoder<T>>(
    stream: &mut S,
    values: &Option<Vec<T>>,
) -> EncodingResult<usize> {
    match values {
        Some(values) => {
            let mut size = write_i32(stream, values.len() as i32)?;
            for value in values {
                size += value.encode(stream)?;
            }
            Ok(size)
        }
        None => write_i32(stream, -1),
    }
}

/// Reads an array, preserving the distinction between a null array and an empty one.
pub fn read_array<S: Read, T: BinaryEncoder<T>>(
    stream: &mut S,
    decoding_options: &DecodingOptions,
) -> EncodingResult<Option<Vec<T>>> {
    let len = read_i32(stream)?;
    if len == -1 {
        return Ok(None);
    }
    if len < -1 {
        error!("Array length is negative value and invalid");
        return Err(StatusCode::BadDecodingError);
    }
    if len as usize > decoding_options.max_array_length {
        error!(
            "Array length {} exceeds decoding limit {}",
            len, decoding_options.max_array_length
        );
        return Err(StatusCode::BadDecodingError);
    }
    let mut values = Vec::with_capacity(len as usize);
    for _ in 0..len {
        values.push(T::decode(stream, decoding_options)?);
    }
    Ok(Some(values))
}

/// Arrays in structures are `Option<Vec<T>>` so a null array survives a round trip.
impl<T> BinaryEncoder<Option<Vec<T>>> for Option<Vec<T>>
where
    T: BinaryEncoder<T>,
{
    fn byte_len(&self) -> usize {
        byte_len_array(self)
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_array(stream, self)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        read_array(stream, decoding_options)
    }
}

/// Writes raw bytes, failing if the stream does not take all of them.
pub fn write_raw(stream: &mut dyn Write, buf: &[u8]) -> EncodingResult<usize> {
    process_encode_io_result(stream.write_all(buf).map(|_| buf.len()))
}

/// Reads exactly `buf.len()` bytes.
pub fn read_bytes(stream: &mut dyn Read, buf: &mut [u8]) -> EncodingResult<usize> {
    process_decode_io_result(stream.read_exact(buf))?;
    Ok(buf.len())
}

pub fn write_u8<T>(stream: &mut dyn Write, value: T) -> EncodingResult<usize>
where
    T: Into<u8>,
{
    process_encode_io_result(stream.write_u8(value.into()).map(|_| 1))
}

pub fn read_u8(stream: &mut dyn Read) -> EncodingResult<u8> {
    process_decode_io_result(stream.read_u8())
}

macro_rules! primitive_io {
    ( $( $write_fn:ident, $read_fn:ident, $t:ty, $size:expr );* ) => {
        $(
            pub fn $write_fn<T>(stream: &mut dyn Write, value: T) -> EncodingResult<usize>
            where
                T: Into<$t>,
            {
                process_encode_io_result(stream.$write_fn::<LittleEndian>(value.into()).map(|_| $size))
            }

            pub fn $read_fn(stream: &mut dyn Read) -> EncodingResult<$t> {
                process_decode_io_result(stream.$read_fn::<LittleEndian>())
            }
        )*
    };
}

primitive_io! {
    write_i16, read_i16, i16, 2;
    write_u16, read_u16, u16, 2;
    write_i32, read_i32, i32, 4;
    write_u32, read_u32, u32, 4;
    write_i64, read_i64, i64, 8;
    write_u64, read_u64, u64, 8;
    write_f32, read_f32, f32, 4;
    write_f64, read_f64, f64, 8
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn little_endian_primitives() {
        let mut stream = Cursor::new(Vec::new());
        write_u32(&mut stream, 0x0403_0201u32).unwrap();
        write_i16(&mut stream, -2i16).unwrap();
        assert_eq!(stream.get_ref(), &vec![1, 2, 3, 4, 0xfe, 0xff]);

        let mut stream = Cursor::new(stream.into_inner());
        assert_eq!(read_u32(&mut stream).unwrap(), 0x0403_0201);
        assert_eq!(read_i16(&mut stream).unwrap(), -2);
        assert_eq!(read_u8(&mut stream), Err(StatusCode::BadDecodingError));
    }

    #[test]
    fn null_and_empty_arrays_differ() {
        let null: Option<Vec<u32>> = None;
        let empty: Option<Vec<u32>> = Some(Vec::new());
        assert_eq!(write_array(&mut Cursor::new(Vec::new()), &null).unwrap(), 4);

        let mut stream = Cursor::new(Vec::new());
        write_array(&mut stream, &null).unwrap();
        write_array(&mut stream, &empty).unwrap();
        let mut stream = Cursor::new(stream.into_inner());
        let options = DecodingOptions::default();
        assert_eq!(read_array::<_, u32>(&mut stream, &options).unwrap(), None);
        assert_eq!(
            read_array::<_, u32>(&mut stream, &options).unwrap(),
            Some(Vec::new())
        );
    }

    #[test]
    fn array_limit_enforced() {
        let values = Some(vec![1u32, 2, 3]);
        let mut stream = Cursor::new(Vec::new());
        write_array(&mut stream, &values).unwrap();
        let options = DecodingOptions {
            max_array_length: 2,
            ..Default::default()
        };
        let mut stream = Cursor::new(stream.into_inner());
        assert_eq!(
            read_array::<_, u32>(&mut stream, &options),
            Err(StatusCode::BadDecodingError)
        );
    }

    #[test]
    fn depth_lock_releases_on_drop() {
        let options = DecodingOptions::default();
        {
            let _a = options.depth_lock().unwrap();
            let _b = options.depth_lock().unwrap();
            assert_eq!(trace_lock!(options.decoding_depth_gauge).current_depth(), 2);
        }
        assert_eq!(trace_lock!(options.decoding_depth_gauge).current_depth(), 0);
    }
}
