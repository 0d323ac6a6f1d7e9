// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DataValue`.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::types::{
    date_time::DateTime, encoding::*, status_code::StatusCode, variant::Variant,
};

bitflags! {
    struct DataValueFlags: u8 {
        const HAS_VALUE = 0x1;
        /// Omitted when the status is Good
        const HAS_STATUS = 0x2;
        const HAS_SOURCE_TIMESTAMP = 0x4;
        const HAS_SERVER_TIMESTAMP = 0x8;
        const HAS_SOURCE_PICOSECONDS = 0x10;
        const HAS_SERVER_PICOSECONDS = 0x20;
    }
}

/// The value of an attribute together with its status and timestamps. Every field is optional
/// on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: Option<StatusCode>,
    pub source_timestamp: Option<DateTime>,
    /// 10 picosecond intervals added to the source timestamp
    pub source_picoseconds: Option<u16>,
    pub server_timestamp: Option<DateTime>,
    pub server_picoseconds: Option<u16>,
}

impl BinaryEncoder<DataValue> for DataValue {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        if let Some(value) = &self.value {
            size += value.byte_len();
        }
        if self.status.is_some() {
            size += 4;
        }
        if self.source_timestamp.is_some() {
            size += 8;
            if self.source_picoseconds.is_some() {
                size += 2;
            }
        }
        if self.server_timestamp.is_some() {
            size += 8;
            if self.server_picoseconds.is_some() {
                size += 2;
            }
        }
        size
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut size = write_u8(stream, self.encoding_mask().bits())?;
        if let Some(value) = &self.value {
            size += value.encode(stream)?;
        }
        if let Some(status) = &self.status {
            size += status.encode(stream)?;
        }
        if let Some(source_timestamp) = &self.source_timestamp {
            size += source_timestamp.encode(stream)?;
            if let Some(source_picoseconds) = self.source_picoseconds {
                size += write_u16(stream, source_picoseconds)?;
            }
        }
        if let Some(server_timestamp) = &self.server_timestamp {
            size += server_timestamp.encode(stream)?;
            if let Some(server_picoseconds) = self.server_picoseconds {
                size += write_u16(stream, server_picoseconds)?;
            }
        }
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let encoding_mask = DataValueFlags::from_bits_truncate(read_u8(stream)?);
        let value = if encoding_mask.contains(DataValueFlags::HAS_VALUE) {
            Some(Variant::decode(stream, decoding_options)?)
        } else {
            None
        };
        let status = if encoding_mask.contains(DataValueFlags::HAS_STATUS) {
            Some(StatusCode::decode(stream, decoding_options)?)
        } else {
            None
        };
        let mut source_timestamp = None;
        let mut source_picoseconds = None;
        if encoding_mask.contains(DataValueFlags::HAS_SOURCE_TIMESTAMP) {
            source_timestamp = Some(DateTime::decode(stream, decoding_options)?);
            if encoding_mask.contains(DataValueFlags::HAS_SOURCE_PICOSECONDS) {
                source_picoseconds = Some(read_u16(stream)?);
            }
        }
        let mut server_timestamp = None;
        let mut server_picoseconds = None;
        if encoding_mask.contains(DataValueFlags::HAS_SERVER_TIMESTAMP) {
            server_timestamp = Some(DateTime::decode(stream, decoding_options)?);
            if encoding_mask.contains(DataValueFlags::HAS_SERVER_PICOSECONDS) {
                server_picoseconds = Some(read_u16(stream)?);
            }
        }
        Ok(DataValue {
            value,
            status,
            source_timestamp,
            source_picoseconds,
            server_timestamp,
            server_picoseconds,
        })
    }
}

impl DataValue {
    /// A value with no status (i.e. Good) and no timestamps.
    pub fn value_only<V>(value: V) -> DataValue
    where
        V: Into<Variant>,
    {
        DataValue {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A value stamped with the current time as both source and server timestamps.
    pub fn new_now<V>(value: V) -> DataValue
    where
        V: Into<Variant>,
    {
        let now = DateTime::now();
        DataValue {
            value: Some(value.into()),
            status: Some(StatusCode::Good),
            source_timestamp: Some(now),
            server_timestamp: Some(now),
            ..Default::default()
        }
    }

    /// A data value that carries only a (bad) status.
    pub fn from_status(status: StatusCode) -> DataValue {
        DataValue {
            status: Some(status),
            ..Default::default()
        }
    }

    /// The status of the value. A missing status means Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::Good)
    }

    pub fn is_valid(&self) -> bool {
        self.status().is_good()
    }

    fn encoding_mask(&self) -> DataValueFlags {
        let mut encoding_mask = DataValueFlags::empty();
        encoding_mask.set(DataValueFlags::HAS_VALUE, self.value.is_some());
        encoding_mask.set(DataValueFlags::HAS_STATUS, self.status.is_some());
        if self.source_timestamp.is_some() {
            encoding_mask |= DataValueFlags::HAS_SOURCE_TIMESTAMP;
            encoding_mask.set(
                DataValueFlags::HAS_SOURCE_PICOSECONDS,
                self.source_picoseconds.is_some(),
            );
        }
        if self.server_timestamp.is_some() {
            encoding_mask |= DataValueFlags::HAS_SERVER_TIMESTAMP;
            encoding_mask.set(
                DataValueFlags::HAS_SERVER_PICOSECONDS,
                self.server_picoseconds.is_some(),
            );
        }
        encoding_mask
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn missing_status_is_good() {
        let dv = DataValue::value_only(0i32);
        assert_eq!(dv.encode_to_vec(), vec![0x1, 6, 0, 0, 0, 0]);
        assert!(dv.is_valid());
        assert!(!DataValue::from_status(StatusCode::BadNodeIdUnknown).is_valid());
    }

    #[test]
    fn timestamps_and_picoseconds() {
        let mut dv = DataValue::new_now(1.5f64);
        dv.source_picoseconds = Some(10);
        let bytes = dv.encode_to_vec();
        assert_eq!(bytes[0], 0x1 | 0x2 | 0x4 | 0x8 | 0x10);
        assert_eq!(bytes.len(), dv.byte_len());
        let decoded = DataValue::decode(&mut Cursor::new(bytes), &DecodingOptions::default()).unwrap();
        assert_eq!(decoded.source_picoseconds, Some(10));
        assert_eq!(decoded.value, Some(Variant::Double(1.5)));
    }
}
