// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `Guid`.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::encoding::*;

/// A 16 byte value that can be used as a globally unique identifier.
#[derive(Eq, PartialEq, Clone, Hash, Serialize, Deserialize)]
pub struct Guid {
    uuid: Uuid,
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.uuid.hyphenated())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.uuid.hyphenated())
    }
}

impl BinaryEncoder<Guid> for Guid {
    fn byte_len(&self) -> usize {
        16
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        // Data1..Data3 are little endian, Data4 is the trailing 8 bytes as-is
        let (d1, d2, d3, d4) = self.uuid.as_fields();
        let mut size = write_u32(stream, d1)?;
        size += write_u16(stream, d2)?;
        size += write_u16(stream, d3)?;
        size += write_raw(stream, d4)?;
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let d1 = read_u32(stream)?;
        let d2 = read_u16(stream)?;
        let d3 = read_u16(stream)?;
        let mut d4 = [0u8; 8];
        read_bytes(stream, &mut d4)?;
        Ok(Guid {
            uuid: Uuid::from_fields(d1, d2, d3, &d4),
        })
    }
}

impl FromStr for Guid {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(|uuid| Guid { uuid }).map_err(|err| {
            error!("Guid cannot be parsed from string, err = {:?}", err);
        })
    }
}

impl Default for Guid {
    fn default() -> Self {
        Guid::null()
    }
}

impl Guid {
    pub fn null() -> Guid {
        Guid { uuid: Uuid::nil() }
    }

    pub fn new() -> Guid {
        Guid {
            uuid: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn mixed_endian_layout() {
        let guid = Guid::from_str("72962b91-fa75-4ae6-8d28-b404dc7daf63").unwrap();
        let bytes = guid.encode_to_vec();
        assert_eq!(
            bytes,
            vec![
                0x91, 0x2b, 0x96, 0x72, 0x75, 0xfa, 0xe6, 0x4a, 0x8d, 0x28, 0xb4, 0x04, 0xdc, 0x7d,
                0xaf, 0x63
            ]
        );
        let decoded =
            Guid::decode(&mut Cursor::new(bytes), &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, guid);
    }
}
