// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the definition of `LocalizedText`.

use std::{
    fmt,
    io::{Read, Write},
};

use serde::{Deserialize, Serialize};

use crate::types::{encoding::*, string::UAString};

const HAS_LOCALE: u8 = 0x1;
const HAS_TEXT: u8 = 0x2;

/// Human readable text with an optional locale identifier.
#[derive(PartialEq, Eq, Default, Debug, Clone, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: UAString,
    pub text: UAString,
}

impl<'a> From<&'a str> for LocalizedText {
    fn from(value: &'a str) -> Self {
        Self::new("", value)
    }
}

impl From<String> for LocalizedText {
    fn from(value: String) -> Self {
        Self::new("", &value)
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl BinaryEncoder<LocalizedText> for LocalizedText {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        if !self.locale.is_empty() {
            size += self.locale.byte_len();
        }
        if !self.text.is_empty() {
            size += self.text.byte_len();
        }
        size
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut encoding_mask = 0u8;
        if !self.locale.is_empty() {
            encoding_mask |= HAS_LOCALE;
        }
        if !self.text.is_empty() {
            encoding_mask |= HAS_TEXT;
        }
        let mut size = write_u8(stream, encoding_mask)?;
        if !self.locale.is_empty() {
            size += self.locale.encode(stream)?;
        }
        if !self.text.is_empty() {
            size += self.text.encode(stream)?;
        }
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let encoding_mask = read_u8(stream)?;
        let locale = if encoding_mask & HAS_LOCALE != 0 {
            UAString::decode(stream, decoding_options)?
        } else {
            UAString::null()
        };
        let text = if encoding_mask & HAS_TEXT != 0 {
            UAString::decode(stream, decoding_options)?
        } else {
            UAString::null()
        };
        Ok(LocalizedText { locale, text })
    }
}

impl LocalizedText {
    pub fn new(locale: &str, text: &str) -> LocalizedText {
        LocalizedText {
            locale: UAString::from(locale),
            text: UAString::from(text),
        }
    }

    pub fn null() -> LocalizedText {
        LocalizedText::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_parts_are_omitted() {
        assert_eq!(LocalizedText::null().encode_to_vec(), vec![0]);
        let text = LocalizedText::from("Running");
        let bytes = text.encode_to_vec();
        assert_eq!(bytes[0], HAS_TEXT);
        assert_eq!(bytes.len(), text.byte_len());
    }
}
