// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OPC UA `StatusCode`. A 32-bit value whose top two bits give the severity, the next 14
//! bits the code and the low 16 bits informational flags.
//!
//! Only the codes this crate produces or expects to see are named. Any other value decodes and
//! compares fine, it just displays as hex.

use std::{
    error::Error,
    fmt,
    io::{self, Read, Write},
};

use serde::{Deserialize, Serialize};

use crate::types::encoding::*;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

macro_rules! status_codes {
    [ $( $name:ident = $value:expr, $description:expr; )* ] => {
        #[allow(non_upper_case_globals)]
        impl StatusCode {
            $( pub const $name: StatusCode = StatusCode($value); )*

            /// Returns the name of the status code, or `None` if the code is not one the crate
            /// knows by name.
            fn lookup(code: u32) -> Option<(&'static str, &'static str)> {
                match code {
                    $( $value => Some((stringify!($name), $description)), )*
                    _ => None,
                }
            }
        }
    }
}

status_codes![
    Good = 0x0000_0000, "The operation succeeded.";
    UncertainNoCommunicationLastUsableValue = 0x408F_0000, "Communication to the data source has failed. The variable value is the last value that had a good quality.";
    UncertainLastUsableValue = 0x4090_0000, "Whatever was updating this value has stopped doing so.";
    BadUnexpectedError = 0x8001_0000, "An unexpected error occurred.";
    BadInternalError = 0x8002_0000, "An internal error occurred as a result of a programming or configuration error.";
    BadOutOfMemory = 0x8003_0000, "Not enough memory to complete the operation.";
    BadResourceUnavailable = 0x8004_0000, "An operating system resource is not available.";
    BadCommunicationError = 0x8005_0000, "A low level communication error occurred.";
    BadEncodingError = 0x8006_0000, "Encoding halted because of invalid data in the objects being serialized.";
    BadDecodingError = 0x8007_0000, "Decoding halted because of invalid data in the stream.";
    BadEncodingLimitsExceeded = 0x8008_0000, "The message encoding/decoding limits imposed by the stack have been exceeded.";
    BadUnknownResponse = 0x8009_0000, "An unrecognized response was received from the server.";
    BadTimeout = 0x800A_0000, "The operation timed out.";
    BadServiceUnsupported = 0x800B_0000, "The server does not support the requested service.";
    BadShutdown = 0x800C_0000, "The operation was cancelled because the application is shutting down.";
    BadServerNotConnected = 0x800D_0000, "The operation could not complete because the client is not connected to the server.";
    BadServerHalted = 0x800E_0000, "The server has stopped and cannot process any requests.";
    BadNothingToDo = 0x800F_0000, "There was nothing to do because the client passed a list of operations with no elements.";
    BadTooManyOperations = 0x8010_0000, "The request could not be processed because it specified too many operations.";
    BadDataTypeIdUnknown = 0x8011_0000, "The extension object cannot be (de)serialized because the data type id is not recognized.";
    BadCertificateInvalid = 0x8012_0000, "The certificate provided as a parameter is not valid.";
    BadSecurityChecksFailed = 0x8013_0000, "An error occurred verifying security.";
    BadUserAccessDenied = 0x801F_0000, "User does not have permission to perform the requested operation.";
    BadIdentityTokenInvalid = 0x8020_0000, "The user identity token is not valid.";
    BadIdentityTokenRejected = 0x8021_0000, "The user identity token is valid but the server has rejected it.";
    BadSecureChannelIdInvalid = 0x8022_0000, "The specified secure channel is no longer valid.";
    BadInvalidTimestamp = 0x8023_0000, "The timestamp is outside the range allowed by the server.";
    BadNonceInvalid = 0x8024_0000, "The nonce does appear to be not a random value or it is not the correct length.";
    BadSessionIdInvalid = 0x8025_0000, "The session id is not valid.";
    BadSessionClosed = 0x8026_0000, "The session was closed by the client.";
    BadSessionNotActivated = 0x8027_0000, "The session cannot be used because ActivateSession has not been called.";
    BadRequestHeaderInvalid = 0x802A_0000, "The header for the request is missing or invalid.";
    BadTimestampsToReturnInvalid = 0x802B_0000, "The timestamps to return parameter is invalid.";
    BadRequestCancelledByClient = 0x802C_0000, "The request was cancelled by the client.";
    BadNoCommunication = 0x8031_0000, "Communication with the data source is defined, but not established, and there is no last known value available.";
    BadWaitingForInitialData = 0x8032_0000, "Waiting for the server to obtain values from the underlying data source.";
    BadNodeIdInvalid = 0x8033_0000, "The syntax of the node id is not valid.";
    BadNodeIdUnknown = 0x8034_0000, "The node id refers to a node that does not exist in the server address space.";
    BadAttributeIdInvalid = 0x8035_0000, "The attribute is not supported for the specified Node.";
    BadIndexRangeInvalid = 0x8036_0000, "The syntax of the index range parameter is invalid.";
    BadNotReadable = 0x803A_0000, "The access level does not allow reading or subscribing to the Node.";
    BadNotSupported = 0x803D_0000, "The requested operation is not supported.";
    BadNotFound = 0x803E_0000, "A requested item was not found or a search operation ended without success.";
    BadServerUriInvalid = 0x804F_0000, "The ServerUri is not a valid URI.";
    BadSecurityModeRejected = 0x8054_0000, "The security mode does not meet the requirements set by the server.";
    BadSecurityPolicyRejected = 0x8055_0000, "The security policy does not meet the requirements set by the server.";
    BadTooManySessions = 0x8056_0000, "The server has reached its maximum number of sessions.";
    BadApplicationSignatureInvalid = 0x8058_0000, "The signature generated with the client certificate is missing or invalid.";
    BadMaxAgeInvalid = 0x8070_0000, "The max age parameter is invalid.";
    BadSequenceNumberUnknown = 0x807A_0000, "The sequence number is unknown to the server.";
    BadTcpServerTooBusy = 0x807D_0000, "The server cannot process the request because it is too busy.";
    BadTcpMessageTypeInvalid = 0x807E_0000, "The type of the message specified in the header invalid.";
    BadTcpSecureChannelUnknown = 0x807F_0000, "The SecureChannelId and/or TokenId are not currently in use.";
    BadTcpMessageTooLarge = 0x8080_0000, "The size of the message chunk specified in the header is too large.";
    BadTcpNotEnoughResources = 0x8081_0000, "There are not enough resources to process the request.";
    BadTcpInternalError = 0x8082_0000, "An internal error occurred.";
    BadTcpEndpointUrlInvalid = 0x8083_0000, "The server does not recognize the QueryString specified.";
    BadRequestInterrupted = 0x8084_0000, "The request could not be sent because of a network interruption.";
    BadRequestTimeout = 0x8085_0000, "Timeout occurred while processing the request.";
    BadSecureChannelClosed = 0x8086_0000, "The secure channel has been closed.";
    BadSecureChannelTokenUnknown = 0x8087_0000, "The token has expired or is not recognized.";
    BadSequenceNumberInvalid = 0x8088_0000, "The sequence number is not valid.";
    BadConfigurationError = 0x8089_0000, "There is a problem with the configuration that affects the usefulness of the value.";
    BadNotConnected = 0x808A_0000, "The variable should receive its value from another variable, but has never been configured to do so.";
    BadDeviceFailure = 0x808B_0000, "There has been a failure in the device/data source that generates the value that has affected the value.";
    BadInvalidArgument = 0x80AB_0000, "One or more arguments are invalid.";
    BadConnectionRejected = 0x80AC_0000, "Could not establish a network connection to remote server.";
    BadConnectionClosed = 0x80AE_0000, "The network connection has been closed.";
    BadInvalidState = 0x80AF_0000, "The operation cannot be completed because the object is closed, uninitialized or in some other invalid state.";
    BadRequestTooLarge = 0x80B8_0000, "The request message size exceeds limits set by the server.";
    BadResponseTooLarge = 0x80B9_0000, "The response message size exceeds limits set by the client.";
    BadProtocolVersionUnsupported = 0x80BE_0000, "The applications do not have compatible protocol versions.";
];

impl StatusCode {
    const SEVERITY_BAD: u32 = 0x8000_0000;
    const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
    const STATUS_MASK: u32 = 0xFFFF_0000;

    /// Wraps any 32-bit value, named or not.
    pub const fn from_bits(bits: u32) -> StatusCode {
        StatusCode(bits)
    }

    /// Returns the status code only if it is one of the named codes (ignoring info bits).
    pub fn from_u32(code: u32) -> Option<StatusCode> {
        Self::lookup(code & Self::STATUS_MASK).map(|_| StatusCode(code))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// The code with the informational bits masked out.
    pub fn status(&self) -> StatusCode {
        StatusCode(self.0 & Self::STATUS_MASK)
    }

    pub fn is_bad(&self) -> bool {
        self.0 & Self::SEVERITY_BAD != 0
    }

    pub fn is_uncertain(&self) -> bool {
        !self.is_bad() && self.0 & Self::SEVERITY_UNCERTAIN != 0
    }

    /// Tests if the status code is good (i.e. not bad or uncertain)
    pub fn is_good(&self) -> bool {
        !self.is_bad() && !self.is_uncertain()
    }

    pub fn name(&self) -> &'static str {
        Self::lookup(self.0 & Self::STATUS_MASK)
            .map(|(name, _)| name)
            .unwrap_or("Unknown")
    }

    pub fn description(&self) -> &'static str {
        Self::lookup(self.0 & Self::STATUS_MASK)
            .map(|(_, description)| description)
            .unwrap_or("Unrecognized status code")
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Good
    }
}

impl From<u32> for StatusCode {
    fn from(bits: u32) -> Self {
        StatusCode(bits)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match Self::lookup(self.0 & Self::STATUS_MASK) {
            Some((name, _)) if self.0 & !Self::STATUS_MASK == 0 => write!(f, "{}", name),
            Some((name, _)) => write!(f, "{}+0x{:04X}", name, self.0 & !Self::STATUS_MASK),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self, self.0)
    }
}

impl Error for StatusCode {}

impl From<StatusCode> for io::Error {
    fn from(e: StatusCode) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("StatusCode {}", e))
    }
}

impl BinaryEncoder<StatusCode> for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u32(stream, self.0)
    }

    fn decode<S: Read>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(StatusCode(read_u32(stream)?))
    }
}

#[cfg(test)]
mod tests {
    use super::StatusCode;

    #[test]
    fn severity() {
        assert!(StatusCode::Good.is_good());
        assert!(!StatusCode::Good.is_bad());
        assert!(!StatusCode::Good.is_uncertain());

        assert!(StatusCode::UncertainLastUsableValue.is_uncertain());
        assert!(!StatusCode::UncertainLastUsableValue.is_bad());
        assert!(!StatusCode::UncertainLastUsableValue.is_good());

        assert!(StatusCode::BadDecodingError.is_bad());
        assert!(!StatusCode::BadDecodingError.is_uncertain());
        assert!(!StatusCode::BadDecodingError.is_good());
    }

    #[test]
    fn names_and_info_bits() {
        assert_eq!(StatusCode::BadTimeout.to_string(), "BadTimeout");
        let with_info = StatusCode::from_bits(StatusCode::BadNodeIdUnknown.bits() | 0x0400);
        assert_eq!(with_info.status(), StatusCode::BadNodeIdUnknown);
        assert_eq!(with_info.name(), "BadNodeIdUnknown");
        assert_eq!(with_info.to_string(), "BadNodeIdUnknown+0x0400");
        assert_eq!(StatusCode::from_bits(0x80FF_0000).to_string(), "0x80FF0000");
        assert_eq!(StatusCode::from_u32(0x80FF_0000), None);
        assert_eq!(
            StatusCode::from_u32(0x8005_0000),
            Some(StatusCode::BadCommunicationError)
        );
    }
}
