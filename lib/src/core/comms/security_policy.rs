// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::types::status_code::StatusCode;

pub const SECURITY_POLICY_NONE: &str = "None";
pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

/// The security policies a channel can run under. Only `None` is implemented, anything else a
/// peer asks for is `Unknown` and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityPolicy {
    Unknown,
    None,
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for SecurityPolicy {
    type Err = StatusCode;

    /// Accepts the short name or the policy uri.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SECURITY_POLICY_NONE | SECURITY_POLICY_NONE_URI => Ok(SecurityPolicy::None),
            _ => {
                error!("Security policy {} is not supported", s);
                Err(StatusCode::BadSecurityPolicyRejected)
            }
        }
    }
}

impl SecurityPolicy {
    pub fn from_uri(uri: &str) -> SecurityPolicy {
        match uri {
            SECURITY_POLICY_NONE_URI => SecurityPolicy::None,
            _ => SecurityPolicy::Unknown,
        }
    }

    pub fn to_uri(&self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE_URI,
            SecurityPolicy::Unknown => "",
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE,
            SecurityPolicy::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_policies() {
        assert_eq!(SecurityPolicy::from_str("None"), Ok(SecurityPolicy::None));
        assert_eq!(
            SecurityPolicy::from_str(SECURITY_POLICY_NONE_URI),
            Ok(SecurityPolicy::None)
        );
        assert_eq!(
            SecurityPolicy::from_str("Basic256Sha256"),
            Err(StatusCode::BadSecurityPolicyRejected)
        );
        assert_eq!(
            SecurityPolicy::from_uri("http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"),
            SecurityPolicy::Unknown
        );
    }
}
