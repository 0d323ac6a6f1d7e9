// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::StatusCode;

/// The source address of an outgoing connection.
///
/// Parsed from the same text form users put in configuration: an empty string leaves the choice
/// to the operating system, otherwise it must be `ip:port` or `[ipv6]:port`. Port `0` asks for
/// an ephemeral port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocalAddress {
    #[default]
    Unbound,
    Bound(SocketAddr),
}

impl FromStr for LocalAddress {
    type Err = StatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(LocalAddress::Unbound);
        }
        if let Ok(addr) = SocketAddr::from_str(s) {
            return Ok(LocalAddress::Bound(addr));
        }
        if IpAddr::from_str(s.trim_start_matches('[').trim_end_matches(']')).is_ok() {
            error!("Local address \"{}\" has no port, use \"{}:0\" for any port", s, s);
        } else {
            error!("Local address \"{}\" is not an ip:port pair", s);
        }
        Err(StatusCode::BadTcpEndpointUrlInvalid)
    }
}

impl From<SocketAddr> for LocalAddress {
    fn from(addr: SocketAddr) -> Self {
        LocalAddress::Bound(addr)
    }
}

impl fmt::Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddress::Unbound => Ok(()),
            LocalAddress::Bound(addr) => write!(f, "{}", addr),
        }
    }
}

impl Serialize for LocalAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        LocalAddress::from_str(&s).map_err(|_| {
            serde::de::Error::custom(format!("invalid local address \"{}\"", s))
        })
    }
}

impl LocalAddress {
    pub fn is_bound(&self) -> bool {
        matches!(self, LocalAddress::Bound(_))
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            LocalAddress::Unbound => None,
            LocalAddress::Bound(addr) => Some(*addr),
        }
    }

    /// True if a socket bound here can reach `remote`. An unbound address reaches anything.
    pub fn same_family(&self, remote: &SocketAddr) -> bool {
        match self {
            LocalAddress::Unbound => true,
            LocalAddress::Bound(addr) => addr.is_ipv4() == remote.is_ipv4(),
        }
    }

    /// True if `source`, the address a socket actually got, is one this address asked for.
    /// Port 0 and unspecified ips take whatever the system picked.
    pub fn accepts_source(&self, source: &SocketAddr) -> bool {
        match self {
            LocalAddress::Unbound => true,
            LocalAddress::Bound(addr) => {
                (addr.ip().is_unspecified() || addr.ip() == source.ip())
                    && (addr.port() == 0 || addr.port() == source.port())
            }
        }
    }
}
