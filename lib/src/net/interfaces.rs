// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::net::IpAddr;

use serde::Serialize;

use crate::types::StatusCode;

/// One address assigned to a network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceAddress {
    pub name: String,
    pub ip: IpAddr,
    pub is_loopback: bool,
}

impl InterfaceAddress {
    /// The text form of a [`LocalAddress`](super::LocalAddress) that binds to this address
    /// with an ephemeral port.
    pub fn local_address(&self) -> String {
        match self.ip {
            IpAddr::V4(ip) => format!("{}:0", ip),
            IpAddr::V6(ip) => format!("[{}]:0", ip),
        }
    }
}

/// Every address of every interface that is up.
///
/// Only Linux can tell whether an interface is up, from `/sys/class/net/<name>/flags`. On other
/// platforms every interface with an address is listed, including ones that are down.
pub fn interfaces() -> Result<Vec<InterfaceAddress>, StatusCode> {
    let addrs = if_addrs::get_if_addrs().map_err(|err| {
        error!("Cannot enumerate network interfaces, {:?}", err);
        StatusCode::BadResourceUnavailable
    })?;
    Ok(addrs
        .into_iter()
        .filter(|iface| is_up(&iface.name))
        .map(|iface| InterfaceAddress {
            is_loopback: iface.is_loopback(),
            ip: iface.ip(),
            name: iface.name,
        })
        .collect())
}

/// The IPv4 addresses a connection could be bound to: interfaces that are up, loopback
/// excluded.
pub fn available_interfaces() -> Result<Vec<IpAddr>, StatusCode> {
    Ok(interfaces()?
        .into_iter()
        .filter(|iface| !iface.is_loopback && iface.ip.is_ipv4())
        .map(|iface| iface.ip)
        .collect())
}

#[cfg(target_os = "linux")]
fn is_up(name: &str) -> bool {
    const IFF_UP: u32 = 0x1;
    // An interface without readable flags is assumed to be up rather than hidden
    std::fs::read_to_string(format!("/sys/class/net/{}/flags", name))
        .ok()
        .and_then(|flags| u32::from_str_radix(flags.trim().trim_start_matches("0x"), 16).ok())
        .map(|flags| flags & IFF_UP != 0)
        .unwrap_or(true)
}

#[cfg(not(target_os = "linux"))]
fn is_up(_name: &str) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_excludes_loopback() {
        let all = interfaces().unwrap();
        for iface in &all {
            trace!("{}: {}", iface.name, iface.ip);
        }
        let available = available_interfaces().unwrap();
        for ip in &available {
            assert!(ip.is_ipv4());
            assert!(!ip.is_loopback());
            assert!(all.iter().any(|iface| iface.ip == *ip));
        }
    }

    #[test]
    fn local_address_text() {
        let v4 = InterfaceAddress {
            name: "eth0".into(),
            ip: "192.168.100.10".parse().unwrap(),
            is_loopback: false,
        };
        assert_eq!(v4.local_address(), "192.168.100.10:0");
        let v6 = InterfaceAddress {
            name: "eth0".into(),
            ip: "fe80::1".parse().unwrap(),
            is_loopback: false,
        };
        assert_eq!(v6.local_address(), "[fe80::1]:0");
    }
}
