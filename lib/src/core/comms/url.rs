// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Parsing and validation of `opc.tcp` endpoint urls.

use url::{Host, Url};

use crate::{core::constants::DEFAULT_OPC_UA_SERVER_PORT, types::status_code::StatusCode};

pub const OPC_TCP_SCHEME: &str = "opc.tcp";

/// Parses the url, supplying the default port if none is given.
fn opc_url_from_str(s: &str) -> Result<Url, StatusCode> {
    let mut url = Url::parse(s).map_err(|err| {
        error!("Cannot parse url \"{}\", error = {:?}", s, err);
        StatusCode::BadTcpEndpointUrlInvalid
    })?;
    if url.port().is_none() {
        let _ = url.set_port(Some(DEFAULT_OPC_UA_SERVER_PORT));
    }
    Ok(url)
}

pub fn is_opc_ua_binary_url(url: &str) -> bool {
    opc_url_from_str(url)
        .map(|url| url.scheme() == OPC_TCP_SCHEME && url.has_host())
        .unwrap_or(false)
}

/// Test if the two urls match except for the hostname, e.g. `localhost` vs `127.0.0.1`.
pub fn url_matches_except_host(url1: &str, url2: &str) -> bool {
    match (opc_url_from_str(url1), opc_url_from_str(url2)) {
        (Ok(mut url1), Ok(mut url2)) => {
            url1.set_host(Some("xxxx")).is_ok()
                && url2.set_host(Some("xxxx")).is_ok()
                && url1 == url2
        }
        _ => false,
    }
}

/// Splits an `opc.tcp` url into the host to dial and its port. IPv6 hosts are returned without
/// their brackets.
pub fn hostname_port_from_url(url: &str, default_port: u16) -> Result<(String, u16), StatusCode> {
    let url = Url::parse(url).map_err(|_| StatusCode::BadTcpEndpointUrlInvalid)?;
    if url.scheme() != OPC_TCP_SCHEME {
        error!("Url {} is not an {} url", url, OPC_TCP_SCHEME);
        return Err(StatusCode::BadTcpEndpointUrlInvalid);
    }
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(StatusCode::BadTcpEndpointUrlInvalid),
    };
    Ok((host, url.port().unwrap_or(default_port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_scheme() {
        assert!(is_opc_ua_binary_url("opc.tcp://192.168.100.1:4840"));
        assert!(is_opc_ua_binary_url(
            "opc.tcp://[FEDC:BA98:7654:3210:FEDC:BA98:7654:3210]:80/xyz"
        ));
        assert!(!is_opc_ua_binary_url("http://foo/xyz"));
        assert!(!is_opc_ua_binary_url("192.168.100.1:4840"));
    }

    #[test]
    fn url_matches_test() {
        assert!(url_matches_except_host(
            "opc.tcp://localhost/xyz",
            "opc.tcp://127.0.0.1:4840/xyz"
        ));
        assert!(!url_matches_except_host(
            "opc.tcp://localhost/xyz",
            "opc.tcp://127.0.0.1/abc"
        ));
    }

    #[test]
    fn host_and_port() {
        assert_eq!(
            hostname_port_from_url("opc.tcp://192.168.100.1:4841", 4840).unwrap(),
            ("192.168.100.1".to_string(), 4841)
        );
        assert_eq!(
            hostname_port_from_url("opc.tcp://device-a", 4840).unwrap(),
            ("device-a".to_string(), 4840)
        );
        assert_eq!(
            hostname_port_from_url("opc.tcp://[::1]:4840/", 4840).unwrap(),
            ("::1".to_string(), 4840)
        );
        assert_eq!(
            hostname_port_from_url("http://device-a:4840", 4840),
            Err(StatusCode::BadTcpEndpointUrlInvalid)
        );
        assert_eq!(
            hostname_port_from_url("not a url", 4840),
            Err(StatusCode::BadTcpEndpointUrlInvalid)
        );
    }
}
