// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{io, net::SocketAddr, time::Duration};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};

use crate::{
    core::{comms::url::hostname_port_from_url, constants::DEFAULT_OPC_UA_SERVER_PORT},
    types::StatusCode,
};

use super::LocalAddress;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Makes TCP connections that leave from a chosen local address, and optionally a named
/// device, before any OPC UA bytes are exchanged.
#[derive(Debug, Clone)]
pub struct Dialer {
    local_address: LocalAddress,
    bind_device: Option<String>,
    timeout: Duration,
}

impl Default for Dialer {
    fn default() -> Self {
        Dialer::new(LocalAddress::Unbound)
    }
}

impl Dialer {
    pub fn new(local_address: LocalAddress) -> Dialer {
        Dialer {
            local_address,
            bind_device: None,
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    /// Pins the socket to an interface by name (`SO_BINDTODEVICE`). Only Linux supports this
    /// and it usually needs `CAP_NET_RAW`.
    pub fn bind_device(mut self, device: impl Into<String>) -> Self {
        let device = device.into();
        self.bind_device = if device.is_empty() { None } else { Some(device) };
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn local_address(&self) -> LocalAddress {
        self.local_address
    }

    /// Resolves the host of an `opc.tcp://` url and connects to the first address of the same
    /// family as the local address.
    pub async fn connect_url(&self, endpoint_url: &str) -> Result<TcpStream, StatusCode> {
        let (host, port) = hostname_port_from_url(endpoint_url, DEFAULT_OPC_UA_SERVER_PORT)?;
        let addrs = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|err| {
                error!("Invalid address {}, cannot be resolved {:?}", endpoint_url, err);
                StatusCode::BadTcpEndpointUrlInvalid
            })?
            .collect::<Vec<_>>();

        let addr = addrs
            .iter()
            .find(|addr| self.local_address.same_family(addr))
            .copied()
            .ok_or_else(|| {
                error!(
                    "None of the addresses {:?} of {} can be reached from local address {}",
                    addrs, endpoint_url, self.local_address
                );
                StatusCode::BadTcpEndpointUrlInvalid
            })?;
        self.connect(addr).await
    }

    pub async fn connect(&self, remote: SocketAddr) -> Result<TcpStream, StatusCode> {
        if !self.local_address.same_family(&remote) {
            error!(
                "Local address {} and remote address {} are of different families",
                self.local_address, remote
            );
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        }

        let socket = self.make_socket(&remote)?;
        debug!(
            "Connecting to {} from {}",
            remote,
            socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "any".into())
        );

        match tokio::time::timeout(self.timeout, socket.connect(remote)).await {
            Ok(Ok(stream)) => {
                if let Ok(local) = stream.local_addr() {
                    debug!("Connected to {} from {}", remote, local);
                }
                Ok(stream)
            }
            Ok(Err(err)) => {
                error!("Could not connect to host {}, {:?}", remote, err);
                Err(Self::status_from_io(&err))
            }
            Err(_) => {
                error!(
                    "Connecting to {} timed out after {}ms",
                    remote,
                    self.timeout.as_millis()
                );
                Err(StatusCode::BadTimeout)
            }
        }
    }

    fn make_socket(&self, remote: &SocketAddr) -> Result<TcpSocket, StatusCode> {
        let socket = Socket::new(Domain::for_address(*remote), Type::STREAM, Some(Protocol::TCP))
            .map_err(|err| {
                error!("Cannot create socket, {:?}", err);
                StatusCode::BadCommunicationError
            })?;
        socket.set_nonblocking(true).map_err(|err| {
            error!("Cannot make socket non-blocking, {:?}", err);
            StatusCode::BadCommunicationError
        })?;

        if let Some(device) = &self.bind_device {
            Self::set_bind_device(&socket, device)?;
        }

        if let LocalAddress::Bound(local) = self.local_address {
            socket.bind(&SockAddr::from(local)).map_err(|err| {
                error!("Cannot bind to local address {}, {:?}", local, err);
                StatusCode::BadCommunicationError
            })?;
        }

        Ok(TcpSocket::from_std_stream(socket.into()))
    }

    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    fn set_bind_device(socket: &Socket, device: &str) -> Result<(), StatusCode> {
        socket.bind_device(Some(device.as_bytes())).map_err(|err| {
            error!("Cannot bind socket to device {}, {:?}", device, err);
            StatusCode::BadCommunicationError
        })
    }

    #[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
    fn set_bind_device(_socket: &Socket, device: &str) -> Result<(), StatusCode> {
        error!(
            "Binding to device {} is not supported on this platform, use a local address",
            device
        );
        Err(StatusCode::BadNotSupported)
    }

    fn status_from_io(err: &io::Error) -> StatusCode {
        match err.kind() {
            io::ErrorKind::TimedOut => StatusCode::BadTimeout,
            _ => StatusCode::BadCommunicationError,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Instant};

    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn connects_from_bound_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote = listener.local_addr().unwrap();

        let dialer = Dialer::new(LocalAddress::from_str("127.0.0.1:0").unwrap());
        let (stream, accepted) = tokio::join!(dialer.connect(remote), listener.accept());
        let stream = stream.unwrap();
        let (_, peer) = accepted.unwrap();
        assert_eq!(peer, stream.local_addr().unwrap());
        assert_eq!(peer.ip().to_string(), "127.0.0.1");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn connects_from_second_loopback_address() {
        // All of 127/8 is local on Linux, so 127.0.0.2 stands in for a second interface
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("opc.tcp://127.0.0.1:{}/", listener.local_addr().unwrap().port());

        let dialer = Dialer::new(LocalAddress::from_str("127.0.0.2:0").unwrap());
        let (stream, accepted) = tokio::join!(dialer.connect_url(&url), listener.accept());
        assert!(stream.is_ok());
        let (_, peer) = accepted.unwrap();
        assert_eq!(peer.ip().to_string(), "127.0.0.2");
    }

    #[tokio::test]
    async fn family_mismatch() {
        let dialer = Dialer::new(LocalAddress::from_str("[::1]:0").unwrap());
        assert_eq!(
            dialer.connect("127.0.0.1:4840".parse().unwrap()).await.err(),
            Some(StatusCode::BadTcpEndpointUrlInvalid)
        );
    }

    #[tokio::test]
    async fn unreachable_fails_within_timeout() {
        // 192.0.2.0/24 is reserved for documentation and never routed
        let dialer = Dialer::new(LocalAddress::Unbound).timeout(Duration::from_millis(500));
        let started = Instant::now();
        let result = dialer.connect("192.0.2.1:4840".parse().unwrap()).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn bad_url() {
        assert_eq!(
            Dialer::default()
                .connect_url("http://127.0.0.1:4840")
                .await
                .err(),
            Some(StatusCode::BadTcpEndpointUrlInvalid)
        );
    }
}
