// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{fmt, sync::Arc};

use tokio::task::JoinHandle;

use crate::{
    client::{ClientEndpoint, Session},
    net::LocalAddress,
    sync::RwLock,
    types::{DateTimeUtc, StatusCode},
};

use super::DeviceConfig;

#[derive(Default)]
struct DeviceState {
    session: Option<Arc<Session>>,
    event_loop: Option<JoinHandle<StatusCode>>,
    connected: bool,
    last_error: Option<StatusCode>,
    last_health_check: Option<HealthCheck>,
}

/// Outcome of the most recent health check of a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthCheck {
    pub at: DateTimeUtc,
    pub result: Result<(), StatusCode>,
}

/// A point in time copy of a device's state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub name: String,
    pub endpoint: String,
    pub local_address: LocalAddress,
    pub connected: bool,
    pub last_error: Option<StatusCode>,
    pub last_health_check: Option<HealthCheck>,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = if self.local_address.is_bound() {
            self.local_address.to_string()
        } else {
            "any".to_string()
        };
        write!(f, "{} ({} via {}): ", self.name, self.endpoint, from)?;
        if self.connected {
            write!(f, "connected")?;
        } else {
            write!(f, "disconnected")?;
        }
        if let Some(e) = self.last_error {
            write!(f, ", last error {}", e)?;
        }
        match self.last_health_check {
            Some(HealthCheck { at, result: Ok(()) }) => {
                write!(f, ", healthy at {}", at.format("%H:%M:%S"))
            }
            Some(HealthCheck { at, result: Err(e) }) => {
                write!(f, ", unhealthy at {} ({})", at.format("%H:%M:%S"), e)
            }
            None => Ok(()),
        }
    }
}

/// One device the manager talks to, and the state of its connection.
///
/// The state is only locked for short reads and writes, never across a request to the device.
pub struct DeviceConnection {
    name: String,
    endpoint: ClientEndpoint,
    state: RwLock<DeviceState>,
}

impl DeviceConnection {
    pub(crate) fn new(config: &DeviceConfig) -> Self {
        let mut endpoint =
            ClientEndpoint::new(config.endpoint.as_str()).with_local_address(config.local_address);
        endpoint.bind_device = config.bind_device.clone();
        DeviceConnection {
            name: config.name.clone(),
            endpoint,
            state: RwLock::new(DeviceState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint.url
    }

    pub fn local_address(&self) -> LocalAddress {
        self.endpoint.local_address
    }

    pub(crate) fn client_endpoint(&self) -> &ClientEndpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        trace_read_lock!(self.state).connected
    }

    /// The device's session, if it has connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        trace_read_lock!(self.state).session.clone()
    }

    pub fn last_error(&self) -> Option<StatusCode> {
        trace_read_lock!(self.state).last_error
    }

    pub fn last_health_check(&self) -> Option<HealthCheck> {
        trace_read_lock!(self.state).last_health_check
    }

    /// Record a connection failure. The device is no longer considered connected.
    pub fn set_error(&self, error: StatusCode) {
        let mut state = trace_write_lock!(self.state);
        state.connected = false;
        state.last_error = Some(error);
    }

    pub(crate) fn set_connected(&self, session: Arc<Session>, event_loop: JoinHandle<StatusCode>) {
        let mut state = trace_write_lock!(self.state);
        state.session = Some(session);
        state.event_loop = Some(event_loop);
        state.connected = true;
        state.last_error = None;
    }

    /// A failed check is kept as the last error but leaves the connection alone, the session's
    /// event loop deals with reconnecting.
    pub(crate) fn set_health(&self, result: Result<(), StatusCode>) {
        let mut state = trace_write_lock!(self.state);
        if let Err(e) = result {
            state.last_error = Some(e);
        }
        state.last_health_check = Some(HealthCheck {
            at: chrono::Utc::now(),
            result,
        });
    }

    /// Take the event loop if it has ended, i.e. it gave up reconnecting or failed.
    pub(crate) fn take_finished_event_loop(&self) -> Option<JoinHandle<StatusCode>> {
        let mut state = trace_write_lock!(self.state);
        if state.event_loop.as_ref().is_some_and(|h| h.is_finished()) {
            state.event_loop.take()
        } else {
            None
        }
    }

    /// Take the session and event loop for closing. A second call gets nothing.
    pub(crate) fn take_session(&self) -> Option<(Arc<Session>, Option<JoinHandle<StatusCode>>)> {
        let mut state = trace_write_lock!(self.state);
        state.connected = false;
        let session = state.session.take()?;
        Some((session, state.event_loop.take()))
    }

    pub fn status(&self) -> DeviceStatus {
        let state = trace_read_lock!(self.state);
        DeviceStatus {
            name: self.name.clone(),
            endpoint: self.endpoint.url.clone(),
            local_address: self.endpoint.local_address,
            connected: state.connected,
            last_error: state.last_error,
            last_health_check: state.last_health_check,
        }
    }
}

impl fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint.url)
            .field("local_address", &self.endpoint.local_address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        manager::{DeviceConfig, DeviceConnection},
        types::StatusCode,
    };

    fn device() -> DeviceConnection {
        DeviceConnection::new(&DeviceConfig::new(
            "Device A",
            "opc.tcp://192.168.100.1:4840",
            "192.168.100.10:0".parse().unwrap(),
        ))
    }

    #[test]
    fn new_device_is_disconnected() {
        let d = device();
        assert!(!d.is_connected());
        assert!(d.session().is_none());
        assert!(d.last_error().is_none());
        assert!(d.take_session().is_none());
        assert_eq!(d.endpoint_url(), "opc.tcp://192.168.100.1:4840");
    }

    #[test]
    fn health_failure_is_recorded_without_disconnecting() {
        let d = device();
        d.set_health(Err(StatusCode::BadServerHalted));
        let status = d.status();
        assert_eq!(status.last_error, Some(StatusCode::BadServerHalted));
        assert_eq!(
            status.last_health_check.map(|h| h.result),
            Some(Err(StatusCode::BadServerHalted))
        );

        d.set_health(Ok(()));
        // The error stays until a connection succeeds
        assert_eq!(d.last_error(), Some(StatusCode::BadServerHalted));
        assert_eq!(d.last_health_check().map(|h| h.result), Some(Ok(())));
    }

    #[test]
    fn status_display() {
        let d = device();
        d.set_error(StatusCode::BadTimeout);
        let s = d.status().to_string();
        assert!(s.starts_with("Device A (opc.tcp://192.168.100.1:4840 via 192.168.100.10:0)"));
        assert!(s.contains("disconnected"));
        assert!(s.contains("BadTimeout"));
    }
}
