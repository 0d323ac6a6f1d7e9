// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Connections to several devices, each through its own local address, with periodic health
//! checks and a shared shutdown.
//!
//! ```no_run
//! use opcua_multihomed::{client::ClientConfig, manager::{ManagerConfig, MultiInterfaceManager}};
//!
//! # async fn run() -> Result<(), opcua_multihomed::types::StatusCode> {
//! let config = ManagerConfig::new(ClientConfig::new("Monitor", "urn:Monitor"));
//! let mut manager = MultiInterfaceManager::new(config)?;
//! manager.add_device("Device A", "opc.tcp://192.168.100.1:4840", "192.168.100.10:0")?;
//! manager.add_device("Device B", "opc.tcp://192.168.100.1:4840", "192.168.100.20:0")?;
//!
//! let summary = manager.connect_all().await;
//! println!("{} of {} devices connected", summary.connected, summary.total());
//!
//! manager.start_monitoring();
//! tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//! manager.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod device;

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use config::{DeviceConfig, ManagerConfig};
pub use device::{DeviceConnection, DeviceStatus, HealthCheck};

use crate::{
    client::{Client, IdentityToken, Session},
    core::config::Config,
    net::LocalAddress,
    sync::Mutex,
    types::{NodeId, StatusCode, VariableId},
};

/// Result of [`MultiInterfaceManager::connect_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectSummary {
    /// Number of devices that connected
    pub connected: usize,
    /// Devices that did not, with the reason
    pub failed: Vec<(String, StatusCode)>,
}

impl ConnectSummary {
    pub fn total(&self) -> usize {
        self.connected + self.failed.len()
    }

    pub fn all_connected(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Connects a set of devices, each from its own local address, and watches their health.
pub struct MultiInterfaceManager {
    client: Client,
    devices: Vec<Arc<DeviceConnection>>,
    health_check_interval: Duration,
    connect_timeout: Duration,
    close_timeout: Duration,
    token: CancellationToken,
    monitors: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MultiInterfaceManager {
    /// Create a manager with the devices listed in `config`. Nothing connects until
    /// [`connect_all`](Self::connect_all) is called.
    pub fn new(config: ManagerConfig) -> Result<Self, StatusCode> {
        if !config.is_valid() {
            error!("Manager configuration is invalid");
            return Err(StatusCode::BadConfigurationError);
        }
        let devices = config
            .devices
            .iter()
            .map(|d| Arc::new(DeviceConnection::new(d)))
            .collect();
        Ok(MultiInterfaceManager {
            health_check_interval: config.health_check_interval(),
            connect_timeout: config.connect_timeout(),
            close_timeout: config.close_timeout(),
            client: Client::new(config.client),
            devices,
            token: CancellationToken::new(),
            monitors: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Add a device reached at `endpoint` from `local_address`, e.g. `"192.168.100.10:0"`.
    /// Names must be unique.
    pub fn add_device(
        &mut self,
        name: &str,
        endpoint: &str,
        local_address: &str,
    ) -> Result<Arc<DeviceConnection>, StatusCode> {
        let local_address = LocalAddress::from_str(local_address)?;
        self.add_device_config(DeviceConfig::new(name, endpoint, local_address))
    }

    /// Add a device from its configuration, which may also name an interface to bind to.
    pub fn add_device_config(
        &mut self,
        config: DeviceConfig,
    ) -> Result<Arc<DeviceConnection>, StatusCode> {
        if config.name.is_empty() {
            error!("Device for {} has no name", config.endpoint);
            return Err(StatusCode::BadInvalidArgument);
        }
        if self.device(&config.name).is_some() {
            error!("Device {} has already been added", config.name);
            return Err(StatusCode::BadInvalidArgument);
        }
        let device = Arc::new(DeviceConnection::new(&config));
        debug!(
            "Added device {} at {} from \"{}\"",
            config.name, config.endpoint, config.local_address
        );
        self.devices.push(device.clone());
        Ok(device)
    }

    pub fn devices(&self) -> &[Arc<DeviceConnection>] {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<&Arc<DeviceConnection>> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn statuses(&self) -> Vec<DeviceStatus> {
        self.devices.iter().map(|d| d.status()).collect()
    }

    /// Connect every device that is not connected yet. Devices are connected concurrently and
    /// independently, a failure is logged and recorded on the device and does not affect the
    /// others.
    pub async fn connect_all(&self) -> ConnectSummary {
        let pending = self.devices.iter().filter(|d| !d.is_connected());
        let results = join_all(pending.map(|d| async move {
            let res = self.connect_device(d).await;
            (d, res)
        }))
        .await;

        // Devices connected by an earlier call count too
        let failed = results
            .into_iter()
            .filter_map(|(d, res)| res.err().map(|e| (d.name().to_string(), e)))
            .collect();
        ConnectSummary {
            connected: self.devices.iter().filter(|d| d.is_connected()).count(),
            failed,
        }
    }

    async fn connect_device(&self, device: &DeviceConnection) -> Result<(), StatusCode> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(StatusCode::BadInvalidState);
        }
        match self
            .client
            .connect_endpoint(
                device.client_endpoint(),
                IdentityToken::Anonymous,
                self.connect_timeout,
            )
            .await
        {
            Ok((session, event_loop)) => {
                info!(
                    "Device {} connected to {} through \"{}\"",
                    device.name(),
                    device.endpoint_url(),
                    device.local_address()
                );
                device.set_connected(session, event_loop);
                Ok(())
            }
            Err(e) => {
                error!("Device {} failed to connect: {}", device.name(), e);
                device.set_error(e);
                Err(e)
            }
        }
    }

    /// Start one monitoring task per device. Each task health checks its device every
    /// health check interval until [`close`](Self::close) is called. Devices that are not
    /// connected are skipped. Calling this again while monitoring has no effect.
    pub fn start_monitoring(&self) {
        if self.token.is_cancelled() {
            warn!("Manager is closed, monitoring not started");
            return;
        }
        let mut monitors = trace_lock!(self.monitors);
        if !monitors.is_empty() {
            warn!("Monitoring has already been started");
            return;
        }
        for device in &self.devices {
            monitors.push(tokio::spawn(monitor_device(
                device.clone(),
                self.health_check_interval,
                self.token.clone(),
            )));
        }
        info!("Monitoring {} devices", monitors.len());
    }

    /// Read the server status of `session`. The check passes when the read succeeds and its
    /// value has a good status.
    pub async fn health_check(session: &Session, name: &str) -> Result<(), StatusCode> {
        health_check(session, name).await
    }

    /// Stop monitoring and close every session. Monitoring tasks are waited for before sessions
    /// close. Calling this more than once does nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        self.token.cancel();

        let monitors = std::mem::take(&mut *trace_lock!(self.monitors));
        for m in join_all(monitors).await {
            if let Err(e) = m {
                error!("Monitoring task failed: {}", e);
            }
        }

        join_all(self.devices.iter().map(|d| self.close_device(d))).await;
        info!("Manager closed");
    }

    async fn close_device(&self, device: &DeviceConnection) {
        let Some((session, event_loop)) = device.take_session() else {
            return;
        };
        match tokio::time::timeout(self.close_timeout, session.disconnect()).await {
            Ok(Ok(())) => debug!("Device {} disconnected", device.name()),
            Ok(Err(e)) => warn!("Device {} did not close cleanly: {}", device.name(), e),
            Err(_) => warn!("Device {} timed out closing", device.name()),
        }
        if let Some(mut event_loop) = event_loop {
            if tokio::time::timeout(self.close_timeout, &mut event_loop)
                .await
                .is_err()
            {
                event_loop.abort();
            }
        }
        info!("Device {} closed", device.name());
    }
}

impl Drop for MultiInterfaceManager {
    fn drop(&mut self) {
        // Tasks must not outlive the manager, sessions are left to their event loops
        self.token.cancel();
        for m in trace_lock!(self.monitors).drain(..) {
            m.abort();
        }
    }
}

async fn monitor_device(
    device: Arc<DeviceConnection>,
    health_check_interval: Duration,
    token: CancellationToken,
) {
    let start = tokio::time::Instant::now() + health_check_interval;
    let mut interval = tokio::time::interval_at(start, health_check_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Some(event_loop) = device.take_finished_event_loop() {
            let status = match event_loop.await {
                Ok(s) if s.is_bad() => s,
                Ok(_) => StatusCode::BadConnectionClosed,
                Err(_) => StatusCode::BadUnexpectedError,
            };
            warn!("Device {} lost its session: {}", device.name(), status);
            device.set_error(status);
        }

        if !device.is_connected() {
            continue;
        }
        let Some(session) = device.session() else {
            continue;
        };

        let res = tokio::select! {
            _ = token.cancelled() => break,
            r = health_check(&session, device.name()) => r,
        };
        if let Err(e) = res {
            error!("Device {} health check failed: {}", device.name(), e);
        }
        device.set_health(res);
    }
    debug!("Stopped monitoring device {}", device.name());
}

async fn health_check(session: &Session, name: &str) -> Result<(), StatusCode> {
    let node_id: NodeId = VariableId::Server_ServerStatus.into();
    let value = session.read_node(&node_id).await?;
    let status = value.status();
    if status == StatusCode::Good {
        info!("Device {} health check passed", name);
        Ok(())
    } else {
        Err(status)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        client::ClientBuilder,
        manager::{ManagerConfig, MultiInterfaceManager},
        types::StatusCode,
    };

    fn manager() -> MultiInterfaceManager {
        let client = ClientBuilder::new()
            .application_name("Manager Test")
            .application_uri("urn:ManagerTest")
            .auto_reconnect(false)
            .dial_timeout(Duration::from_millis(500))
            .config();
        let mut config = ManagerConfig::new(client);
        config.connect_timeout = 2000;
        config.close_timeout = 500;
        MultiInterfaceManager::new(config).unwrap()
    }

    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("opc.tcp://{}", listener.local_addr().unwrap());
        drop(listener);
        url
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert_eq!(
            MultiInterfaceManager::new(ManagerConfig::default()).err(),
            Some(StatusCode::BadConfigurationError)
        );
    }

    #[test]
    fn add_device_checks_name_and_address() {
        let mut m = manager();
        m.add_device("A", "opc.tcp://192.168.100.1:4840", "192.168.100.10:0")
            .unwrap();
        m.add_device("B", "opc.tcp://192.168.100.1:4840", "")
            .unwrap();
        assert_eq!(
            m.add_device("A", "opc.tcp://192.168.100.1:4840", "192.168.100.20:0")
                .err(),
            Some(StatusCode::BadInvalidArgument)
        );
        assert_eq!(
            m.add_device("C", "opc.tcp://192.168.100.1:4840", "192.168.100.20")
                .err(),
            Some(StatusCode::BadTcpEndpointUrlInvalid)
        );
        assert_eq!(m.devices().len(), 2);
        assert!(m.device("B").is_some());
        assert!(m.device("C").is_none());
    }

    #[tokio::test]
    async fn connect_all_continues_past_failures() {
        let mut m = manager();
        m.add_device("A", &refused_url(), "127.0.0.1:0").unwrap();
        m.add_device("B", &refused_url(), "").unwrap();

        let summary = m.connect_all().await;
        assert_eq!(summary.connected, 0);
        assert_eq!(summary.total(), 2);
        assert!(!summary.all_connected());

        for status in m.statuses() {
            assert!(!status.connected);
            assert!(status.last_error.is_some());
        }
        m.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut m = manager();
        m.add_device("A", &refused_url(), "").unwrap();
        m.start_monitoring();
        tokio::time::timeout(Duration::from_secs(2), m.close())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), m.close())
            .await
            .unwrap();
        // Closed managers neither monitor nor connect
        m.start_monitoring();
        let summary = m.connect_all().await;
        assert_eq!(summary.failed, vec![("A".to_string(), StatusCode::BadInvalidState)]);
    }
}
