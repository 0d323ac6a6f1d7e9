// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    client::ClientConfig,
    core::{comms::url::is_opc_ua_binary_url, config::Config},
    net::LocalAddress,
};

/// A device the manager connects to.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Unique name, used in logs and lookups
    pub name: String,
    /// `opc.tcp://` url of the device's server
    pub endpoint: String,
    /// Local address the connection leaves from. Empty lets the OS choose.
    #[serde(default)]
    pub local_address: LocalAddress,
    /// Interface to bind with `SO_BINDTODEVICE`. Linux only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_device: Option<String>,
}

impl DeviceConfig {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        local_address: LocalAddress,
    ) -> Self {
        DeviceConfig {
            name: name.into(),
            endpoint: endpoint.into(),
            local_address,
            bind_device: None,
        }
    }
}

/// Configuration of a [`MultiInterfaceManager`](super::MultiInterfaceManager).
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ManagerConfig {
    /// Settings shared by every device's client
    pub client: ClientConfig,
    /// Devices to connect to
    pub devices: Vec<DeviceConfig>,
    /// Milliseconds between health checks of a device
    pub health_check_interval: u64,
    /// Milliseconds allowed for a device's session to become active
    pub connect_timeout: u64,
    /// Milliseconds allowed for a device's session to close
    pub close_timeout: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            client: ClientConfig::default(),
            devices: Vec::new(),
            health_check_interval: Self::DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT_MS,
            close_timeout: Self::DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

impl ManagerConfig {
    pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 10_000;
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;
    pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5_000;

    pub fn new(client: ClientConfig) -> Self {
        ManagerConfig {
            client,
            ..Default::default()
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout)
    }
}

impl Config for ManagerConfig {
    fn validation_errors(&self) -> Vec<String> {
        let mut errors = self.client.validation_errors();
        let mut names = BTreeSet::new();
        for d in &self.devices {
            if d.name.is_empty() {
                errors.push(format!("Device for {} has an empty name", d.endpoint));
            } else if !names.insert(d.name.as_str()) {
                errors.push(format!("Device name {} is used more than once", d.name));
            }
            if !is_opc_ua_binary_url(&d.endpoint) {
                errors.push(format!(
                    "Device {} endpoint {} is not an opc.tcp url",
                    d.name, d.endpoint
                ));
            }
        }
        if self.health_check_interval == 0 {
            errors.push("Health check interval must be greater than 0".to_string());
        }
        if self.connect_timeout == 0 {
            errors.push("Connect timeout must be greater than 0".to_string());
        }
        errors
    }
}
