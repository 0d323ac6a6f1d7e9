// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Client configuration data.

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    core::{comms::security_policy::SecurityPolicy, config::Config},
    net::{LocalAddress, DEFAULT_DIAL_TIMEOUT},
    types::{service_types::MessageSecurityMode, DecodingOptions as UaDecodingOptions},
};

use super::retry::SessionRetryPolicy;

pub const ANONYMOUS_USER_TOKEN_ID: &str = "ANONYMOUS";

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ClientUserToken {
    pub user: String,
    pub password: String,
}

impl ClientUserToken {
    /// Constructs a client token which holds a username and password.
    pub fn user_pass<S, T>(user: S, password: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        ClientUserToken {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Describes an endpoint, its url, security policy, mode, user token and the local address the
/// connection to it leaves from.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ClientEndpoint {
    /// Endpoint path
    pub url: String,
    /// Security policy
    #[serde(default = "ClientEndpoint::none_policy")]
    pub security_policy: String,
    /// Security mode
    #[serde(default = "ClientEndpoint::none_policy")]
    pub security_mode: String,
    /// User id to use with the endpoint
    #[serde(default = "ClientEndpoint::anonymous_id")]
    pub user_token_id: String,
    /// Local address to bind, e.g. `192.168.100.10:0`. Empty lets the OS choose.
    #[serde(default)]
    pub local_address: LocalAddress,
    /// Interface to bind with `SO_BINDTODEVICE`. Linux only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_device: Option<String>,
}

impl ClientEndpoint {
    /// Makes a client endpoint
    pub fn new<T>(url: T) -> Self
    where
        T: Into<String>,
    {
        ClientEndpoint {
            url: url.into(),
            security_policy: Self::none_policy(),
            security_mode: Self::none_policy(),
            user_token_id: Self::anonymous_id(),
            local_address: LocalAddress::Unbound,
            bind_device: None,
        }
    }

    /// Same endpoint, bound to `local_address`.
    pub fn with_local_address(mut self, local_address: LocalAddress) -> Self {
        self.local_address = local_address;
        self
    }

    fn anonymous_id() -> String {
        ANONYMOUS_USER_TOKEN_ID.to_string()
    }

    fn none_policy() -> String {
        SecurityPolicy::None.to_str().to_string()
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy::from_str(&self.security_policy).unwrap_or(SecurityPolicy::Unknown)
    }

    pub fn security_mode(&self) -> MessageSecurityMode {
        MessageSecurityMode::from(self.security_mode.as_str())
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DecodingOptions {
    /// Maximum size of a message in bytes. 0 means no limit
    pub max_message_size: usize,
    /// Maximum number of chunks in a message. 0 means no limit
    pub max_chunk_count: usize,
    /// Maximum length in bytes (not chars!) of a string. 0 actually means 0, i.e. no string permitted
    pub max_string_length: usize,
    /// Maximum length in bytes of a byte string. 0 actually means 0, i.e. no byte string permitted
    pub max_byte_string_length: usize,
    /// Maximum number of array elements. 0 actually means 0, i.e. no array permitted
    pub max_array_length: usize,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        let defaults = UaDecodingOptions::default();
        DecodingOptions {
            max_message_size: defaults.max_message_size,
            max_chunk_count: defaults.max_chunk_count,
            max_string_length: defaults.max_string_length,
            max_byte_string_length: defaults.max_byte_string_length,
            max_array_length: defaults.max_array_length,
        }
    }
}

impl DecodingOptions {
    pub fn as_comms_decoding_options(&self) -> UaDecodingOptions {
        UaDecodingOptions {
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            max_string_length: self.max_string_length,
            max_byte_string_length: self.max_byte_string_length,
            max_array_length: self.max_array_length,
            ..Default::default()
        }
    }
}

/// Client OPC UA configuration
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    /// Name of the application that the client presents itself as to the server
    pub application_name: String,
    /// The application uri
    pub application_uri: String,
    /// Product uri
    pub product_uri: String,
    /// Preferred locales
    pub preferred_locales: Vec<String>,
    /// Identifier of the default endpoint
    pub default_endpoint: String,
    /// User tokens
    pub user_tokens: BTreeMap<String, ClientUserToken>,
    /// List of end points
    pub endpoints: BTreeMap<String, ClientEndpoint>,
    /// Source address for endpoints that do not name their own
    pub local_address: LocalAddress,
    /// Interface for endpoints that do not name their own. Linux only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_device: Option<String>,
    /// Decoding options used for serialization / deserialization
    pub decoding_options: DecodingOptions,
    /// Reconnect after the connection is lost. When false a session gets exactly one attempt.
    pub auto_reconnect: bool,
    /// Max retry limit -1 (forever), 0 or number
    pub session_retry_limit: i32,
    /// First reconnect delay in milliseconds
    pub session_retry_initial: u64,
    /// Largest reconnect delay in milliseconds. Equal to the initial delay for a fixed interval.
    pub session_retry_max: u64,
    /// Requested session timeout in milliseconds
    pub session_timeout: u32,
    /// Timeout for each request in milliseconds
    pub request_timeout: u64,
    /// Interval between keep-alive reads in milliseconds
    pub keep_alive_interval: u64,
    /// Timeout for establishing the TCP connection in milliseconds
    pub dial_timeout: u64,
    /// Requested secure channel lifetime in milliseconds
    pub channel_lifetime: u32,
    /// Max number of requests sent but not yet answered
    pub max_inflight_messages: usize,
    /// Session name
    pub session_name: String,
}

impl Config for ClientConfig {
    fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.application_name.is_empty() {
            errors.push("Application name is empty".to_string());
        }
        if self.application_uri.is_empty() {
            errors.push("Application uri is empty".to_string());
        }
        if self.user_tokens.contains_key(ANONYMOUS_USER_TOKEN_ID) {
            errors.push(format!(
                "User tokens contains the reserved \"{}\" id",
                ANONYMOUS_USER_TOKEN_ID
            ));
        }
        if self.user_tokens.contains_key("") {
            errors.push("User tokens contains a token with an empty id".to_string());
        }
        for (id, token) in &self.user_tokens {
            if token.user.is_empty() {
                errors.push(format!("User token {} has an empty name", id));
            }
        }
        if self.endpoints.contains_key("") {
            errors.push("Endpoints contains an endpoint with an empty id".to_string());
        }
        if !self.default_endpoint.is_empty() && !self.endpoints.contains_key(&self.default_endpoint)
        {
            errors.push(format!(
                "Default endpoint id {} does not exist in list of endpoints",
                self.default_endpoint
            ));
        }
        for (id, e) in &self.endpoints {
            if e.security_policy() != SecurityPolicy::None {
                errors.push(format!(
                    "Endpoint {} security policy {} is not supported",
                    id, e.security_policy
                ));
            }
            if e.security_mode() != MessageSecurityMode::None {
                errors.push(format!(
                    "Endpoint {} security mode {} is not supported",
                    id, e.security_mode
                ));
            }
            if e.user_token_id != ANONYMOUS_USER_TOKEN_ID
                && !self.user_tokens.contains_key(&e.user_token_id)
            {
                errors.push(format!(
                    "Endpoint {} refers to unknown user token {}",
                    id, e.user_token_id
                ));
            }
        }
        if self.session_retry_limit < -1 {
            errors.push(format!("Session retry limit of {} is invalid - must be -1 (infinite), 0 (never) or a positive value", self.session_retry_limit));
        }
        if self.session_retry_max < self.session_retry_initial {
            errors.push(format!(
                "Session retry max {}ms is less than the initial delay {}ms",
                self.session_retry_max, self.session_retry_initial
            ));
        }
        if self.request_timeout == 0 {
            errors.push("Request timeout must be greater than 0".to_string());
        }
        if self.dial_timeout == 0 {
            errors.push("Dial timeout must be greater than 0".to_string());
        }
        errors
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl ClientConfig {
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;
    pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 10_000;
    pub const DEFAULT_CHANNEL_LIFETIME_MS: u32 = 60_000;
    pub const DEFAULT_SESSION_TIMEOUT_MS: u32 = 60_000;

    pub fn new<T>(application_name: T, application_uri: T) -> Self
    where
        T: Into<String>,
    {
        ClientConfig {
            application_name: application_name.into(),
            application_uri: application_uri.into(),
            product_uri: String::new(),
            preferred_locales: Vec::new(),
            default_endpoint: String::new(),
            user_tokens: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            local_address: LocalAddress::Unbound,
            bind_device: None,
            decoding_options: DecodingOptions::default(),
            auto_reconnect: true,
            session_retry_limit: SessionRetryPolicy::DEFAULT_RETRY_LIMIT as i32,
            session_retry_initial: SessionRetryPolicy::DEFAULT_INITIAL_SLEEP_MS,
            session_retry_max: SessionRetryPolicy::DEFAULT_MAX_SLEEP_MS,
            session_timeout: Self::DEFAULT_SESSION_TIMEOUT_MS,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT_MS,
            keep_alive_interval: Self::DEFAULT_KEEP_ALIVE_INTERVAL_MS,
            dial_timeout: DEFAULT_DIAL_TIMEOUT.as_millis() as u64,
            channel_lifetime: Self::DEFAULT_CHANNEL_LIFETIME_MS,
            max_inflight_messages: 20,
            session_name: "Rust OPC UA Client".into(),
        }
    }

    /// The reconnect policy these settings describe.
    pub fn session_retry_policy(&self) -> SessionRetryPolicy {
        if !self.auto_reconnect {
            return SessionRetryPolicy::never();
        }
        let limit = if self.session_retry_limit < 0 {
            None
        } else {
            Some(self.session_retry_limit as u32)
        };
        SessionRetryPolicy::new(
            Duration::from_millis(self.session_retry_max),
            limit,
            Duration::from_millis(self.session_retry_initial),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        client::{ClientConfig, ClientEndpoint, ClientUserToken, SessionRetryPolicy},
        core::config::Config,
        net::LocalAddress,
    };

    fn sample_config() -> ClientConfig {
        let mut config = ClientConfig::new("Test Client", "urn:TestClient");
        config.user_tokens.insert(
            "operator".into(),
            ClientUserToken::user_pass("operator", "secret"),
        );
        let mut device_a = ClientEndpoint::new("opc.tcp://192.168.100.1:4840")
            .with_local_address("192.168.100.10:0".parse().unwrap());
        device_a.user_token_id = "operator".into();
        config.endpoints.insert("device_a".into(), device_a);
        config.endpoints.insert(
            "device_b".into(),
            ClientEndpoint::new("opc.tcp://192.168.100.1:4840")
                .with_local_address("192.168.100.20:0".parse().unwrap()),
        );
        config.default_endpoint = "device_a".into();
        config
    }

    #[test]
    fn default_is_invalid_without_names() {
        let config = ClientConfig::default();
        let errors = config.validation_errors();
        assert_eq!(errors.len(), 2);
        assert!(!config.is_valid());
    }

    #[test]
    fn sample_is_valid() {
        assert!(sample_config().validation_errors().is_empty());
    }

    #[test]
    fn unknown_references_are_reported() {
        let mut config = sample_config();
        config.default_endpoint = "device_c".into();
        config.endpoints.get_mut("device_b").unwrap().user_token_id = "nobody".into();
        config.endpoints.get_mut("device_b").unwrap().security_policy = "Basic256".into();
        assert_eq!(config.validation_errors().len(), 3);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.conf");
        let config = sample_config();
        config.save(&path).unwrap();
        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.endpoints["device_b"].local_address,
            LocalAddress::Bound("192.168.100.20:0".parse().unwrap())
        );
    }

    #[test]
    fn partial_yaml_takes_defaults() {
        let yaml = r#"
application_name: Partial
application_uri: "urn:Partial"
endpoints:
  plc:
    url: "opc.tcp://10.0.0.5:4840"
    local_address: "10.0.0.1:0"
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.is_valid());
        assert_eq!(config.endpoints["plc"].user_token_id, "ANONYMOUS");
        assert!(config.endpoints["plc"].local_address.is_bound());
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn retry_policy_from_settings() {
        let mut config = sample_config();
        config.auto_reconnect = false;
        assert_eq!(config.session_retry_policy(), SessionRetryPolicy::never());

        config.auto_reconnect = true;
        config.session_retry_limit = -1;
        config.session_retry_initial = 5000;
        config.session_retry_max = 5000;
        assert_eq!(
            config.session_retry_policy(),
            SessionRetryPolicy::fixed(Duration::from_secs(5), None)
        );
    }
}
