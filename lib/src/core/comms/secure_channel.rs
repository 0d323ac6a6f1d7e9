// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use chrono::Duration;

use crate::types::{
    service_types::{ChannelSecurityToken, MessageSecurityMode},
    ByteString, DateTime, DecodingOptions,
};

use super::{
    message_chunk::MessageChunkType,
    security_header::{AsymmetricSecurityHeader, SecurityHeader, SymmetricSecurityHeader},
    security_policy::SecurityPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unknown,
    Client,
    Server,
}

/// The state of one secure channel: its id, the current token and the decoding limits that apply
/// to messages on it.
#[derive(Debug)]
pub struct SecureChannel {
    role: Role,
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
    secure_channel_id: u32,
    token_created_at: DateTime,
    /// Milliseconds
    token_lifetime: u32,
    token_id: u32,
    local_nonce: Vec<u8>,
    remote_nonce: Vec<u8>,
    decoding_options: DecodingOptions,
}

impl SecureChannel {
    pub fn new(role: Role, decoding_options: DecodingOptions) -> SecureChannel {
        SecureChannel {
            role,
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
            secure_channel_id: 0,
            token_created_at: DateTime::now(),
            token_lifetime: 0,
            token_id: 0,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            decoding_options,
        }
    }

    pub fn is_client_role(&self) -> bool {
        self.role == Role::Client
    }

    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    pub fn clear_security_token(&mut self) {
        self.secure_channel_id = 0;
        self.token_id = 0;
        self.token_created_at = DateTime::now();
        self.token_lifetime = 0;
    }

    pub fn set_security_token(&mut self, channel_token: ChannelSecurityToken) {
        self.secure_channel_id = channel_token.channel_id;
        self.token_id = channel_token.token_id;
        self.token_created_at = DateTime::now();
        self.token_lifetime = channel_token.revised_lifetime;
    }

    pub fn secure_channel_id(&self) -> u32 {
        self.secure_channel_id
    }

    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    pub fn token_lifetime(&self) -> u32 {
        self.token_lifetime
    }

    pub fn token_created_at(&self) -> DateTime {
        self.token_created_at
    }

    pub fn set_client_offset(&mut self, client_offset: Duration) {
        self.decoding_options.client_offset = client_offset;
    }

    pub fn decoding_options(&self) -> DecodingOptions {
        self.decoding_options.clone()
    }

    /// True once 75% of the token lifetime has elapsed.
    pub fn should_renew_security_token(&self) -> bool {
        if self.token_id == 0 {
            false
        } else {
            let renew_lifetime = Duration::milliseconds(i64::from(self.token_lifetime) * 3 / 4);
            DateTime::now() - self.token_created_at > renew_lifetime
        }
    }

    pub fn token_has_expired(&self) -> bool {
        let token_expires =
            self.token_created_at + Duration::milliseconds(i64::from(self.token_lifetime));
        DateTime::now() >= token_expires
    }

    pub fn make_security_header(&self, message_type: MessageChunkType) -> SecurityHeader {
        match message_type {
            MessageChunkType::OpenSecureChannel => {
                SecurityHeader::Asymmetric(AsymmetricSecurityHeader::none())
            }
            _ => SecurityHeader::Symmetric(SymmetricSecurityHeader {
                token_id: self.token_id,
            }),
        }
    }

    /// The nonce is unused under policy `None` but peers still expect a well formed value.
    pub fn create_random_nonce(&mut self) {
        self.local_nonce = ByteString::random(32).value.unwrap_or_default();
    }

    pub fn local_nonce_as_byte_string(&self) -> ByteString {
        if self.local_nonce.is_empty() {
            ByteString::null()
        } else {
            ByteString::from(self.local_nonce.clone())
        }
    }

    pub fn set_remote_nonce_from_byte_string(&mut self, remote_nonce: &ByteString) {
        self.remote_nonce = remote_nonce.as_ref().to_vec();
    }

    pub fn remote_nonce(&self) -> &[u8] {
        &self.remote_nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(revised_lifetime: u32) -> ChannelSecurityToken {
        ChannelSecurityToken {
            channel_id: 7,
            token_id: 1,
            created_at: DateTime::now(),
            revised_lifetime,
        }
    }

    #[test]
    fn renewal_at_three_quarters() {
        let mut channel = SecureChannel::new(Role::Client, DecodingOptions::default());
        assert!(!channel.should_renew_security_token());

        channel.set_security_token(token(60_000));
        assert_eq!(channel.secure_channel_id(), 7);
        assert!(!channel.should_renew_security_token());
        assert!(!channel.token_has_expired());

        channel.set_security_token(token(0));
        assert!(channel.should_renew_security_token() || channel.token_has_expired());

        channel.clear_security_token();
        assert_eq!(channel.secure_channel_id(), 0);
        assert!(!channel.should_renew_security_token());
    }

    #[test]
    fn security_headers() {
        let mut channel = SecureChannel::new(Role::Client, DecodingOptions::default());
        channel.set_security_token(token(60_000));
        assert!(matches!(
            channel.make_security_header(MessageChunkType::OpenSecureChannel),
            SecurityHeader::Asymmetric(_)
        ));
        assert_eq!(
            channel.make_security_header(MessageChunkType::Message),
            SecurityHeader::Symmetric(SymmetricSecurityHeader { token_id: 1 })
        );
    }
}
