//! Session construction parameters

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use shared::{EndpointRecord, SOCKET_PATH};
use std::fmt;
use std::str::FromStr;

/// Host and port of a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, SOCKET_PATH)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    /// Parses `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ClientError::InvalidConfig(format!("expected host:port, got '{s}'")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ClientError::InvalidConfig(format!("invalid port '{port}': {e}")))?;

        Ok(Endpoint::new(host, port))
    }
}

impl TryFrom<&EndpointRecord> for Endpoint {
    type Error = ClientError;

    fn try_from(record: &EndpointRecord) -> Result<Self, Self::Error> {
        let port = u16::try_from(record.port).map_err(|_| {
            ClientError::InvalidConfig(format!("server {} has port out of range", record))
        })?;

        Ok(Endpoint::new(record.host.to_string(), port))
    }
}

/// Everything a session needs to log in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub nickname: String,
    pub skin_id: u8,
    /// Sent on the wire as `protocol_version - 1` in one byte.
    pub protocol_version: u16,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.host.is_empty() {
            return Err(ClientError::InvalidConfig("empty host".to_string()));
        }

        if self.nickname.len() > u8::MAX as usize {
            return Err(ClientError::InvalidConfig(format!(
                "nickname is {} bytes, at most 255 allowed",
                self.nickname.len()
            )));
        }

        if !(1..=256).contains(&self.protocol_version) {
            return Err(ClientError::InvalidConfig(format!(
                "protocol version {} does not fit the wire format",
                self.protocol_version
            )));
        }

        Ok(())
    }
}
