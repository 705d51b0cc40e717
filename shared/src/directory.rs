//! Decoder for the obfuscated server directory.
//!
//! The directory body is a run of lower-case letters. After dropping the first
//! character, each letter encodes one hex digit shifted by seven times its
//! position. Digits pair up into bytes and bytes group into fixed-size records.

use crate::ProtocolError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Bytes per endpoint record: host(4) + port(3) + auth code(3) + cluster(1).
pub const RECORD_LEN: usize = 11;

/// One connectable game server as listed by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub host: Ipv4Addr,
    /// 24-bit port as transmitted; real servers fit in 16 bits.
    pub port: u32,
    pub auth_code: u32,
    pub cluster_id: u8,
}

impl EndpointRecord {
    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            host: Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            port: be_u24(&bytes[4..7]),
            auth_code: be_u24(&bytes[7..10]),
            cluster_id: bytes[10],
        }
    }

    /// Websocket URL of the game socket on this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, crate::SOCKET_PATH)
    }
}

impl fmt::Display for EndpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn be_u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

/// Decodes a directory body into endpoint records in presentation order.
///
/// A trailing partial record is dropped without looking at its characters.
/// Fails only when a character feeding a complete record does not decode to a
/// hex digit.
pub fn decode_directory(text: &str) -> Result<Vec<EndpointRecord>, ProtocolError> {
    let chars: Vec<char> = text.chars().skip(1).collect();

    // an odd final digit pairs with zero
    let byte_count = (chars.len() + 1) / 2;
    let record_count = byte_count / RECORD_LEN;
    let used = (record_count * RECORD_LEN * 2).min(chars.len());

    let remainder = byte_count % RECORD_LEN;
    if remainder > 0 {
        warn!(
            "Directory has {} trailing bytes after {} records, dropping them",
            remainder, record_count
        );
    }

    let digits = chars[..used]
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let code = i64::from(u32::from(c)) - 97;
            let digit = (code - 7 * i as i64).rem_euclid(26);
            if digit > 15 {
                Err(ProtocolError::MalformedDirectory { position: i + 1 })
            } else {
                Ok(digit as u8)
            }
        })
        .collect::<Result<Vec<u8>, _>>()?;

    let bytes: Vec<u8> = digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect();

    Ok(bytes
        .chunks_exact(RECORD_LEN)
        .map(EndpointRecord::from_bytes)
        .collect())
}
