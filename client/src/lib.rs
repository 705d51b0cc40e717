//! # Game Client Library
//!
//! Client side of the game's binary websocket protocol: everything needed to
//! pick a server, pass the anti-bot challenge, spawn, and keep the session
//! alive. Gameplay packets are not interpreted here; they are handed to a
//! registered handler with their tag and raw payload.
//!
//! ## Module Organization
//!
//! ### Directory Module (`directory`)
//! Downloads the obfuscated server list over HTTP and decodes it into
//! endpoint records.
//!
//! ### Session Module (`session`)
//! The connection lifecycle as an I/O-free state machine:
//! `Disconnected -> Connecting -> AwaitingChallenge -> AwaitingSpawnAck -> Spawned`.
//! Owns the keep-alive timer while spawned.
//!
//! ### Network Module (`network`)
//! Runs a session over a websocket on its own task and exposes the `Client`
//! handle used by applications.
//!
//! ### Config Module (`config`)
//! Construction parameters: nickname, skin, protocol version, target server.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::{Endpoint, SessionConfig};
//! use client::directory::DirectoryClient;
//! use client::network::Client;
//! use client::session::SessionState;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = DirectoryClient::new()?.fetch_first_server().await?;
//!
//!     let mut client = Client::new(SessionConfig {
//!         endpoint: Endpoint::try_from(&server)?,
//!         nickname: "snek".to_string(),
//!         skin_id: 15,
//!         protocol_version: 11,
//!     })?;
//!     client.on_packet(|packet| println!("{} ({} bytes)", packet.tag.as_char(), packet.payload.len()));
//!
//!     client.connect().await?;
//!     client.wait_for_state(SessionState::Spawned).await?;
//!     client.move_to(90.0)?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod session;

pub use error::ClientError;
