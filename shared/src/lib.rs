//! Wire-level protocol code shared by every part of the client: the challenge
//! decoder, the server directory decoder and the packet codec.
//!
//! Nothing in this crate performs I/O. Every function is a pure transformation
//! over byte slices or strings so it can be exercised without a server.

pub mod challenge;
pub mod directory;
pub mod packet;

use thiserror::Error;

pub use challenge::{decode_challenge, CHALLENGE_ANSWER_LEN, MIN_CHALLENGE_LEN};
pub use directory::{decode_directory, EndpointRecord, RECORD_LEN};
pub use packet::{ForwardedPacket, GameTag, Inbound, Outbound};

/// Domain the game server expects in the websocket `origin` header.
pub const GAME_DOMAIN: &str = "slither.io";

/// Path of the game websocket on every server.
pub const SOCKET_PATH: &str = "/slither";

/// Plaintext resource listing the game servers.
pub const DIRECTORY_URL: &str = "http://slither.io/i33628.txt";

/// Period between keep-alive packets once spawned.
pub const KEEP_ALIVE_PERIOD_MS: u64 = 250;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("challenge payload has {0} bytes, at least 65 required")]
    MalformedChallenge(usize),

    #[error("directory character at position {position} does not decode to a hex digit")]
    MalformedDirectory { position: usize },

    #[error("frame of {0} bytes is too short to carry a tag")]
    TruncatedFrame(usize),
}
