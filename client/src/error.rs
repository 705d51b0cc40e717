//! Errors surfaced by the client

use shared::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session already owns a connection")]
    AlreadyConnected,

    #[error("no open connection")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("directory fetch failed: {0}")]
    DirectoryFetch(#[from] reqwest::Error),

    #[error("directory lists no servers")]
    EmptyDirectory,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
