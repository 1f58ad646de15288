//! Duplex streaming client for the remote speech-recognition service.
//!
//! One [`StreamClient`] exists per recording session. It owns the WebSocket
//! connection lifecycle, accepts encoded PCM frames on the outbound side,
//! and surfaces transcript events on the inbound side. There is no
//! reconnection: both `Closed` and `Failed` are terminal, and a new session
//! must create a new client.

mod client;
mod message;

pub use client::{
    StreamClient, StreamConfig, StreamEvent, CONNECT_TIMEOUT, DEFAULT_MODEL, DEFAULT_URL,
};
pub use message::parse_transcript;

use std::time::Duration;

/// Lifecycle of the duplex connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Terminal states permit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("no API credential configured")]
    MissingCredential,
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
