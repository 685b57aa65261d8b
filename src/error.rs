//! Error types for the Word Derby client.

use thiserror::Error;

/// Errors that can occur when using the Word Derby client.
#[derive(Debug, Error)]
pub enum DerbyError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client loop has exited, so no further actions can be queued.
    #[error("not connected to server")]
    NotConnected,

    /// A player cannot be registered without a name.
    #[error("player name must not be empty")]
    EmptyPlayerName,

    /// A player cannot be registered without choosing an icon.
    #[error("no player icon selected")]
    NoIconSelected,

    /// The local player has already been submitted to the server.
    #[error("player already registered")]
    AlreadyRegistered,

    /// A definition index outside the three presented options.
    #[error("definition index {0} is out of range")]
    DefinitionOutOfRange(u8),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Word Derby client operations.
pub type Result<T> = std::result::Result<T, DerbyError>;
