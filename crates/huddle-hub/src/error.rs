//! Error types for the hub.

use thiserror::Error;

/// Errors surfaced by hub and room operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// No room is registered under this id.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// The room was removed from the registry while a client was joining.
    #[error("room is no longer registered: {0}")]
    InvalidRoom(String),

    /// The hub is shutting down and no longer admits clients.
    #[error("hub is shutting down")]
    ShuttingDown,

    /// The client is already a member of a room.
    #[error("client already registered: {0}")]
    AlreadyRegistered(String),
}

/// Errors raised by a client's underlying stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The stream is already closed.
    #[error("connection closed")]
    Closed,

    /// The transport reported a read or write failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Wrap any transport error.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
