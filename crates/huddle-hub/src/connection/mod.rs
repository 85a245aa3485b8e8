//! The bidirectional message stream a client is bound to.
//!
//! The hub does not speak any wire protocol itself. A transport (the
//! WebSocket adapter in `huddle-node`, or [`memory`] in tests) implements
//! [`Connection`] and is split into a [`FrameReader`] driven by the
//! receive loop and a [`FrameWriter`] driven by the send loop.

pub mod memory;

use crate::error::ConnectionError;
use async_trait::async_trait;
use bytes::Bytes;

/// An opaque payload relayed between room members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
}

impl Message {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Message::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(data))
    }
}

/// One unit read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A payload to relay.
    Message(Message),
    /// The remote peer asked to close the stream.
    Close,
}

/// Read half of a connection.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Wait for the next frame. `None` means the stream has ended.
    async fn recv(&mut self) -> Option<Result<Frame, ConnectionError>>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Write one message to the remote peer.
    async fn send(&mut self, message: Message) -> Result<(), ConnectionError>;

    /// Close the stream. Called exactly once per connection.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// An upgraded bidirectional stream to a single remote peer.
pub trait Connection: Send + 'static {
    /// Write half type.
    type Writer: FrameWriter;
    /// Read half type.
    type Reader: FrameReader;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Writer, Self::Reader);
}
