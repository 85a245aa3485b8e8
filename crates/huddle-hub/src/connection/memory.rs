//! In-process connection backed by channels.
//!
//! [`pair`] returns the server side, handed to [`Hub::accept`], and a
//! [`MemoryPeer`] that plays the remote client.
//!
//! [`Hub::accept`]: crate::Hub::accept

use super::{Connection, Frame, FrameReader, FrameWriter, Message};
use crate::error::ConnectionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Inbound = Result<Frame, ConnectionError>;

/// Create a connected server/peer pair. `capacity` bounds each direction.
pub fn pair(capacity: usize) -> (MemoryConnection, MemoryPeer) {
    let (to_server, inbound) = mpsc::channel(capacity);
    let (outbound, from_server) = mpsc::channel(capacity);
    let closed = Arc::new(AtomicBool::new(false));

    let conn = MemoryConnection {
        inbound,
        outbound,
        closed: closed.clone(),
    };
    let peer = MemoryPeer {
        to_server: Some(to_server),
        from_server,
        closed,
    };
    (conn, peer)
}

/// Server side of an in-process connection.
#[derive(Debug)]
pub struct MemoryConnection {
    inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::Sender<Message>,
    closed: Arc<AtomicBool>,
}

impl Connection for MemoryConnection {
    type Writer = MemoryWriter;
    type Reader = MemoryReader;

    fn split(self) -> (MemoryWriter, MemoryReader) {
        let writer = MemoryWriter {
            outbound: Some(self.outbound),
            closed: self.closed,
        };
        let reader = MemoryReader {
            inbound: self.inbound,
        };
        (writer, reader)
    }
}

/// Read half of a [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryReader {
    inbound: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<Frame, ConnectionError>> {
        self.inbound.recv().await
    }
}

/// Write half of a [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryWriter {
    outbound: Option<mpsc::Sender<Message>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        let outbound = self.outbound.as_ref().ok_or(ConnectionError::Closed)?;
        outbound
            .send(message)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.outbound.take();
        Ok(())
    }
}

/// The remote end of an in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_server: Option<mpsc::Sender<Inbound>>,
    from_server: mpsc::Receiver<Message>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Send a message to the server.
    pub async fn send(&self, message: impl Into<Message>) -> Result<(), ConnectionError> {
        self.push(Ok(Frame::Message(message.into()))).await
    }

    /// Send a close frame.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.push(Ok(Frame::Close)).await
    }

    /// Make the server's next read fail with a transport error.
    pub async fn fail(&self, reason: &str) -> Result<(), ConnectionError> {
        self.push(Err(ConnectionError::Transport(reason.to_string())))
            .await
    }

    /// Drop the inbound side so the server reads end-of-stream.
    pub fn hang_up(&mut self) {
        self.to_server.take();
    }

    /// Refuse further writes from the server. Already buffered messages can
    /// still be received.
    pub fn stop_reading(&mut self) {
        self.from_server.close();
    }

    /// Wait for the next message relayed to this peer. `None` once the
    /// server has closed the stream and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_server.recv().await
    }

    /// Take a buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.from_server.try_recv().ok()
    }

    /// Whether the server has closed its write half.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn push(&self, frame: Inbound) -> Result<(), ConnectionError> {
        let tx = self.to_server.as_ref().ok_or(ConnectionError::Closed)?;
        tx.send(frame).await.map_err(|_| ConnectionError::Closed)
    }
}
