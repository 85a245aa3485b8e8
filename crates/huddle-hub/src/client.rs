//! Client session state.

use crate::connection::Message;
use crate::room::RoomId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

/// Unique identifier for a connected client.
pub type ClientId = String;

/// Consumer end of a client's outbound queue, drained by its send loop.
pub type ClientReceiver = mpsc::Receiver<Message>;

/// What to do when a recipient's outbound queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the new message for that recipient only.
    #[default]
    DropNewest,
    /// Discard the message and close the recipient.
    Disconnect,
}

/// Lifecycle of a client. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ClientState {
    /// Registered and relaying.
    Connected = 0,
    /// Termination detected; loops are winding down.
    Closing = 1,
    /// Stream closed and removed from its room.
    Closed = 2,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Connected,
            1 => ClientState::Closing,
            _ => ClientState::Closed,
        }
    }
}

/// Why a client left the `Connected` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The remote peer sent a close frame or ended the stream.
    PeerClosed,
    /// Reading from the stream failed.
    ReadError,
    /// Writing to the stream failed.
    WriteError,
    /// The hub is shutting down.
    Shutdown,
    /// The outbound queue overflowed under [`OverflowPolicy::Disconnect`].
    SlowConsumer,
    /// The room was removed before the client could join.
    RoomUnavailable,
}

impl CloseReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ReadError => "read_error",
            CloseReason::WriteError => "write_error",
            CloseReason::Shutdown => "shutdown",
            CloseReason::SlowConsumer => "slow_consumer",
            CloseReason::RoomUnavailable => "room_unavailable",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of handing one message to a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Placed on the outbound queue.
    Queued,
    /// The queue was full; the message was discarded.
    Dropped,
    /// The client is no longer accepting messages.
    Rejected,
}

/// A connected peer: its identity, outbound queue and close signal.
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier.
    pub id: ClientId,
    sender: mpsc::Sender<Message>,
    state: AtomicU8,
    reason: OnceLock<CloseReason>,
    room: OnceLock<RoomId>,
    overflow: OverflowPolicy,
    token: CancellationToken,
    dropped: AtomicU64,
    connected_at: Instant,
}

impl Client {
    /// Create a client around the producer end of its outbound queue.
    pub fn new(
        id: ClientId,
        sender: mpsc::Sender<Message>,
        overflow: OverflowPolicy,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            sender,
            state: AtomicU8::new(ClientState::Connected as u8),
            reason: OnceLock::new(),
            room: OnceLock::new(),
            overflow,
            token,
            dropped: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    /// Queue a message for delivery without waiting.
    pub fn enqueue(&self, message: Message) -> Delivery {
        if !self.is_connected() {
            return Delivery::Rejected;
        }

        match self.sender.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match self.overflow {
                    OverflowPolicy::DropNewest => {
                        debug!(client_id = %self.id, "Outbound queue full, message dropped");
                    }
                    OverflowPolicy::Disconnect => {
                        self.close(CloseReason::SlowConsumer);
                    }
                }
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Rejected,
        }
    }

    /// Move from `Connected` to `Closing`. Returns `false` if another caller
    /// got there first, in which case the original reason is kept.
    pub fn close(&self, reason: CloseReason) -> bool {
        let won = self
            .state
            .compare_exchange(
                ClientState::Connected as u8,
                ClientState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            let _ = self.reason.set(reason);
            self.token.cancel();
            debug!(client_id = %self.id, reason = %reason, "Client closing");
        }
        won
    }

    /// Move from `Closing` to `Closed`. Only the first call returns `true`.
    pub(crate) fn finish(&self) -> bool {
        self.state
            .compare_exchange(
                ClientState::Closing as u8,
                ClientState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the client still accepts messages.
    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// The reason recorded by the `Connected -> Closing` transition.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.reason.get().copied()
    }

    /// The room this client was registered into.
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room.get()
    }

    /// Bind the client to a room. Only the first call succeeds.
    pub(crate) fn bind_room(&self, room_id: &RoomId) -> bool {
        self.room.set(room_id.clone()).is_ok()
    }

    /// Messages discarded because the outbound queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves once the client is closing or the hub is shutting down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Whether the close signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// When the client was created.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }
}

/// Create a new client with a fresh id and its queue receiver.
pub fn create_client(
    capacity: usize,
    overflow: OverflowPolicy,
    token: CancellationToken,
) -> (Arc<Client>, ClientReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let id = uuid::Uuid::new_v4().to_string();
    let client = Arc::new(Client::new(id, sender, overflow, token));
    (client, receiver)
}
