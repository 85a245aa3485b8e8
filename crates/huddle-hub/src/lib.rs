//! # Huddle Hub
//!
//! In-memory room registry and message relay.
//!
//! A [`Hub`] owns every [`Room`]. Callers create rooms, look them up by id,
//! and hand the hub an already-upgraded [`Connection`] together with the
//! room it should join. The hub wraps the connection as a [`Client`], adds
//! it to the room, and relays every message it reads to the other members
//! until the connection ends.
//!
//! ## Features
//!
//! - **Room registry**: create, look up and automatically remove rooms
//! - **Broadcast relay**: messages go to every other member, verbatim
//! - **Bounded queues**: a slow recipient never stalls the sender or its peers
//! - **Graceful shutdown**: every client is signalled and given time to flush
//!
//! ## Example
//!
//! ```rust
//! use huddle_hub::connection::memory;
//! use huddle_hub::{Hub, Message};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = Arc::new(Hub::default());
//! let room = hub.create_room();
//!
//! let (conn, peer) = memory::pair(16);
//! let session = tokio::spawn({
//!     let hub = hub.clone();
//!     let room = room.clone();
//!     async move { hub.accept(conn, room).await }
//! });
//!
//! peer.close().await.unwrap();
//! let summary = session.await.unwrap().unwrap();
//! assert_eq!(summary.received, 0);
//! assert!(hub.get_room(&room.id).is_none());
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                     Hub                      │
//! │  rooms: room_id -> Room                      │
//! │                                              │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ Room                                   │  │
//! │  │  members: client_id -> Client          │  │
//! │  │             └─> outbound queue (mpsc)  │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//!
//!  per client:
//!    receive loop: Connection ──read──> Room::broadcast ──> peers' queues
//!    send loop:    outbound queue ──write──> Connection
//! ```
//!
//! Lock order is always registry before room.

pub mod client;
pub mod connection;
pub mod error;
pub mod hub;
pub mod policy;
pub mod room;

// Re-export main types
pub use client::{Client, ClientId, ClientState, CloseReason, Delivery, OverflowPolicy};
pub use connection::{Connection, Frame, FrameReader, FrameWriter, Message};
pub use error::{ConnectionError, HubError};
pub use hub::{Hub, HubConfig, HubStats, SessionSummary};
pub use policy::RoomRetention;
pub use room::{BroadcastReport, Room, RoomId, RoomInfo};
