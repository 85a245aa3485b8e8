//! Room registry and client session driver.

use crate::client::{create_client, Client, ClientId, ClientReceiver, CloseReason, OverflowPolicy};
use crate::connection::{Connection, Frame, FrameReader, FrameWriter};
use crate::error::{ConnectionError, HubError};
use crate::policy::RoomRetention;
use crate::room::{Room, RoomId, RoomInfo};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Default capacity of each client's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Default time a closing client gets to flush its queue.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2_000;

/// Hub tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Capacity of each client's outbound queue.
    pub outbound_capacity: usize,
    /// What to do when a recipient's queue is full.
    pub overflow: OverflowPolicy,
    /// How long a closing client may spend flushing queued messages.
    pub drain_timeout_ms: u64,
    /// When empty rooms are removed.
    pub retention: RoomRetention,
}

impl HubConfig {
    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            overflow: OverflowPolicy::default(),
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            retention: RoomRetention::default(),
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Rooms currently registered.
    pub current_rooms: usize,
    /// Clients currently joined to a room.
    pub current_clients: usize,
    /// Rooms created since start.
    pub rooms_created: u64,
    /// Rooms removed since start.
    pub rooms_removed: u64,
    /// Clients admitted since start.
    pub total_clients: u64,
    /// Messages read from clients.
    pub messages_received: u64,
    /// Per-recipient deliveries queued.
    pub messages_delivered: u64,
    /// Per-recipient deliveries dropped on full queues.
    pub messages_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    rooms_created: AtomicU64,
    rooms_removed: AtomicU64,
    total_clients: AtomicU64,
    messages_received: AtomicU64,
    messages_delivered: AtomicU64,
    messages_dropped: AtomicU64,
}

/// What happened during one client's session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// The client that ran the session.
    pub client_id: ClientId,
    /// The room it was joined to.
    pub room_id: RoomId,
    /// Why the session ended.
    pub reason: CloseReason,
    /// Messages read from the client.
    pub received: u64,
    /// Deliveries queued to peers.
    pub delivered: u64,
    /// Deliveries dropped on full peer queues.
    pub dropped: u64,
    /// Session length.
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct Tally {
    received: u64,
    delivered: u64,
    dropped: u64,
}

/// Process-wide registry of rooms and the entry point for new clients.
#[derive(Debug)]
pub struct Hub {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    config: HubConfig,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    clients: AtomicUsize,
    counters: Counters,
}

impl Hub {
    /// Create a hub with the given configuration.
    pub fn new(config: HubConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
            clients: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    /// The configuration this hub runs with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create an empty room with a fresh id.
    pub fn create_room(&self) -> Arc<Room> {
        let mut rooms = self.rooms.write();
        let id = loop {
            let candidate = uuid::Uuid::new_v4().simple().to_string();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let room = Arc::new(Room::new(id.clone()));
        rooms.insert(id.clone(), room.clone());
        drop(rooms);

        self.counters.rooms_created.fetch_add(1, Ordering::Relaxed);
        info!(room_id = %id, "Room created");
        room
    }

    /// Look up a room.
    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.read().get(id).cloned()
    }

    /// Look up a room, failing with [`HubError::RoomNotFound`].
    pub fn room(&self, id: &str) -> Result<Arc<Room>, HubError> {
        self.get_room(id)
            .ok_or_else(|| HubError::RoomNotFound(id.to_string()))
    }

    /// Add a client to a room.
    ///
    /// A client belongs to at most one room for its whole life: once bound,
    /// any further `register` fails with [`HubError::AlreadyRegistered`],
    /// even if the first join was refused.
    pub fn register(&self, client: &Arc<Client>, room: &Arc<Room>) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        if !client.bind_room(&room.id) {
            return Err(HubError::AlreadyRegistered(client.id.clone()));
        }
        room.join(client.clone())?;

        self.clients.fetch_add(1, Ordering::Relaxed);
        self.counters.total_clients.fetch_add(1, Ordering::Relaxed);
        debug!(client_id = %client.id, room_id = %room.id, "Client registered");
        Ok(())
    }

    /// Remove a client from a room, removing the room too if the retention
    /// policy says so. Unregistering a non-member is a no-op.
    pub fn unregister(&self, client: &Client, room: &Arc<Room>) {
        let Some(remaining) = room.leave(&client.id) else {
            return;
        };

        self.clients.fetch_sub(1, Ordering::Relaxed);
        debug!(client_id = %client.id, room_id = %room.id, remaining, "Client unregistered");

        if remaining == 0 && self.config.retention.removes_on_leave() {
            self.remove_if_expired(room, Instant::now());
        }
    }

    /// Remove every empty room the retention policy considers expired.
    /// Returns the number removed.
    pub fn sweep(&self) -> usize {
        if !self.config.retention.needs_sweep() {
            return 0;
        }

        let now = Instant::now();
        let mut rooms = self.rooms.write();
        let before = rooms.len();
        rooms.retain(|_, room| !room.retire_if_expired(&self.config.retention, now));
        let removed = before - rooms.len();
        drop(rooms);

        if removed > 0 {
            self.counters
                .rooms_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, "Swept idle rooms");
        }
        removed
    }

    fn remove_if_expired(&self, room: &Arc<Room>, now: Instant) {
        // Registry lock first, then the room lock inside retire_if_expired.
        let mut rooms = self.rooms.write();
        if !room.retire_if_expired(&self.config.retention, now) {
            return;
        }
        let registered = rooms
            .get(&room.id)
            .is_some_and(|current| Arc::ptr_eq(current, room));
        if registered {
            rooms.remove(&room.id);
            self.counters.rooms_removed.fetch_add(1, Ordering::Relaxed);
            info!(room_id = %room.id, "Room removed");
        }
    }

    /// Take ownership of an upgraded connection and run it as a client of
    /// `room` until it terminates.
    ///
    /// Registers the client, spawns its send loop, runs the receive loop on
    /// the current task and unregisters the client exactly once on exit.
    pub async fn accept<C: Connection>(
        &self,
        connection: C,
        room: Arc<Room>,
    ) -> Result<SessionSummary, HubError> {
        let (client, outbound) = create_client(
            self.config.outbound_capacity,
            self.config.overflow,
            self.shutdown.child_token(),
        );
        let (mut writer, reader) = connection.split();

        if let Err(e) = self.register(&client, &room) {
            client.close(CloseReason::RoomUnavailable);
            client.finish();
            if let Err(close_err) = writer.close().await {
                debug!(client_id = %client.id, error = %close_err, "Close after rejected join failed");
            }
            warn!(client_id = %client.id, room_id = %room.id, error = %e, "Client rejected");
            return Err(e);
        }

        info!(client_id = %client.id, room_id = %room.id, "Client joined room");

        let session = self.run_session(client, room, writer, reader, outbound);
        Ok(self.sessions.track_future(session).await)
    }

    async fn run_session<W: FrameWriter, R: FrameReader>(
        &self,
        client: Arc<Client>,
        room: Arc<Room>,
        writer: W,
        reader: R,
        outbound: ClientReceiver,
    ) -> SessionSummary {
        let send_task = tokio::spawn(send_loop(
            client.clone(),
            writer,
            outbound,
            self.config.drain_timeout(),
        ));

        let tally = self.receive_loop(&client, &room, reader).await;

        // The receive loop either recorded its own reason or was cancelled
        // by the hub.
        client.close(CloseReason::Shutdown);
        if let Err(e) = send_task.await {
            warn!(client_id = %client.id, error = %e, "Send loop aborted");
        }

        let reason = client.close_reason().unwrap_or(CloseReason::Shutdown);
        if client.finish() {
            self.unregister(&client, &room);
        }

        let duration = client.connected_at().elapsed();
        info!(
            client_id = %client.id,
            room_id = %room.id,
            reason = %reason,
            received = tally.received,
            dropped = tally.dropped,
            duration_ms = duration.as_millis() as u64,
            "Client left room"
        );

        SessionSummary {
            client_id: client.id.clone(),
            room_id: room.id.clone(),
            reason,
            received: tally.received,
            delivered: tally.delivered,
            dropped: tally.dropped,
            duration,
        }
    }

    async fn receive_loop<R: FrameReader>(
        &self,
        client: &Arc<Client>,
        room: &Room,
        mut reader: R,
    ) -> Tally {
        let mut tally = Tally::default();

        loop {
            let frame = tokio::select! {
                biased;
                _ = client.cancelled() => break,
                frame = reader.recv() => frame,
            };

            match frame {
                Some(Ok(Frame::Message(message))) => {
                    let report = room.broadcast(&client.id, &message);
                    tally.received += 1;
                    tally.delivered += report.delivered as u64;
                    tally.dropped += report.dropped as u64;

                    self.counters
                        .messages_received
                        .fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .messages_delivered
                        .fetch_add(report.delivered as u64, Ordering::Relaxed);
                    self.counters
                        .messages_dropped
                        .fetch_add(report.dropped as u64, Ordering::Relaxed);

                    trace!(
                        client_id = %client.id,
                        bytes = message.len(),
                        delivered = report.delivered,
                        dropped = report.dropped,
                        "Message relayed"
                    );
                }
                Some(Ok(Frame::Close)) | None => {
                    client.close(CloseReason::PeerClosed);
                    break;
                }
                Some(Err(e)) => {
                    debug!(client_id = %client.id, error = %e, "Read failed");
                    client.close(CloseReason::ReadError);
                    break;
                }
            }
        }

        tally
    }

    /// Stop admitting clients, signal every session to close, and wait up
    /// to `grace` for them to finish. Returns `true` if all sessions ended
    /// in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!(
            sessions = self.sessions.len(),
            grace_ms = grace.as_millis() as u64,
            "Hub shutting down"
        );
        self.shutdown.cancel();
        self.sessions.close();

        let finished = tokio::time::timeout(grace, self.sessions.wait())
            .await
            .is_ok();
        if !finished {
            warn!(
                remaining = self.sessions.len(),
                "Sessions still open after grace period"
            );
        }
        finished
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of registered rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Number of clients currently joined to a room.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Snapshot of every registered room.
    pub fn rooms(&self) -> Vec<RoomInfo> {
        self.rooms.read().values().map(|room| room.info()).collect()
    }

    /// Get hub statistics.
    pub fn stats(&self) -> HubStats {
        HubStats {
            current_rooms: self.room_count(),
            current_clients: self.client_count(),
            rooms_created: self.counters.rooms_created.load(Ordering::Relaxed),
            rooms_removed: self.counters.rooms_removed.load(Ordering::Relaxed),
            total_clients: self.counters.total_clients.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            messages_delivered: self.counters.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.counters.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Drain a client's outbound queue into its connection until the client
/// closes, then flush what is left within `drain_timeout` and close the
/// stream.
async fn send_loop<W: FrameWriter>(
    client: Arc<Client>,
    mut writer: W,
    mut outbound: ClientReceiver,
    drain_timeout: Duration,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = client.cancelled() => break,
            message = outbound.recv() => message,
        };
        let Some(message) = message else {
            break;
        };

        let result = tokio::select! {
            biased;
            _ = client.cancelled() => break,
            result = writer.send(message) => result,
        };
        if let Err(e) = result {
            debug!(client_id = %client.id, error = %e, "Write failed");
            client.close(CloseReason::WriteError);
            if let Err(e) = writer.close().await {
                debug!(client_id = %client.id, error = %e, "Close after write failure failed");
            }
            return;
        }
    }

    outbound.close();
    let drain = async {
        while let Some(message) = outbound.recv().await {
            writer.send(message).await?;
        }
        Ok::<_, ConnectionError>(())
    };
    match tokio::time::timeout(drain_timeout, drain).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(client_id = %client.id, error = %e, "Write failed while draining"),
        Err(_) => debug!(client_id = %client.id, "Drain timed out, forcing close"),
    }

    if let Err(e) = writer.close().await {
        debug!(client_id = %client.id, error = %e, "Close failed");
    }
}
