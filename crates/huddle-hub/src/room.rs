//! Rooms and broadcast fan-out.

use crate::client::{Client, ClientId, Delivery};
use crate::connection::Message;
use crate::error::HubError;
use crate::policy::RoomRetention;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Unique identifier for a room. Used as the external routing key.
pub type RoomId = String;

#[derive(Debug)]
struct Members {
    clients: HashMap<ClientId, Arc<Client>>,
    /// Set once the hub has removed the room; joins are refused afterwards.
    retired: bool,
    empty_since: Option<Instant>,
}

/// A named set of joined clients.
#[derive(Debug)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    members: RwLock<Members>,
    created_at: Instant,
}

/// Result of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients whose queue accepted the message.
    pub delivered: usize,
    /// Recipients whose queue was full.
    pub dropped: usize,
    /// Recipients that were already closing.
    pub skipped: usize,
}

/// Snapshot of a room for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    /// Room identifier.
    pub id: RoomId,
    /// Number of joined clients.
    pub members: usize,
    /// Seconds since creation.
    pub age_secs: u64,
}

impl Room {
    pub(crate) fn new(id: RoomId) -> Self {
        let now = Instant::now();
        Self {
            id,
            members: RwLock::new(Members {
                clients: HashMap::new(),
                retired: false,
                empty_since: Some(now),
            }),
            created_at: now,
        }
    }

    /// Add a client. Fails if the hub already removed this room or the
    /// client is already a member.
    pub fn join(&self, client: Arc<Client>) -> Result<(), HubError> {
        let mut members = self.members.write();
        if members.retired {
            return Err(HubError::InvalidRoom(self.id.clone()));
        }
        match members.clients.entry(client.id.clone()) {
            Entry::Occupied(_) => return Err(HubError::AlreadyRegistered(client.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(client);
            }
        }
        members.empty_since = None;
        Ok(())
    }

    /// Remove a client. Returns the remaining member count, or `None` if the
    /// client was not a member.
    pub fn leave(&self, client_id: &str) -> Option<usize> {
        let mut members = self.members.write();
        members.clients.remove(client_id)?;

        let remaining = members.clients.len();
        if remaining == 0 {
            members.empty_since = Some(Instant::now());
        }
        Some(remaining)
    }

    /// Deliver `message` to every member except `sender`.
    ///
    /// Never waits on a recipient: each one gets a non-blocking enqueue, so
    /// a full or closed queue only affects that recipient.
    pub fn broadcast(&self, sender: &str, message: &Message) -> BroadcastReport {
        let members = self.members.read();
        let mut report = BroadcastReport::default();

        for (id, client) in members.clients.iter() {
            if id == sender {
                continue;
            }
            match client.enqueue(message.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Rejected => report.skipped += 1,
            }
        }
        report
    }

    /// Retire the room if it is empty and the policy says it should go.
    pub(crate) fn retire_if_expired(&self, retention: &RoomRetention, now: Instant) -> bool {
        let mut members = self.members.write();
        if members.retired {
            return true;
        }
        if !members.clients.is_empty() {
            return false;
        }
        if retention.should_remove(members.empty_since, now) {
            members.retired = true;
        }
        members.retired
    }

    /// Number of joined clients.
    pub fn member_count(&self) -> usize {
        self.members.read().clients.len()
    }

    /// Whether a client is currently joined.
    pub fn contains(&self, client_id: &str) -> bool {
        self.members.read().clients.contains_key(client_id)
    }

    /// Whether the hub has removed this room.
    pub fn is_retired(&self) -> bool {
        self.members.read().retired
    }

    /// When the room last became empty, if it is empty.
    pub fn empty_since(&self) -> Option<Instant> {
        self.members.read().empty_since
    }

    /// Reporting snapshot.
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            members: self.member_count(),
            age_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{create_client, ClientReceiver, CloseReason, OverflowPolicy};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn client(capacity: usize) -> (Arc<Client>, ClientReceiver) {
        create_client(capacity, OverflowPolicy::DropNewest, CancellationToken::new())
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let room = Room::new("r1".to_string());
        let (a, mut rx_a) = client(8);
        let (b, mut rx_b) = client(8);
        let (c, mut rx_c) = client(8);
        room.join(a.clone()).unwrap();
        room.join(b).unwrap();
        room.join(c).unwrap();

        let report = room.broadcast(&a.id, &Message::from("msg"));
        assert_eq!(report.delivered, 2);

        assert_eq!(rx_b.try_recv().unwrap(), Message::from("msg"));
        assert_eq!(rx_c.try_recv().unwrap(), Message::from("msg"));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_join_and_leave() {
        let room = Room::new("r1".to_string());
        let (a, _rx) = client(8);

        room.join(a.clone()).unwrap();
        assert!(room.contains(&a.id));
        assert_eq!(room.member_count(), 1);
        assert!(room.empty_since().is_none());

        assert_eq!(room.leave(&a.id), Some(0));
        assert!(room.empty_since().is_some());
        assert_eq!(room.leave(&a.id), None);
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn test_full_recipient_does_not_block_others() {
        let room = Room::new("r1".to_string());
        let (sender, _rx_s) = client(8);
        let (slow, _rx_slow) = client(1);
        let (fast, mut rx_fast) = client(8);
        room.join(sender.clone()).unwrap();
        room.join(slow).unwrap();
        room.join(fast).unwrap();

        room.broadcast(&sender.id, &Message::from("1"));
        let report = room.broadcast(&sender.id, &Message::from("2"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(rx_fast.try_recv().unwrap(), Message::from("1"));
        assert_eq!(rx_fast.try_recv().unwrap(), Message::from("2"));
    }

    #[test]
    fn test_closing_member_is_skipped() {
        let room = Room::new("r1".to_string());
        let (a, _rx_a) = client(8);
        let (b, mut rx_b) = client(8);
        room.join(a.clone()).unwrap();
        room.join(b.clone()).unwrap();

        b.close(CloseReason::PeerClosed);
        let report = room.broadcast(&a.id, &Message::from("x"));

        assert_eq!(report.skipped, 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_retired_room_refuses_join() {
        let room = Room::new("r1".to_string());
        assert!(room.retire_if_expired(&RoomRetention::RemoveWhenEmpty, Instant::now()));
        assert!(room.is_retired());

        let (a, _rx) = client(8);
        assert!(matches!(room.join(a), Err(HubError::InvalidRoom(id)) if id == "r1"));
    }

    #[test]
    fn test_duplicate_join_is_refused() {
        let room = Room::new("r1".to_string());
        let (a, _rx) = client(8);
        room.join(a.clone()).unwrap();

        assert!(matches!(
            room.join(a.clone()),
            Err(HubError::AlreadyRegistered(id)) if id == a.id
        ));
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.leave(&a.id), Some(0));
    }

    #[test]
    fn test_occupied_room_is_not_retired() {
        let room = Room::new("r1".to_string());
        let (a, _rx) = client(8);
        room.join(a).unwrap();

        assert!(!room.retire_if_expired(&RoomRetention::RemoveWhenEmpty, Instant::now()));
        assert!(!room.is_retired());
    }

    #[test]
    fn test_retention_ttl_applies_to_empty_room() {
        let room = Room::new("r1".to_string());
        let policy = RoomRetention::RetainFor {
            ttl: Duration::from_secs(60),
        };
        let now = Instant::now();

        assert!(!room.retire_if_expired(&policy, now));
        assert!(room.retire_if_expired(&policy, now + Duration::from_secs(61)));
    }

    #[test]
    fn test_room_info() {
        let room = Room::new("r1".to_string());
        let (a, _rx) = client(8);
        room.join(a).unwrap();

        let info = room.info();
        assert_eq!(info.id, "r1");
        assert_eq!(info.members, 1);
    }
}
