//! Room retention policy.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Decides when an empty room is removed from the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoomRetention {
    /// Remove a room as soon as its last member leaves. Rooms that were
    /// never joined are kept.
    #[default]
    RemoveWhenEmpty,
    /// Keep an empty room for this long, then let [`Hub::sweep`] remove it.
    ///
    /// [`Hub::sweep`]: crate::Hub::sweep
    RetainFor {
        #[serde(with = "secs")]
        ttl: Duration,
    },
}

impl RoomRetention {
    /// Whether a room that became empty at `empty_since` should go now.
    /// `None` means the room has members.
    pub fn should_remove(&self, empty_since: Option<Instant>, now: Instant) -> bool {
        let Some(since) = empty_since else {
            return false;
        };
        match self {
            RoomRetention::RemoveWhenEmpty => true,
            RoomRetention::RetainFor { ttl } => now.saturating_duration_since(since) >= *ttl,
        }
    }

    /// Whether the hub should remove rooms on the leave path itself.
    pub fn removes_on_leave(&self) -> bool {
        matches!(self, RoomRetention::RemoveWhenEmpty)
    }

    /// Whether periodic sweeping is needed.
    pub fn needs_sweep(&self) -> bool {
        matches!(self, RoomRetention::RetainFor { .. })
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
