//! Match room membership tracking.
//!
//! The connection task keeps one tracker for the lifetime of the channel
//! task, so memberships survive transient drops and drive the explicit
//! rejoin after a reconnect.

use std::collections::HashMap;

use tracing::debug;

use unveil_shared::types::MatchId;

/// Membership record for one match room.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub match_id: MatchId,
    /// When the room was joined (Unix epoch millis).
    pub joined_at: u64,
}

/// Tracks the rooms this connection has joined.
#[derive(Debug, Clone)]
pub struct RoomTracker {
    rooms: HashMap<MatchId, RoomInfo>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Record a joined room. Joining a room twice keeps the original
    /// membership record.
    pub fn on_joined(&mut self, match_id: MatchId) {
        if self.rooms.contains_key(&match_id) {
            return;
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        debug!(room = %match_id, "Tracking room membership");
        self.rooms.insert(
            match_id.clone(),
            RoomInfo {
                match_id,
                joined_at: now,
            },
        );
    }

    /// Remove a membership after leaving a room.
    pub fn on_left(&mut self, match_id: &MatchId) {
        if self.rooms.remove(match_id).is_some() {
            debug!(room = %match_id, "Removed room membership");
        }
    }

    pub fn is_joined(&self, match_id: &MatchId) -> bool {
        self.rooms.contains_key(match_id)
    }

    /// All currently joined rooms; the rejoin list after a reconnect.
    pub fn joined_rooms(&self) -> Vec<MatchId> {
        self.rooms.keys().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Forget every membership. Used on channel teardown.
    pub fn clear(&mut self) {
        if !self.rooms.is_empty() {
            debug!(total = self.rooms.len(), "Clearing room memberships");
        }
        self.rooms.clear();
    }
}

impl Default for RoomTracker {
    fn default() -> Self {
        Self::new()
    }
}
