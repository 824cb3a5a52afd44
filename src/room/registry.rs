//! Process-wide home for Room Actors (Design Note "Actor pattern"): exactly
//! one instance per `room_id`, looked up through a sharded concurrent map so
//! unrelated rooms never contend on the same lock (spec §5).

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};

use crate::agent::AgentOrchestrator;
use crate::config::Config;
use crate::db::Db;
use crate::domain::room::RoomId;
use crate::ledger::CreditLedger;
use crate::media::MediaTokenMinter;
use crate::payment::PaymentGate;

use super::state::Room;

/// The shared collaborators every Room Actor needs (spec §4 data flow:
/// Room Actor → Ledger, Media Minter, Payment-Gate, tabular store). Cheap to
/// clone — every field is an `Arc`.
#[derive(Clone)]
pub struct RoomServices {
    pub db: Db,
    pub config: Arc<Config>,
    pub ledger: Arc<CreditLedger>,
    pub media: Arc<MediaTokenMinter>,
    pub payment: Arc<PaymentGate>,
    pub agent: Arc<dyn AgentOrchestrator>,
}

/// One entry per live room. `notify` wakes (or cancels) the per-room
/// heartbeat task, analogous to the teacher's `shutdown_tx` broadcast
/// channel on a long-running session.
pub struct RoomHandle {
    pub room_id: RoomId,
    pub state: Mutex<Room>,
    pub notify: Notify,
    pub heartbeat_started: std::sync::atomic::AtomicBool,
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, Arc<RoomHandle>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<RoomHandle>> {
        self.rooms.get(room_id).map(|entry| entry.clone())
    }

    /// Like `get`, but on a miss falls back to loading the room's durable
    /// row (and its still-present participants) from the tabular store and
    /// installing it, so a process restart doesn't strand rooms that were
    /// `init`ed before the restart (spec SPEC_FULL §3 durability; spec §8
    /// scenario 5: "Reboot the service: V's entitlement persists; next
    /// `GET /replay` → 200" requires the room itself to still be reachable).
    /// Returns `None` only if no row exists for `room_id` at all.
    pub async fn get_or_rehydrate(&self, db: &Db, room_id: &str) -> Result<Option<Arc<RoomHandle>>> {
        if let Some(existing) = self.get(room_id) {
            return Ok(Some(existing));
        }

        let Some(room) = Room::load(db, room_id).await? else {
            return Ok(None);
        };

        let handle = Arc::new(RoomHandle {
            room_id: room_id.to_string(),
            state: Mutex::new(room),
            notify: Notify::new(),
            heartbeat_started: std::sync::atomic::AtomicBool::new(false),
        });

        let handle = match self.rooms.entry(room_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                handle
            }
        };
        Ok(Some(handle))
    }

    /// Idempotent: returns the existing handle if one is already installed,
    /// otherwise installs `room` and returns the new handle plus `true`.
    pub fn get_or_install(&self, room_id: RoomId, room: Room) -> (Arc<RoomHandle>, bool) {
        if let Some(existing) = self.rooms.get(&room_id) {
            return (existing.clone(), false);
        }
        let handle = Arc::new(RoomHandle {
            room_id: room_id.clone(),
            state: Mutex::new(room),
            notify: Notify::new(),
            heartbeat_started: std::sync::atomic::AtomicBool::new(false),
        });
        match self.rooms.entry(room_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                (handle, true)
            }
        }
    }

    pub fn remove(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
