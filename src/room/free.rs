//! Free-room descriptor construction. Free rooms have no paid-room extra
//! state and are metered per participant by the shared actor logic in
//! `actor.rs` (Design Note "Dynamic dispatch": one `Room` sum type, not a
//! `FreeRoom`/`DuetRoom` class hierarchy).

use crate::domain::room::RoomKind;
use crate::domain::Wallet;

use super::state::RoomDescriptor;

pub fn descriptor(room_id: String, host_wallet: Wallet, channel: String, capacity: u32) -> RoomDescriptor {
    RoomDescriptor {
        room_id,
        kind: RoomKind::Free,
        host_wallet,
        channel,
        capacity,
        duet_extra: None,
    }
}
