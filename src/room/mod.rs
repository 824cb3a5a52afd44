//! Room Actor (C5, spec §4.5): the heart of the system. Exactly one live
//! instance per `room_id`, housed in the process-wide `RoomRegistry`.

pub mod actor;
pub mod duet;
pub mod free;
pub mod heartbeat;
pub mod registry;
pub mod state;

pub use actor::{HeartbeatOutcome, JoinOutcome, PublicInfo, RenewOutcome, RoomError, RoomStateView};
pub use registry::{RoomHandle, RoomRegistry, RoomServices};
pub use state::{Event, Room, RoomDescriptor};
