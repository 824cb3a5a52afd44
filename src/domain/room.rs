use serde::{Deserialize, Serialize};

use super::wallet::Wallet;

pub type RoomId = String;
pub type ConnectionId = String;
pub type SegmentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Free,
    Duet,
}

/// Lifecycle states from spec §4.5. `Ended` is reserved for paid rooms after
/// an explicit host `end`; `Closed` is reserved for free rooms that emptied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Pending,
    Active,
    Closed,
    Ended,
}

impl RoomStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Closed | RoomStatus::Ended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcasterMode {
    Mic,
    Camera,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    WorkerGated,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    Enabled,
    Disabled,
}

/// A paid room advances through one or more segments (spec §3 "Segment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: SegmentId,
    pub price_live: u64,
    pub price_replay: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub wallet: Wallet,
    pub vendor_uid: u32,
    pub joined_at: i64,
    pub last_metered_at: i64,
    pub debited_seconds: i64,
    pub warned_low: bool,
    pub exhausted: bool,
}

/// The durable, kind-agnostic part of a room record. Kind-specific fields
/// live in `FreeRoomExtra` / `DuetRoomExtra` (spec Design Note "Dynamic
/// dispatch": a sum type, not inheritance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub host_wallet: Wallet,
    pub status: RoomStatus,
    pub channel: String,
    pub capacity: u32,
    pub created_at: i64,
    pub closed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuetRoomExtra {
    pub split_address: String,
    pub guest_wallet: Option<Wallet>,
    pub asset_id: String,
    pub network_id: String,
    pub live_amount: u64,
    pub replay_amount: u64,
    pub access_window_minutes: u32,
    pub replay_mode: ReplayMode,
    pub recording_mode: RecordingMode,
    pub bridge_ticket: Option<String>,
    pub broadcaster_online: bool,
    pub broadcaster_mode: BroadcasterMode,
    pub last_beat: Option<i64>,
    pub ended_at: Option<i64>,
    pub replay_blob_ref: Option<String>,
    pub current_segment: Option<Segment>,
    pub attested_at: Option<i64>,
}

impl Default for DuetRoomExtra {
    fn default() -> Self {
        DuetRoomExtra {
            split_address: String::new(),
            guest_wallet: None,
            asset_id: String::new(),
            network_id: String::new(),
            live_amount: 0,
            replay_amount: 0,
            access_window_minutes: 60,
            replay_mode: ReplayMode::WorkerGated,
            recording_mode: RecordingMode::Disabled,
            bridge_ticket: None,
            broadcaster_online: false,
            broadcaster_mode: BroadcasterMode::Mic,
            last_beat: None,
            ended_at: None,
            replay_blob_ref: None,
            current_segment: None,
            attested_at: None,
        }
    }
}
