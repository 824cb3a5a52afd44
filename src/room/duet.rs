//! Duet (paid) room descriptor construction. The payment-gated,
//! no-per-second-billing room kind (spec GLOSSARY "Paid (duet) room").

use crate::domain::room::{BroadcasterMode, DuetRoomExtra, RecordingMode, ReplayMode, RoomKind};
use crate::domain::Wallet;

use super::state::RoomDescriptor;

pub struct DuetParams {
    pub split_address: String,
    pub asset_id: String,
    pub network_id: String,
    pub live_amount: u64,
    pub replay_amount: u64,
    pub access_window_minutes: u32,
    pub replay_mode: ReplayMode,
    pub recording_mode: RecordingMode,
}

pub fn descriptor(room_id: String, host_wallet: Wallet, channel: String, capacity: u32, params: DuetParams) -> RoomDescriptor {
    let extra = DuetRoomExtra {
        split_address: params.split_address,
        guest_wallet: None,
        asset_id: params.asset_id,
        network_id: params.network_id,
        live_amount: params.live_amount,
        replay_amount: params.replay_amount,
        access_window_minutes: params.access_window_minutes,
        replay_mode: params.replay_mode,
        recording_mode: params.recording_mode,
        bridge_ticket: None,
        broadcaster_online: false,
        broadcaster_mode: BroadcasterMode::Mic,
        last_beat: None,
        ended_at: None,
        replay_blob_ref: None,
        current_segment: None,
        attested_at: None,
    };
    RoomDescriptor {
        room_id,
        kind: RoomKind::Duet,
        host_wallet,
        channel,
        capacity,
        duet_extra: Some(extra),
    }
}
