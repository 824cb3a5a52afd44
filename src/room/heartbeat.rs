//! The per-room alarm (spec §4.5 "Heartbeat / alarm"). One `tokio::spawn`ed
//! task per live free room, started on the `0 → 1` participant transition
//! and torn down once the room empties — the same per-task
//! `tokio::select!` between a timer and a cancellation signal used by the
//! teacher's daemon loop, generalized from one global loop to one per room.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{info, warn};

use crate::config;
use crate::domain::now;

use super::registry::{RoomHandle, RoomServices};

pub fn ensure_started(handle: Arc<RoomHandle>, services: RoomServices) {
    if handle
        .heartbeat_started
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        run(handle, services).await;
    });
}

async fn run(handle: Arc<RoomHandle>, services: RoomServices) {
    loop {
        let sleep = tokio::time::sleep(Duration::from_secs(config::HEARTBEAT_INTERVAL_SECONDS));
        tokio::select! {
            _ = sleep => {}
            _ = handle.notify.notified() => {
                if room_is_gone_or_empty(&handle).await {
                    handle.heartbeat_started.store(false, Ordering::SeqCst);
                    return;
                }
                continue;
            }
        }

        if !tick(&handle, &services).await {
            handle.heartbeat_started.store(false, Ordering::SeqCst);
            return;
        }
    }
}

async fn room_is_gone_or_empty(handle: &Arc<RoomHandle>) -> bool {
    let room = handle.state.lock().await;
    room.participants.is_empty() || room.record.status.is_terminal()
}

/// One alarm fire. Returns `false` when the room is done and the loop
/// should stop rescheduling itself.
async fn tick(handle: &Arc<RoomHandle>, services: &RoomServices) -> bool {
    let mut room = handle.state.lock().await;

    if room.participants.is_empty() {
        room.record.status = crate::domain::room::RoomStatus::Closed;
        room.record.closed_at = Some(now());
        if let Err(err) = room.persist(&services.db).await {
            warn!(room_id = %room.record.room_id, %err, "failed to persist closed room");
        }
        stop_agent_if_running(&mut room, services).await;
        return false;
    }

    let stale_after = (3 * config::HEARTBEAT_INTERVAL_SECONDS) as i64;
    let stale: Vec<String> = room
        .participants
        .values()
        .filter(|p| now() - p.last_metered_at >= stale_after)
        .map(|p| p.connection_id.clone())
        .collect();

    for connection_id in &stale {
        if let Err(err) = room.meter(&services.ledger, connection_id, config::CREDITS_LOW_THRESHOLD).await {
            warn!(room_id = %room.record.room_id, connection_id, %err, "failed to meter evicted participant");
        }
        room.mark_left(connection_id);
        if let Err(err) = room.mark_participant_left_in_store(&services.db, connection_id).await {
            warn!(room_id = %room.record.room_id, connection_id, %err, "failed to record eviction");
        }
        info!(room_id = %room.record.room_id, connection_id, "evicted stale participant");
    }

    let live: Vec<String> = room.participants.keys().cloned().collect();
    for connection_id in &live {
        if let Err(err) = room.meter(&services.ledger, connection_id, config::CREDITS_LOW_THRESHOLD).await {
            warn!(room_id = %room.record.room_id, connection_id, %err, "metering failed, will retry next tick");
        }
    }

    if let Err(err) = room.persist(&services.db).await {
        warn!(room_id = %room.record.room_id, %err, "failed to persist room state");
    }

    if room.participants.is_empty() {
        room.record.status = crate::domain::room::RoomStatus::Closed;
        room.record.closed_at = Some(now());
        let _ = room.persist(&services.db).await;
        stop_agent_if_running(&mut room, services).await;
        return false;
    }

    true
}

/// Mirrors `actor::stop_agent`, inlined here since the alarm tick already
/// holds the room lock (spec §4.5 "stops the AI agent" on the evict-to-empty
/// path, same as an explicit `leave`/`close`).
async fn stop_agent_if_running(room: &mut super::state::Room, services: &RoomServices) {
    if let Some(agent_id) = room.agent_id.take() {
        if let Err(err) = services.agent.stop(&agent_id) {
            warn!(agent_id, %err, "AI-agent stop failed");
        }
    }
}
