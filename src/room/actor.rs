//! Room Actor (C5, spec §4.5): exactly one live instance per `room_id`,
//! single-mutator (the `Mutex<Room>` on `RoomHandle` is the mutator lock),
//! owning the room's durable state and its scheduled alarm.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::config;
use crate::domain::entitlement::EntitlementScope;
use crate::domain::room::{BroadcasterMode, Participant, RoomKind, RoomStatus, Segment};
use crate::domain::{Wallet, now};
use crate::payment::PaymentGate;

use super::heartbeat;
use super::registry::{RoomHandle, RoomServices};
use super::state::{Event, Room, RoomDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room_full")]
    RoomFull,
    #[error("room_not_live")]
    RoomNotLive,
    #[error("already_initialized")]
    AlreadyInitialized,
    #[error("participant_not_found")]
    ParticipantNotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("payment_required")]
    PaymentRequired,
    #[error("invalid_payment_signature")]
    InvalidPaymentSignature,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub token: String,
    pub ttl: u64,
    pub heartbeat_interval: Option<u64>,
    pub renew_after: Option<u64>,
    pub remaining: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatOutcome {
    pub remaining: i64,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone)]
pub enum RenewOutcome {
    Granted { token: String, ttl: u64, remaining: i64, events: Vec<Event> },
    Denied { reason: &'static str },
}

fn vendor_uid(connection_id: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(connection_id.as_bytes());
    hasher.finalize()
}

/// `init(room_descriptor)` (spec §4.5) — idempotent, first call wins.
pub async fn init(
    registry: &super::registry::RoomRegistry,
    descriptor: RoomDescriptor,
) -> Result<(Arc<RoomHandle>, bool), RoomError> {
    let room_id = descriptor.room_id.clone();
    let room = Room::new(descriptor);
    let (handle, installed) = registry.get_or_install(room_id, room);
    if !installed {
        return Err(RoomError::AlreadyInitialized);
    }
    Ok((handle, installed))
}

pub async fn join(
    handle: &Arc<RoomHandle>,
    services: &RoomServices,
    connection_id: String,
    wallet: Wallet,
) -> Result<JoinOutcome, RoomError> {
    let mut room = handle.state.lock().await;

    if room.record.status.is_terminal() {
        return Err(RoomError::RoomNotLive);
    }
    if room.is_full() {
        return Err(RoomError::RoomFull);
    }

    let was_empty = room.participants.is_empty();
    let uid = vendor_uid(&connection_id);

    room.participants.insert(
        connection_id.clone(),
        Participant {
            connection_id: connection_id.clone(),
            wallet: wallet.clone(),
            vendor_uid: uid,
            joined_at: now(),
            last_metered_at: now(),
            debited_seconds: 0,
            warned_low: false,
            exhausted: false,
        },
    );
    if room.record.status == RoomStatus::Pending {
        room.record.status = RoomStatus::Active;
    }

    let outcome = match room.record.kind {
        RoomKind::Free => {
            let media = services.media.short_token(&room.record.channel, uid);
            let balance = services.ledger.get_balance(&wallet).await?;
            JoinOutcome {
                token: media.token,
                ttl: media.expires_in_seconds,
                heartbeat_interval: Some(config::HEARTBEAT_INTERVAL_SECONDS),
                renew_after: Some(config::TOKEN_RENEW_AFTER_SECONDS),
                remaining: Some(balance.remaining_seconds),
            }
        }
        RoomKind::Duet => {
            let media = services.media.booked_token(&room.record.channel, uid);
            JoinOutcome {
                token: media.token,
                ttl: media.expires_in_seconds,
                heartbeat_interval: None,
                renew_after: None,
                remaining: None,
            }
        }
    };

    room.persist(&services.db).await?;
    drop(room);

    if was_empty {
        start_agent(handle, services).await;
        if matches!(handle_kind(handle).await, RoomKind::Free) {
            heartbeat::ensure_started(handle.clone(), services.clone());
        }
    }

    Ok(outcome)
}

/// Starts the AI-agent sidecar on the `0 → 1` participant transition (spec
/// §4.5). A start failure is logged, not propagated: the join itself has
/// already persisted and must not be undone for an external collaborator's
/// sake (spec §7 "External errors ... do not tear down the room").
async fn start_agent(handle: &Arc<RoomHandle>, services: &RoomServices) {
    let channel = handle.state.lock().await.record.channel.clone();
    match services.agent.start(&channel) {
        Ok(agent_id) if !agent_id.is_empty() => {
            handle.state.lock().await.agent_id = Some(agent_id);
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(channel, %err, "AI-agent start failed"),
    }
}

/// Stops the AI-agent sidecar, if one is running, once a room empties
/// (spec §4.5 `leave`/`close`).
async fn stop_agent(handle: &Arc<RoomHandle>, services: &RoomServices) {
    let agent_id = handle.state.lock().await.agent_id.take();
    if let Some(agent_id) = agent_id {
        if let Err(err) = services.agent.stop(&agent_id) {
            tracing::warn!(agent_id, %err, "AI-agent stop failed");
        }
    }
}

async fn handle_kind(handle: &Arc<RoomHandle>) -> RoomKind {
    handle.state.lock().await.record.kind
}

/// Resumes the heartbeat alarm for a rehydrated free room that still has
/// live participants (spec §4.5 "Schedules the heartbeat alarm ... if not
/// already scheduled"). A no-op for duet rooms and for rooms whose alarm is
/// already running. Called after `RoomRegistry::get_or_rehydrate` installs
/// a room loaded from the tabular store, since `join`'s own `0 → 1` trigger
/// never fires for a room that already had participants before the restart.
pub async fn resume_if_needed(handle: &Arc<RoomHandle>, services: &RoomServices) {
    let room = handle.state.lock().await;
    let should_resume = room.record.kind == RoomKind::Free
        && !room.record.status.is_terminal()
        && !room.participants.is_empty();
    drop(room);

    if should_resume {
        heartbeat::ensure_started(handle.clone(), services.clone());
    }
}

pub async fn heartbeat(
    handle: &Arc<RoomHandle>,
    services: &RoomServices,
    connection_id: &str,
) -> Result<HeartbeatOutcome, RoomError> {
    let mut room = handle.state.lock().await;
    if !room.participants.contains_key(connection_id) {
        return Err(RoomError::ParticipantNotFound);
    }
    let (_, remaining, events) = room
        .meter(&services.ledger, connection_id, config::CREDITS_LOW_THRESHOLD)
        .await?;
    room.persist(&services.db).await?;
    Ok(HeartbeatOutcome { remaining, events })
}

pub async fn renew(
    handle: &Arc<RoomHandle>,
    services: &RoomServices,
    connection_id: &str,
) -> Result<RenewOutcome, RoomError> {
    let mut room = handle.state.lock().await;
    if !room.participants.contains_key(connection_id) {
        return Err(RoomError::ParticipantNotFound);
    }
    let (_, remaining, events) = room
        .meter(&services.ledger, connection_id, config::CREDITS_LOW_THRESHOLD)
        .await?;

    if room.record.kind == RoomKind::Free && remaining < config::RENEW_MIN_SECONDS {
        room.persist(&services.db).await?;
        return Ok(RenewOutcome::Denied { reason: "credits_exhausted" });
    }

    let uid = room.participants.get(connection_id).map(|p| p.vendor_uid).unwrap_or_default();
    let media = match room.record.kind {
        RoomKind::Free => services.media.short_token(&room.record.channel, uid),
        RoomKind::Duet => services.media.booked_token(&room.record.channel, uid),
    };
    room.persist(&services.db).await?;

    Ok(RenewOutcome::Granted {
        token: media.token,
        ttl: media.expires_in_seconds,
        remaining,
        events,
    })
}

pub async fn leave(handle: &Arc<RoomHandle>, services: &RoomServices, connection_id: &str) -> Result<(), RoomError> {
    let mut room = handle.state.lock().await;
    if room.participants.contains_key(connection_id) {
        room.meter(&services.ledger, connection_id, config::CREDITS_LOW_THRESHOLD).await?;
    }
    room.mark_left(connection_id);
    room.mark_participant_left_in_store(&services.db, connection_id).await?;

    let became_empty = room.participants.is_empty();
    if became_empty && room.record.kind == RoomKind::Free {
        room.record.status = RoomStatus::Closed;
        room.record.closed_at = Some(now());
    }
    room.persist(&services.db).await?;
    drop(room);

    if became_empty {
        stop_agent(handle, services).await;
        handle.notify.notify_waiters();
    }
    Ok(())
}

/// `close(host_connection_id)` — host-only, meters everyone, ends the room.
pub async fn close(handle: &Arc<RoomHandle>, services: &RoomServices, host_wallet: &Wallet) -> Result<(), RoomError> {
    let mut room = handle.state.lock().await;
    if &room.record.host_wallet != host_wallet {
        return Err(RoomError::Unauthorized);
    }

    let connection_ids: Vec<String> = room.participants.keys().cloned().collect();
    for connection_id in &connection_ids {
        room.meter(&services.ledger, connection_id, config::CREDITS_LOW_THRESHOLD).await?;
        room.mark_participant_left_in_store(&services.db, connection_id).await?;
    }
    room.participants.clear();
    room.record.status = RoomStatus::Closed;
    room.record.closed_at = Some(now());
    room.persist(&services.db).await?;
    drop(room);

    stop_agent(handle, services).await;
    handle.notify.notify_waiters();
    Ok(())
}

/// `destroy()` — emergency cleanup; no ledger side effects (prior debits
/// stand, per spec §4.5).
pub async fn destroy(handle: &Arc<RoomHandle>, registry: &super::registry::RoomRegistry) {
    handle.notify.notify_waiters();
    registry.remove(&handle.room_id);
}

pub struct RoomStateView {
    pub room_id: String,
    pub kind: RoomKind,
    pub status: RoomStatus,
    pub participant_count: usize,
}

pub async fn state(handle: &Arc<RoomHandle>) -> RoomStateView {
    let room = handle.state.lock().await;
    RoomStateView {
        room_id: room.record.room_id.clone(),
        kind: room.record.kind,
        status: room.record.status,
        participant_count: room.participants.len(),
    }
}

// ---- Paid (duet) room operations (spec §4.5 "Operations (paid-room only)") ----

/// `start()` — host-only. Idempotent while the room is live: a second call
/// against an already-active bridge ticket just hands the same ticket back.
/// Called again after `end()`, it re-segments instead: a fresh
/// `bridge_ticket` and `segment_id` are minted, so a prior segment's
/// entitlement stops covering `enter`/`replay` (spec §8 scenario 3: host
/// re-segmentation → new `segment_id` → prior entitlement 402). Resetting
/// `attested_at` means the ended first segment's attestation sweep doesn't
/// get mistaken for covering the new one.
pub async fn start(handle: &Arc<RoomHandle>, services: &RoomServices) -> Result<(String, bool), RoomError> {
    let mut room = handle.state.lock().await;
    let resuming = room.record.status.is_terminal();
    let extra = room.duet.as_mut().context("duet room missing extra state")?;

    if !resuming {
        if let Some(ticket) = &extra.bridge_ticket {
            let ticket = ticket.clone();
            return Ok((ticket, true));
        }
    }

    let ticket = format!("bridge-{}", uuid::Uuid::new_v4());
    extra.bridge_ticket = Some(ticket.clone());
    extra.current_segment = Some(Segment {
        segment_id: uuid::Uuid::new_v4().to_string(),
        price_live: extra.live_amount,
        price_replay: extra.replay_amount,
    });
    if resuming {
        extra.ended_at = None;
        extra.attested_at = None;
        extra.replay_blob_ref = None;
        extra.broadcaster_online = false;
        extra.last_beat = None;
    }
    room.record.status = RoomStatus::Active;
    room.record.closed_at = None;
    room.persist(&services.db).await?;
    Ok((ticket, false))
}

/// Verifies a `BridgeTicket`-authenticated request's ticket matches the one
/// minted for this room at `start` (spec §6: bridge-ticket auth rows).
pub async fn verify_bridge_ticket(handle: &Arc<RoomHandle>, ticket: &str) -> Result<(), RoomError> {
    let room = handle.state.lock().await;
    let extra = room.duet.as_ref().context("duet room missing extra state")?;
    match &extra.bridge_ticket {
        Some(expected) if expected == ticket => Ok(()),
        _ => Err(RoomError::Unauthorized),
    }
}

pub async fn guest_accept(handle: &Arc<RoomHandle>, services: &RoomServices, guest_wallet: Wallet) -> Result<(), RoomError> {
    let mut room = handle.state.lock().await;
    let extra = room.duet.as_mut().context("duet room missing extra state")?;
    if let Some(expected) = &extra.guest_wallet {
        if expected != &guest_wallet {
            return Err(RoomError::Unauthorized);
        }
    } else {
        extra.guest_wallet = Some(guest_wallet);
    }
    room.persist(&services.db).await?;
    Ok(())
}

pub async fn bridge_token_refresh(handle: &Arc<RoomHandle>, services: &RoomServices) -> Result<(String, u64), RoomError> {
    let room = handle.state.lock().await;
    let uid = vendor_uid(&room.record.room_id);
    let media = services.media.broadcaster_token(&room.record.channel, uid);
    Ok((media.token, media.expires_in_seconds))
}

pub async fn broadcast_heartbeat(handle: &Arc<RoomHandle>, services: &RoomServices, mode: BroadcasterMode) -> Result<(), RoomError> {
    let mut room = handle.state.lock().await;
    let extra = room.duet.as_mut().context("duet room missing extra state")?;
    extra.broadcaster_online = true;
    extra.broadcaster_mode = mode;
    extra.last_beat = Some(now());
    room.persist(&services.db).await?;
    Ok(())
}

pub struct PublicInfo {
    pub status: RoomStatus,
    pub broadcaster_online: bool,
    pub broadcaster_mode: BroadcasterMode,
    pub segment_id: Option<String>,
}

pub async fn public_info(handle: &Arc<RoomHandle>) -> Result<PublicInfo, RoomError> {
    let room = handle.state.lock().await;
    let extra = room.duet.as_ref().context("duet room missing extra state")?;

    let online = extra.broadcaster_online
        && extra
            .last_beat
            .is_some_and(|t| now() - t < (config::BROADCASTER_OFFLINE_INTERVALS * config::HEARTBEAT_INTERVAL_SECONDS) as i64);

    Ok(PublicInfo {
        status: room.record.status,
        broadcaster_online: online,
        broadcaster_mode: extra.broadcaster_mode,
        segment_id: extra.current_segment.as_ref().map(|s| s.segment_id.clone()),
    })
}

/// `enter(wallet)` / `publicEnter(wallet)` — gated by the Payment-Gate
/// (spec §4.5, §4.4). Returns a viewer vendor token on success.
pub async fn enter(
    handle: &Arc<RoomHandle>,
    services: &RoomServices,
    wallet: &Wallet,
    payment_signature_b64: Option<&str>,
) -> Result<(String, String, u64), RoomError> {
    let mut room = handle.state.lock().await;
    if room.record.status.is_terminal() {
        return Err(RoomError::RoomNotLive);
    }
    let extra = room.duet.as_ref().context("duet room missing extra state")?.clone();
    let segment = extra.current_segment.clone().context("no active segment")?;

    let resource = PaymentGate::resource_id(room.record.kind, &room.record.room_id, "enter", &segment.segment_id);

    let already = services
        .payment
        .has_entitlement(&room.record.room_id, &segment.segment_id, wallet, EntitlementScope::Live)
        .await?;

    if !already {
        let sig = payment_signature_b64.ok_or(RoomError::PaymentRequired)?;
        services
            .payment
            .verify_and_grant(
                &room.record.room_id,
                &segment.segment_id,
                EntitlementScope::Live,
                &resource,
                wallet,
                sig,
                segment.price_live,
                &extra.asset_id,
                &extra.network_id,
                &extra.split_address,
                extra.access_window_minutes,
            )
            .await
            .map_err(|_| RoomError::InvalidPaymentSignature)?;
    }

    let uid = vendor_uid(wallet.as_str());
    let media = services.media.viewer_token(&room.record.channel, uid);
    room.persist(&services.db).await?;
    Ok((resource, media.token, media.expires_in_seconds))
}

pub async fn recording_complete(handle: &Arc<RoomHandle>, services: &RoomServices, blob_ref: String) -> Result<(), RoomError> {
    let mut room = handle.state.lock().await;
    let extra = room.duet.as_mut().context("duet room missing extra state")?;
    extra.replay_blob_ref = Some(blob_ref);
    room.persist(&services.db).await?;
    Ok(())
}

pub async fn replay(
    handle: &Arc<RoomHandle>,
    services: &RoomServices,
    wallet: &Wallet,
    payment_signature_b64: Option<&str>,
) -> Result<String, RoomError> {
    let mut room = handle.state.lock().await;
    let extra = room.duet.as_ref().context("duet room missing extra state")?.clone();
    if extra.replay_blob_ref.is_none() {
        bail!("replay not available before recording/complete");
    }
    let segment = extra.current_segment.clone().context("no segment recorded")?;
    let resource = PaymentGate::resource_id(room.record.kind, &room.record.room_id, "replay", &segment.segment_id);

    let already = services
        .payment
        .has_entitlement(&room.record.room_id, &segment.segment_id, wallet, EntitlementScope::Replay)
        .await?;

    if !already {
        let sig = payment_signature_b64.ok_or(RoomError::PaymentRequired)?;
        services
            .payment
            .verify_and_grant(
                &room.record.room_id,
                &segment.segment_id,
                EntitlementScope::Replay,
                &resource,
                wallet,
                sig,
                segment.price_replay,
                &extra.asset_id,
                &extra.network_id,
                &extra.split_address,
                extra.access_window_minutes,
            )
            .await
            .map_err(|_| RoomError::InvalidPaymentSignature)?;
    }

    room.persist(&services.db).await?;

    let authenticator = crate::auth::SessionAuthenticator::new(services.config.jwt_secret.clone());
    let ttl_seconds = extra.access_window_minutes as i64 * 60;
    Ok(authenticator.mint_replay_token(wallet, &room.record.room_id, &segment.segment_id, ttl_seconds))
}

/// `end(host)` — terminal. The caller (HTTP handler) notifies the sweeper
/// by simply leaving the room `ended` and unattested; the sweeper discovers
/// it on its next pass (spec §4.6).
pub async fn end(handle: &Arc<RoomHandle>, services: &RoomServices, host_wallet: &Wallet) -> Result<(), RoomError> {
    let mut room = handle.state.lock().await;
    if &room.record.host_wallet != host_wallet {
        return Err(RoomError::Unauthorized);
    }
    if let Some(extra) = room.duet.as_mut() {
        extra.ended_at = Some(now());
    }
    room.record.status = RoomStatus::Ended;
    room.record.closed_at = Some(now());
    room.persist(&services.db).await?;
    drop(room);
    handle.notify.notify_waiters();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::agent::AgentOrchestrator;
    use crate::config::Config;
    use crate::ledger::CreditLedger;
    use crate::media::MediaTokenMinter;
    use crate::payment::{PaymentGate, PermissivePaymentVerifier};
    use crate::room::registry::RoomRegistry;

    struct CountingOrchestrator {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl AgentOrchestrator for CountingOrchestrator {
        fn start(&self, _channel: &str) -> Result<String> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(format!("agent-{n}"))
        }

        fn stop(&self, _agent_id: &str) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_services(db: crate::db::Db, agent: Arc<dyn AgentOrchestrator>) -> RoomServices {
        RoomServices {
            db: db.clone(),
            config: Arc::new(Config {
                jwt_secret: "test-secret-at-least-16b".into(),
                agora_app_id: "0".repeat(32),
                agora_app_certificate: "0".repeat(32),
                oracle_private_key: None,
                song_registry_admin_token: String::new(),
                data_dir: std::path::PathBuf::from("./data"),
            }),
            ledger: Arc::new(CreditLedger::new(db.clone())),
            media: Arc::new(MediaTokenMinter::new("0".repeat(32), "0".repeat(32))),
            payment: Arc::new(PaymentGate::new(db, Box::new(PermissivePaymentVerifier))),
            agent,
        }
    }

    /// `join` starts the AI-agent sidecar on the room's `0 → 1` transition;
    /// `leave` stops it once the room empties (spec §4.5).
    #[tokio::test]
    async fn join_starts_and_leave_stops_the_agent_sidecar() {
        let db = crate::db::open_in_memory().unwrap();
        let orchestrator = Arc::new(CountingOrchestrator {
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        });
        let services = test_services(db, orchestrator.clone());
        let registry = RoomRegistry::new();

        let descriptor = super::super::free::descriptor(
            "room-1".to_string(),
            Wallet::from("0xhost"),
            "chan-1".to_string(),
            2,
        );
        let (handle, _) = init(&registry, descriptor).await.unwrap();

        join(&handle, &services, "conn-a".to_string(), Wallet::from("0xa")).await.unwrap();
        assert_eq!(orchestrator.starts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state.lock().await.agent_id.as_deref(), Some("agent-0"));

        // A second joiner does not start a second agent instance.
        join(&handle, &services, "conn-b".to_string(), Wallet::from("0xb")).await.unwrap();
        assert_eq!(orchestrator.starts.load(Ordering::SeqCst), 1);

        leave(&handle, &services, "conn-a").await.unwrap();
        assert_eq!(orchestrator.stops.load(Ordering::SeqCst), 0, "room still has a participant");

        leave(&handle, &services, "conn-b").await.unwrap();
        assert_eq!(orchestrator.stops.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state.lock().await.agent_id, None);
    }
}
