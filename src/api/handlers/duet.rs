use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::domain::room::{BroadcasterMode, RecordingMode, ReplayMode};
use crate::domain::Wallet;
use crate::payment::PaymentGate;
use crate::room::{self, duet::DuetParams};

use crate::api::error::ApiError;
use crate::api::middleware::{AuthUser, BridgeTicket};
use crate::api::state::AppState;

#[derive(Deserialize)]
pub struct CreateDuetRequest {
    pub channel: String,
    pub split_address: String,
    pub asset_id: String,
    pub network_id: String,
    pub live_amount: u64,
    pub replay_amount: u64,
    #[serde(default = "default_access_window")]
    pub access_window_minutes: u32,
    #[serde(default)]
    pub replay_public: bool,
    #[serde(default)]
    pub recording_enabled: bool,
}

fn default_access_window() -> u32 {
    60
}

#[derive(Serialize)]
pub struct CreateDuetResponse {
    pub room_id: String,
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateDuetRequest>,
) -> Result<Json<CreateDuetResponse>, ApiError> {
    if body.channel.trim().is_empty() || body.split_address.trim().is_empty() {
        return Err(ApiError::MissingFields);
    }
    let room_id = uuid::Uuid::new_v4().to_string();
    let params = DuetParams {
        split_address: body.split_address,
        asset_id: body.asset_id,
        network_id: body.network_id,
        live_amount: body.live_amount,
        replay_amount: body.replay_amount,
        access_window_minutes: body.access_window_minutes,
        replay_mode: if body.replay_public { ReplayMode::Public } else { ReplayMode::WorkerGated },
        recording_mode: if body.recording_enabled { RecordingMode::Enabled } else { RecordingMode::Disabled },
    };
    let descriptor = room::duet::descriptor(room_id.clone(), user.wallet, body.channel, 2, params);

    let inner = state.inner.read().await;
    room::actor::init(&inner.rooms, descriptor).await?;
    Ok(Json(CreateDuetResponse { room_id }))
}

#[derive(Serialize)]
pub struct StartResponse {
    pub bridge_ticket: String,
    pub already_live: bool,
}

pub async fn start(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    user: AuthUser,
) -> Result<Json<StartResponse>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    authorize_host(&handle, &user.wallet).await?;
    let (bridge_ticket, already_live) = room::actor::start(&handle, &services).await?;
    Ok(Json(StartResponse { bridge_ticket, already_live }))
}

#[derive(Deserialize)]
pub struct GuestAcceptRequest {
    pub wallet: String,
}

pub async fn guest_accept(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    _user: AuthUser,
    Json(body): Json<GuestAcceptRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    room::actor::guest_accept(&handle, &services, Wallet::from(body.wallet)).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Serialize)]
pub struct BridgeTokenResponse {
    pub token: String,
    pub ttl: u64,
}

pub async fn bridge_token_refresh(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ticket: BridgeTicket,
) -> Result<Json<BridgeTokenResponse>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    room::actor::verify_bridge_ticket(&handle, &ticket.0).await?;
    let (token, ttl) = room::actor::bridge_token_refresh(&handle, &services).await?;
    Ok(Json(BridgeTokenResponse { token, ttl }))
}

#[derive(Deserialize)]
pub struct BroadcastHeartbeatRequest {
    pub mode: String,
}

pub async fn broadcast_heartbeat(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ticket: BridgeTicket,
    Json(body): Json<BroadcastHeartbeatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    room::actor::verify_bridge_ticket(&handle, &ticket.0).await?;
    let mode = match body.mode.as_str() {
        "camera" => BroadcasterMode::Camera,
        "screen" => BroadcasterMode::Screen,
        _ => BroadcasterMode::Mic,
    };
    room::actor::broadcast_heartbeat(&handle, &services, mode).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Serialize)]
pub struct PublicInfoResponse {
    pub status: &'static str,
    pub broadcaster_online: bool,
    pub broadcaster_mode: &'static str,
    pub segment_id: Option<String>,
}

pub async fn public_info(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<PublicInfoResponse>, ApiError> {
    let (handle, _services) = lookup(&state, &room_id).await?;
    let info = room::actor::public_info(&handle).await?;
    Ok(Json(PublicInfoResponse {
        status: crate::room::state::status_str(info.status),
        broadcaster_online: info.broadcaster_online,
        broadcaster_mode: broadcaster_mode_str(info.broadcaster_mode),
        segment_id: info.segment_id,
    }))
}

fn broadcaster_mode_str(mode: BroadcasterMode) -> &'static str {
    match mode {
        BroadcasterMode::Mic => "mic",
        BroadcasterMode::Camera => "camera",
        BroadcasterMode::Screen => "screen",
    }
}

#[derive(Deserialize)]
pub struct EnterRequest {
    #[serde(default)]
    pub payment_signature: Option<String>,
}

#[derive(Deserialize)]
pub struct PublicEnterRequest {
    pub wallet: String,
    #[serde(default)]
    pub payment_signature: Option<String>,
}

#[derive(Serialize)]
pub struct EnterResponse {
    pub agora_viewer_token: String,
    pub ttl: u64,
}

pub async fn enter(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    user: AuthUser,
    Json(body): Json<EnterRequest>,
) -> Result<Json<EnterResponse>, ApiError> {
    enter_inner(&state, &room_id, &user.wallet, body.payment_signature).await
}

pub async fn public_enter(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<PublicEnterRequest>,
) -> Result<Json<EnterResponse>, ApiError> {
    let wallet = Wallet::from(body.wallet);
    enter_inner(&state, &room_id, &wallet, body.payment_signature).await
}

async fn enter_inner(
    state: &AppState,
    room_id: &str,
    wallet: &Wallet,
    payment_signature: Option<String>,
) -> Result<Json<EnterResponse>, ApiError> {
    let (handle, services) = lookup(state, room_id).await?;
    match room::actor::enter(&handle, &services, wallet, payment_signature.as_deref()).await {
        Ok((_resource, token, ttl)) => Ok(Json(EnterResponse { agora_viewer_token: token, ttl })),
        Err(room::RoomError::PaymentRequired) => {
            let room_state = handle.state.lock().await;
            let extra = room_state.duet.as_ref().ok_or(ApiError::Internal(anyhow::anyhow!("duet room missing extra state")))?;
            let segment = extra.current_segment.as_ref().ok_or(ApiError::Internal(anyhow::anyhow!("no active segment")))?;
            let resource = PaymentGate::resource_id(room_state.record.kind, &room_state.record.room_id, "enter", &segment.segment_id);
            let header = services.payment.challenge(
                &resource,
                segment.price_live,
                &extra.asset_id,
                &extra.network_id,
                &extra.split_address,
                None,
            );
            Err(ApiError::PaymentRequired { header })
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Deserialize)]
pub struct RecordingCompleteRequest {
    pub blob_ref: String,
}

pub async fn recording_complete(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ticket: BridgeTicket,
    Json(body): Json<RecordingCompleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    room::actor::verify_bridge_ticket(&handle, &ticket.0).await?;
    room::actor::recording_complete(&handle, &services, body.blob_ref).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ReplayQuery {
    #[serde(default)]
    pub payment_signature: Option<String>,
}

#[derive(Serialize)]
pub struct ReplayResponse {
    pub replay_access_token: String,
}

pub async fn replay(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    user: AuthUser,
    Query(query): Query<ReplayQuery>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    match room::actor::replay(&handle, &services, &user.wallet, query.payment_signature.as_deref()).await {
        Ok(token) => Ok(Json(ReplayResponse { replay_access_token: token })),
        Err(room::RoomError::PaymentRequired) => {
            let room_state = handle.state.lock().await;
            let extra = room_state.duet.as_ref().ok_or(ApiError::Internal(anyhow::anyhow!("duet room missing extra state")))?;
            let segment = extra.current_segment.as_ref().ok_or(ApiError::Internal(anyhow::anyhow!("no active segment")))?;
            let resource = PaymentGate::resource_id(room_state.record.kind, &room_state.record.room_id, "replay", &segment.segment_id);
            let header = services.payment.challenge(
                &resource,
                segment.price_replay,
                &extra.asset_id,
                &extra.network_id,
                &extra.split_address,
                None,
            );
            Err(ApiError::PaymentRequired { header })
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn end(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (handle, services) = lookup(&state, &room_id).await?;
    room::actor::end(&handle, &services, &user.wallet).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn lookup(state: &AppState, room_id: &str) -> Result<(std::sync::Arc<room::RoomHandle>, room::RoomServices), ApiError> {
    let inner = state.inner.read().await;
    let handle = inner.lookup_room(room_id).await?;
    let services = inner.room_services();
    Ok((handle, services))
}

async fn authorize_host(handle: &room::RoomHandle, wallet: &Wallet) -> Result<(), ApiError> {
    let room_state = handle.state.lock().await;
    if &room_state.record.host_wallet != wallet {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
