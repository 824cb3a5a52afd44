use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::room::{self, Event};

use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;

#[derive(Deserialize)]
pub struct CreateRoomRequest {
    pub channel: String,
    pub capacity: u32,
}

#[derive(Serialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    if body.channel.trim().is_empty() || body.capacity == 0 {
        return Err(ApiError::MissingFields);
    }
    let room_id = uuid::Uuid::new_v4().to_string();
    let descriptor = room::free::descriptor(room_id.clone(), user.wallet, body.channel, body.capacity);

    let inner = state.inner.read().await;
    room::actor::init(&inner.rooms, descriptor).await?;
    Ok(Json(CreateRoomResponse { room_id }))
}

#[derive(Deserialize)]
pub struct JoinRequest {
    pub connection_id: String,
}

#[derive(Serialize)]
pub struct JoinResponse {
    pub token: String,
    pub ttl: u64,
    pub heartbeat_interval: Option<u64>,
    pub renew_after: Option<u64>,
    pub remaining: Option<i64>,
}

pub async fn join(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    user: AuthUser,
    Json(body): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let inner = state.inner.read().await;
    let handle = inner.lookup_room(&room_id).await?;
    let services = inner.room_services();
    drop(inner);

    let outcome = room::actor::join(&handle, &services, body.connection_id, user.wallet).await?;
    Ok(Json(JoinResponse {
        token: outcome.token,
        ttl: outcome.ttl,
        heartbeat_interval: outcome.heartbeat_interval,
        renew_after: outcome.renew_after,
        remaining: outcome.remaining,
    }))
}

#[derive(Deserialize)]
pub struct ConnectionRequest {
    pub connection_id: String,
}

#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub remaining: i64,
    pub events: Vec<String>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    _user: AuthUser,
    Json(body): Json<ConnectionRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let inner = state.inner.read().await;
    let handle = inner.lookup_room(&room_id).await?;
    let services = inner.room_services();
    drop(inner);

    let outcome = room::actor::heartbeat(&handle, &services, &body.connection_id).await?;
    Ok(Json(HeartbeatResponse {
        remaining: outcome.remaining,
        events: outcome.events.into_iter().map(event_name).collect(),
    }))
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum RenewResponse {
    Granted { token: String, ttl: u64, remaining: i64, events: Vec<String> },
    Denied { denied: bool, reason: &'static str },
}

pub async fn renew(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    _user: AuthUser,
    Json(body): Json<ConnectionRequest>,
) -> Result<Json<RenewResponse>, ApiError> {
    let inner = state.inner.read().await;
    let handle = inner.lookup_room(&room_id).await?;
    let services = inner.room_services();
    drop(inner);

    let outcome = room::actor::renew(&handle, &services, &body.connection_id).await?;
    Ok(Json(match outcome {
        room::RenewOutcome::Granted { token, ttl, remaining, events } => RenewResponse::Granted {
            token,
            ttl,
            remaining,
            events: events.into_iter().map(event_name).collect(),
        },
        room::RenewOutcome::Denied { reason } => RenewResponse::Denied { denied: true, reason },
    }))
}

pub async fn leave(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    _user: AuthUser,
    Json(body): Json<ConnectionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let inner = state.inner.read().await;
    let handle = inner.lookup_room(&room_id).await?;
    let services = inner.room_services();
    drop(inner);

    room::actor::leave(&handle, &services, &body.connection_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

fn event_name(event: Event) -> String {
    match event {
        Event::CreditsLow => "credits_low".to_string(),
        Event::CreditsExhausted => "credits_exhausted".to_string(),
    }
}
