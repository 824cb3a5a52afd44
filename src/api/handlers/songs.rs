use axum::Json;
use axum::extract::{Query, State};
use axum::http::request::Parts;
use axum::extract::FromRequestParts;
use serde::{Deserialize, Serialize};

use crate::auth::signature;
use crate::domain::song::SongRegistryEntry;

use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SongRegistryEntry>>, ApiError> {
    let inner = state.inner.read().await;
    let conn = inner.db.lock().await;
    let pattern = format!("%{}%", query.q);
    let mut stmt = conn.prepare(
        "SELECT song_id, title, artist, upstream_ip_id, controller_wallet, payout_chain,
                payout_address, upstream_royalty_bps, attestation_signature, license_preset
         FROM song_registry WHERE title LIKE ?1 OR artist LIKE ?1",
    )?;
    let rows = stmt.query_map(rusqlite::params![pattern], |row| {
        Ok(SongRegistryEntry {
            song_id: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            upstream_ip_id: row.get(3)?,
            controller_wallet: row.get(4)?,
            payout_chain: row.get(5)?,
            payout_address: row.get(6)?,
            upstream_royalty_bps: row.get(7)?,
            attestation_signature: row.get(8)?,
            license_preset: row.get(9)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(Json(entries))
}

pub struct AdminToken;

impl FromRequestParts<AppState> for AdminToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        let inner = state.inner.read().await;
        if token != inner.config.song_registry_admin_token || inner.config.song_registry_admin_token.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        Ok(AdminToken)
    }
}

pub async fn insert(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(body): Json<SongRegistryEntry>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The registry refuses to record an entry whose attestation signature
    // does not recover to `controller_wallet` (spec §3 "Song Registry Entry").
    let message = signature::song_attestation_message(
        &body.upstream_ip_id,
        &body.payout_chain,
        &body.payout_address,
        body.upstream_royalty_bps,
    );
    signature::verify(&message, &body.attestation_signature, &body.controller_wallet)
        .map_err(|_| ApiError::InvalidSignature)?;

    let inner = state.inner.read().await;
    let conn = inner.db.lock().await;
    conn.execute(
        "INSERT INTO song_registry
            (song_id, title, artist, upstream_ip_id, controller_wallet, payout_chain,
             payout_address, upstream_royalty_bps, attestation_signature, license_preset)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(song_id) DO UPDATE SET
            title = excluded.title, artist = excluded.artist, attestation_signature = excluded.attestation_signature",
        rusqlite::params![
            body.song_id,
            body.title,
            body.artist,
            body.upstream_ip_id,
            body.controller_wallet,
            body.payout_chain,
            body.payout_address,
            body.upstream_royalty_bps,
            body.attestation_signature,
            body.license_preset,
        ],
    )?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
