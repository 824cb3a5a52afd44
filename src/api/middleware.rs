use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::Wallet;

use super::error::ApiError;
use super::state::AppState;

/// A request authenticated by a session bearer token (spec §6: `session`
/// auth rows). Extracted once per handler; the wallet is already normalised.
pub struct AuthUser {
    pub wallet: Wallet,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        let inner = state.inner.read().await;
        let wallet = inner.auth.verify_session(token).map_err(|_| ApiError::Unauthorized)?;
        Ok(AuthUser { wallet })
    }
}

/// A request authenticated by a bridge ticket (spec §6: `bridge ticket`
/// auth rows — `bridgeTokenRefresh`, `broadcastHeartbeat`,
/// `recordingComplete`). The ticket is opaque and bound to one room; the
/// handler looks up the room by path param and compares independently.
pub struct BridgeTicket(pub String);

impl<S> FromRequestParts<S> for BridgeTicket
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-bridge-ticket")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        Ok(BridgeTicket(header.to_string()))
    }
}
