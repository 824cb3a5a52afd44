use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::domain::Wallet;

use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Deserialize)]
pub struct NonceRequest {
    pub wallet: String,
}

#[derive(Serialize)]
pub struct NonceResponse {
    pub nonce: String,
}

pub async fn request_nonce(
    State(state): State<AppState>,
    Json(body): Json<NonceRequest>,
) -> Result<Json<NonceResponse>, ApiError> {
    if body.wallet.trim().is_empty() {
        return Err(ApiError::MissingFields);
    }
    let wallet = Wallet::from(body.wallet);
    let inner = state.inner.read().await;
    let nonce = inner.auth.request_nonce(&wallet).await?;
    Ok(Json(NonceResponse { nonce }))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub wallet: String,
    pub nonce: String,
    pub signature: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub session_token: String,
}

pub async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    if body.wallet.trim().is_empty() || body.nonce.trim().is_empty() || body.signature.trim().is_empty() {
        return Err(ApiError::MissingFields);
    }
    let wallet = Wallet::from(body.wallet);
    let inner = state.inner.read().await;
    let session_token = inner.auth.verify_and_mint(&wallet, &body.nonce, &body.signature).await?;
    Ok(Json(VerifyResponse { session_token }))
}
