use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::middleware::AuthUser;
use crate::api::state::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub remaining: i64,
    pub total_debited: i64,
}

pub async fn balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let inner = state.inner.read().await;
    let balance = inner.ledger.get_balance(&user.wallet).await?;
    Ok(Json(BalanceResponse {
        remaining: balance.remaining_seconds,
        total_debited: balance.total_debited_seconds,
    }))
}
