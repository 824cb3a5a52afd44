use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub last_sweep_at: Option<i64>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let inner = state.inner.read().await;
    let db_ok = inner.db.lock().await.execute_batch("SELECT 1").is_ok();
    Json(HealthResponse {
        status: "ok",
        db_ok,
        last_sweep_at: inner.last_sweep_at,
    })
}
