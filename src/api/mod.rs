pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::NoopAgentOrchestrator;
use crate::auth::Authenticator;
use crate::config::Config;
use crate::ledger::CreditLedger;
use crate::media::MediaTokenMinter;
use crate::payment::{PaymentGate, PermissivePaymentVerifier};
use crate::sweeper::{AttestationSweeper, NoopSettlementSubmitter};

pub use state::AppState;

/// Builds the `AppState` and assembles the router. Split from `serve` so
/// integration tests can drive the router in-process without binding a
/// socket (grounded on this corpus's `tower::ServiceExt::oneshot` style).
pub fn build(config: Arc<Config>, db: crate::db::Db) -> AppState {
    let auth = Arc::new(Authenticator::new(db.clone(), config.jwt_secret.clone()));
    let ledger = Arc::new(CreditLedger::new(db.clone()));
    let media = Arc::new(MediaTokenMinter::new(config.agora_app_id.clone(), config.agora_app_certificate.clone()));
    let payment = Arc::new(PaymentGate::new(db.clone(), Box::new(PermissivePaymentVerifier)));
    let sweeper = Arc::new(AttestationSweeper::new(
        db.clone(),
        config.oracle_private_key.clone(),
        Box::new(NoopSettlementSubmitter),
    ));
    let agent = Arc::new(NoopAgentOrchestrator);

    AppState::new(config, db, auth, ledger, media, payment, sweeper, agent)
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/auth/nonce", post(handlers::auth::request_nonce))
        .route("/auth/verify", post(handlers::auth::verify))
        .route("/credits/balance", get(handlers::credits::balance))
        .route("/rooms", post(handlers::rooms::create))
        .route("/rooms/{id}/join", post(handlers::rooms::join))
        .route("/rooms/{id}/heartbeat", post(handlers::rooms::heartbeat))
        .route("/rooms/{id}/renew", post(handlers::rooms::renew))
        .route("/rooms/{id}/leave", post(handlers::rooms::leave))
        .route("/duet/create", post(handlers::duet::create))
        .route("/duet/{id}/start", post(handlers::duet::start))
        .route("/duet/{id}/guest/accept", post(handlers::duet::guest_accept))
        .route("/duet/{id}/bridge/token", post(handlers::duet::bridge_token_refresh))
        .route("/duet/{id}/broadcast/heartbeat", post(handlers::duet::broadcast_heartbeat))
        .route("/duet/{id}/public-info", get(handlers::duet::public_info))
        .route("/duet/{id}/enter", post(handlers::duet::enter))
        .route("/duet/{id}/public-enter", post(handlers::duet::public_enter))
        .route("/duet/{id}/recording/complete", post(handlers::duet::recording_complete))
        .route("/duet/{id}/replay", get(handlers::duet::replay))
        .route("/duet/{id}/end", post(handlers::duet::end))
        .route("/songs/search", get(handlers::songs::search))
        .route("/songs", post(handlers::songs::insert))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(host: &str, port: u16, config: Arc<Config>) -> Result<()> {
    let db_path = config.data_dir.join("voice-control-plane.db");
    let db = crate::db::open(&db_path).with_context(|| format!("opening database at {}", db_path.display()))?;

    let state = build(config, db);
    spawn_sweep_loop(state.clone());
    let app = router(state);

    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "voice control plane listening");

    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    axum::serve(listener, app).await.context("running server")?;
    Ok(())
}

/// The scheduled loop driving C6 while the server is up (spec §4.6, design
/// note "Scheduled work": a separate task, not part of any room actor, safe
/// to run while rooms are live since it only reads ended/unattested rows).
fn spawn_sweep_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(crate::config::SWEEP_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            let sweeper = {
                let inner = state.inner.read().await;
                inner.sweeper.clone()
            };
            match sweeper.sweep().await {
                Ok(attested) => {
                    let mut inner = state.inner.write().await;
                    inner.last_sweep_at = Some(crate::domain::now());
                    if attested > 0 {
                        tracing::info!(attested, "attestation sweep complete");
                    }
                }
                Err(err) => tracing::warn!(%err, "attestation sweep pass failed"),
            }
        }
    });
}
