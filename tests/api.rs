//! End-to-end scenarios driven against the real Axum router with an
//! in-memory SQLite database, via `tower::ServiceExt::oneshot` — no socket
//! bound, no wall-clock sleeps.

use std::sync::Arc;

use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use voice_control_plane::api::{self, AppState};
use voice_control_plane::config::Config;
use voice_control_plane::domain::Wallet;

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        jwt_secret: "integration-test-secret-please".to_string(),
        agora_app_id: "0".repeat(32),
        agora_app_certificate: "0".repeat(32),
        oracle_private_key: None,
        song_registry_admin_token: "admin-secret".to_string(),
        data_dir: std::path::PathBuf::from("./data"),
    })
}

async fn test_app() -> (Router, AppState) {
    let db = voice_control_plane::db::open_in_memory().unwrap();
    let state = api::build(test_config(), db);
    let router = api::router(state.clone());
    (router, state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn call(router: &Router, req: Request<Body>) -> axum::response::Response {
    router.clone().oneshot(req).await.unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_post(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

/// Logs a fresh random wallet in through the real `/auth/nonce` ->
/// `/auth/verify` round trip, returning its session bearer token.
async fn login(router: &Router, signer: &PrivateKeySigner) -> (Wallet, String) {
    let wallet_hex = format!("{:?}", signer.address()).to_lowercase();

    let resp = call(router, post("/auth/nonce", json!({ "wallet": wallet_hex }))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let nonce = body["nonce"].as_str().unwrap().to_string();

    let message = voice_control_plane::auth::nonce_message(&wallet_hex, &nonce);
    let sig = signer.sign_message(message.as_bytes()).await.unwrap();
    let sig_hex = format!("0x{}", hex::encode(sig.as_bytes()));

    let resp = call(
        router,
        post(
            "/auth/verify",
            json!({ "wallet": wallet_hex, "nonce": nonce, "signature": sig_hex }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let token = body["session_token"].as_str().unwrap().to_string();

    (Wallet::from(wallet_hex), token)
}

/// Scenario 1 (spec §8): free room happy path. Join, meter twice via
/// backdated `last_metered_at` to simulate elapsed wall-clock time without
/// sleeping, observe `credits_low` then `credits_exhausted`, then a denied
/// `renew`, then `leave` closing the empty room.
#[tokio::test]
async fn free_room_happy_path_meters_and_closes_on_empty() {
    let (router, state) = test_app().await;
    let signer = PrivateKeySigner::random();
    let (wallet, token) = login(&router, &signer).await;

    {
        let inner = state.inner.read().await;
        inner.ledger.topup(&wallet, 120, "seed").await.unwrap();
    }

    let resp = call(
        &router,
        authed_post("/rooms", &token, json!({ "channel": "room-a", "capacity": 2 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let room_id = body_json(resp).await["room_id"].as_str().unwrap().to_string();

    let resp = call(
        &router,
        authed_post(&format!("/rooms/{room_id}/join"), &token, json!({ "connection_id": "conn-a" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let join_body = body_json(resp).await;
    assert_eq!(join_body["remaining"].as_i64(), Some(120));

    // Back-date the participant's metering clock by 100s, then heartbeat.
    backdate_last_metered_at(&state, &room_id, "conn-a", 100).await;
    let resp = call(
        &router,
        authed_post(&format!("/rooms/{room_id}/heartbeat"), &token, json!({ "connection_id": "conn-a" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["remaining"].as_i64(), Some(20));
    assert_eq!(body["events"], json!(["credits_low"]));

    // Back-date by another 25s (125 debited total against a 120s balance):
    // exhausts exactly at zero, never negative.
    backdate_last_metered_at(&state, &room_id, "conn-a", 25).await;
    let resp = call(
        &router,
        authed_post(&format!("/rooms/{room_id}/heartbeat"), &token, json!({ "connection_id": "conn-a" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["remaining"].as_i64(), Some(0));
    assert_eq!(body["events"], json!(["credits_exhausted"]));

    let resp = call(
        &router,
        authed_post(&format!("/rooms/{room_id}/renew"), &token, json!({ "connection_id": "conn-a" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["denied"], json!(true));
    assert_eq!(body["reason"], json!("credits_exhausted"));

    let resp = call(
        &router,
        authed_post(&format!("/rooms/{room_id}/leave"), &token, json!({ "connection_id": "conn-a" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let inner = state.inner.read().await;
    let handle = inner.rooms.get(&room_id).unwrap();
    let room_state = handle.state.lock().await;
    assert!(room_state.participants.is_empty());
}

async fn backdate_last_metered_at(state: &AppState, room_id: &str, connection_id: &str, seconds_ago: i64) {
    let inner = state.inner.read().await;
    let handle = inner.rooms.get(room_id).unwrap();
    let mut room = handle.state.lock().await;
    let participant = room.participants.get_mut(connection_id).unwrap();
    participant.last_metered_at -= seconds_ago;
}

/// Scenario 2 (spec §8): paid duet live entry gated by the 402 challenge,
/// then replayed by an attacker wallet and rejected.
#[tokio::test]
async fn paid_duet_entry_requires_payment_and_rejects_a_different_wallets_replay() {
    let (router, _state) = test_app().await;
    let host_signer = PrivateKeySigner::random();
    let (_host_wallet, host_token) = login(&router, &host_signer).await;

    let resp = call(
        &router,
        authed_post(
            "/duet/create",
            &host_token,
            json!({
                "channel": "duet-a",
                "split_address": "0xsplit",
                "asset_id": "usdc",
                "network_id": "base",
                "live_amount": 100_000,
                "replay_amount": 50_000,
            }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let room_id = body_json(resp).await["room_id"].as_str().unwrap().to_string();

    let resp = call(&router, authed_post(&format!("/duet/{room_id}/start"), &host_token, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let viewer_signer = PrivateKeySigner::random();
    let (viewer_wallet, viewer_token) = login(&router, &viewer_signer).await;

    // First `enter` with no signature: 402 with a challenge header.
    let resp = call(&router, authed_post(&format!("/duet/{room_id}/enter"), &viewer_token, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let challenge_b64 = resp
        .headers()
        .get("PAYMENT-REQUIRED")
        .expect("402 carries a challenge header")
        .to_str()
        .unwrap()
        .to_string();

    let challenge: Value = {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD.decode(&challenge_b64).unwrap();
        serde_json::from_slice(&decoded).unwrap()
    };
    let resource = challenge["resource"].as_str().unwrap().to_string();
    assert!(resource.starts_with(&format!("/duet/{room_id}/enter?segment_id=")));

    let sig_envelope = json!({
        "resource": resource,
        "wallet": viewer_wallet.as_str(),
        "amount": challenge["amount"],
        "asset": challenge["asset"],
        "network": challenge["network"],
        "payTo": challenge["payTo"],
    });
    let sig_b64 = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(sig_envelope.to_string())
    };

    let resp = call(
        &router,
        authed_post(&format!("/duet/{room_id}/enter"), &viewer_token, json!({ "payment_signature": sig_b64 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(!body["agora_viewer_token"].as_str().unwrap().is_empty());

    // Second `enter` by the same wallet within the access window: no
    // re-payment required.
    let resp = call(&router, authed_post(&format!("/duet/{room_id}/enter"), &viewer_token, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Replaying the exact same signature envelope under a different wallet's
    // session is rejected — not a free grant.
    let attacker_signer = PrivateKeySigner::random();
    let (_attacker_wallet, attacker_token) = login(&router, &attacker_signer).await;
    let resp = call(
        &router,
        authed_post(&format!("/duet/{room_id}/enter"), &attacker_token, json!({ "payment_signature": sig_b64 })),
    )
    .await;
    assert!(resp.status() == StatusCode::PAYMENT_REQUIRED || resp.status() == StatusCode::CONFLICT);
}

/// Scenario 6 (spec §8): two concurrent debits against an 80s balance never
/// overdraw and never double-spend, driven through the real ledger behind
/// the `CreditLedger` the router is wired to.
#[tokio::test]
async fn concurrent_debits_through_the_shared_ledger_never_overdraw() {
    let (_router, state) = test_app().await;
    let wallet = Wallet::from("0xledger-concurrency");

    let ledger = {
        let inner = state.inner.read().await;
        inner.ledger.clone()
    };
    ledger.topup(&wallet, 80, "seed").await.unwrap();

    let l1 = ledger.clone();
    let w1 = wallet.clone();
    let l2 = ledger.clone();
    let w2 = wallet.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { l1.debit(&w1, 50, "conn-a").await.unwrap() }),
        tokio::spawn(async move { l2.debit(&w2, 50, "conn-b").await.unwrap() }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.debited + b.debited, 80);
    assert!(a.remaining == 0 || b.remaining == 0);

    let balance = ledger.get_balance(&wallet).await.unwrap();
    assert_eq!(balance.remaining_seconds, 0);
}

#[tokio::test]
async fn health_endpoint_reports_db_ok() {
    let (router, _state) = test_app().await;
    let resp = call(&router, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["db_ok"], json!(true));
}

/// `init -> init` with the same room id returns `already_initialized` and
/// does not mutate state (spec §8 idempotence laws).
#[tokio::test]
async fn creating_the_same_duet_room_twice_is_rejected() {
    let (router, _state) = test_app().await;
    let signer = PrivateKeySigner::random();
    let (_wallet, token) = login(&router, &signer).await;

    // `create` always mints a fresh room id, so re-initialization is
    // exercised at the actor layer directly rather than through the HTTP
    // surface (which has no "create with a caller-supplied id" route).
    use voice_control_plane::room;

    let registry = room::RoomRegistry::new();
    let descriptor_a = room::free::descriptor("fixed-room".to_string(), Wallet::from("0xhost"), "c".to_string(), 2);
    let descriptor_b = room::free::descriptor("fixed-room".to_string(), Wallet::from("0xhost"), "c".to_string(), 2);

    let (_, installed_first) = room::actor::init(&registry, descriptor_a).await.unwrap();
    assert!(installed_first);

    let err = room::actor::init(&registry, descriptor_b).await.unwrap_err();
    assert!(matches!(err, room::RoomError::AlreadyInitialized));

    let _ = token;
}

/// Song registry: an entry attested by the claimed `controller_wallet` is
/// accepted; the same entry attested with a different signer is rejected
/// (spec §3 "Song Registry Entry").
#[tokio::test]
async fn song_registry_rejects_an_attestation_that_does_not_recover_to_the_controller_wallet() {
    use voice_control_plane::auth::signature;

    let (router, _state) = test_app().await;
    let controller = PrivateKeySigner::random();
    let controller_wallet = format!("{:?}", controller.address()).to_lowercase();

    let message = signature::song_attestation_message("ip-1", "base", "0xpayout", 250);
    let sig = controller.sign_message(message.as_bytes()).await.unwrap();
    let sig_hex = format!("0x{}", hex::encode(sig.as_bytes()));

    let entry = json!({
        "song_id": "song-1",
        "title": "Track One",
        "artist": "Artist",
        "upstream_ip_id": "ip-1",
        "controller_wallet": controller_wallet,
        "payout_chain": "base",
        "payout_address": "0xpayout",
        "upstream_royalty_bps": 250,
        "attestation_signature": sig_hex,
        "license_preset": Value::Null,
    });

    let resp = call(&router, authed_post("/songs", "admin-secret", entry.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&router, Request::builder().method("GET").uri("/songs/search?q=Track").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let results = body_json(resp).await;
    assert_eq!(results.as_array().unwrap().len(), 1);

    // Same fields, but signed by a different wallet than `controller_wallet`.
    let impostor = PrivateKeySigner::random();
    let impostor_sig = impostor.sign_message(message.as_bytes()).await.unwrap();
    let mut bad_entry = entry.clone();
    bad_entry["song_id"] = json!("song-2");
    bad_entry["attestation_signature"] = json!(format!("0x{}", hex::encode(impostor_sig.as_bytes())));

    let resp = call(&router, authed_post("/songs", "admin-secret", bad_entry)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

fn bridge_post(uri: &str, ticket: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-bridge-ticket", ticket)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Scenario 4 (spec §8): the bridge ticket minted at `start` is the only
/// credential `broadcast/heartbeat` accepts — a forged ticket is rejected.
#[tokio::test]
async fn broadcast_heartbeat_rejects_a_ticket_that_does_not_match_the_room() {
    let (router, _state) = test_app().await;
    let host_signer = PrivateKeySigner::random();
    let (_host_wallet, host_token) = login(&router, &host_signer).await;

    let resp = call(
        &router,
        authed_post(
            "/duet/create",
            &host_token,
            json!({
                "channel": "duet-b",
                "split_address": "0xsplit",
                "asset_id": "usdc",
                "network_id": "base",
                "live_amount": 100_000,
                "replay_amount": 50_000,
            }),
        ),
    )
    .await;
    let room_id = body_json(resp).await["room_id"].as_str().unwrap().to_string();

    let resp = call(&router, authed_post(&format!("/duet/{room_id}/start"), &host_token, json!({}))).await;
    let ticket = body_json(resp).await["bridge_ticket"].as_str().unwrap().to_string();

    let resp = call(
        &router,
        bridge_post(&format!("/duet/{room_id}/broadcast/heartbeat"), "not-the-real-ticket", json!({ "mode": "mic" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = call(
        &router,
        bridge_post(&format!("/duet/{room_id}/broadcast/heartbeat"), &ticket, json!({ "mode": "camera" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = call(&router, Request::builder().uri(format!("/duet/{room_id}/public-info")).body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["broadcaster_online"], json!(true));
    assert_eq!(body["broadcaster_mode"], json!("camera"));
}
