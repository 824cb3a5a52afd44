//! Stateless bearer session tokens (spec §3 "Session Token", §4.1). HMAC-
//! SHA256 over `{sub, iat, exp}`, never revoked server-side; expiry is
//! checked on every request. No refresh endpoint by design.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::{Wallet, now};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_TTL_SECONDS: i64 = 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims for a `replay_access_token` (spec §4.5 `replay`: "issues a
/// `replay_access_token` bound to the wallet and expiry"). Binds the
/// replay grant to the wallet, room, and segment it was paid for, without
/// carrying the internal blob/storage reference — that stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayClaims {
    pub wallet: String,
    pub room_id: String,
    pub segment_id: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("session token signature invalid")]
    BadSignature,
    #[error("session token expired")]
    Expired,
}

pub struct SessionAuthenticator {
    secret: String,
}

impl SessionAuthenticator {
    pub fn new(secret: String) -> Self {
        SessionAuthenticator { secret }
    }

    /// Mints a bearer token for `wallet`, valid for `SESSION_TTL_SECONDS`.
    pub fn mint(&self, wallet: &Wallet) -> String {
        let iat = now();
        let claims = Claims {
            sub: wallet.as_str().to_string(),
            iat,
            exp: iat + SESSION_TTL_SECONDS,
        };
        let payload = serde_json::to_vec(&claims).expect("claims always serialize");
        let payload_b64 = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &payload);
        let sig = self.sign(payload_b64.as_bytes());
        format!("{payload_b64}.{sig}")
    }

    /// Verifies `token`'s signature and expiry, returning the bound wallet.
    pub fn verify(&self, token: &str) -> Result<Wallet, SessionError> {
        let (payload_b64, sig) = token.split_once('.').ok_or(SessionError::Malformed)?;

        let expected_sig = self.sign(payload_b64.as_bytes());
        if expected_sig.as_bytes().ct_eq(sig.as_bytes()).unwrap_u8() != 1 {
            return Err(SessionError::BadSignature);
        }

        let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, payload_b64)
            .map_err(|_| SessionError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        if now() > claims.exp {
            return Err(SessionError::Expired);
        }

        Ok(Wallet::from(claims.sub))
    }

    /// Mints a `replay_access_token` bound to `wallet`, `room_id`, and
    /// `segment_id`, valid for `ttl_seconds` (spec §4.5 `replay`). The
    /// internal blob reference the token ultimately unlocks never appears in
    /// the claims; only `verify_replay_token`, holding this process's secret,
    /// can resolve one back to a grant.
    pub fn mint_replay_token(&self, wallet: &Wallet, room_id: &str, segment_id: &str, ttl_seconds: i64) -> String {
        let iat = now();
        let claims = ReplayClaims {
            wallet: wallet.as_str().to_string(),
            room_id: room_id.to_string(),
            segment_id: segment_id.to_string(),
            iat,
            exp: iat + ttl_seconds,
        };
        let payload = serde_json::to_vec(&claims).expect("claims always serialize");
        let payload_b64 = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &payload);
        let sig = self.sign(payload_b64.as_bytes());
        format!("{payload_b64}.{sig}")
    }

    /// Verifies a `replay_access_token`'s signature and expiry, returning the
    /// bound claims.
    pub fn verify_replay_token(&self, token: &str) -> Result<ReplayClaims, SessionError> {
        let (payload_b64, sig) = token.split_once('.').ok_or(SessionError::Malformed)?;

        let expected_sig = self.sign(payload_b64.as_bytes());
        if expected_sig.as_bytes().ct_eq(sig.as_bytes()).unwrap_u8() != 1 {
            return Err(SessionError::BadSignature);
        }

        let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, payload_b64)
            .map_err(|_| SessionError::Malformed)?;
        let claims: ReplayClaims = serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        if now() > claims.exp {
            return Err(SessionError::Expired);
        }

        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_token() {
        let auth = SessionAuthenticator::new("process-wide-secret".into());
        let wallet = Wallet::from("0xabc");
        let token = auth.mint(&wallet);
        let recovered = auth.verify(&token).unwrap();
        assert_eq!(recovered, wallet);
    }

    #[test]
    fn rejects_tampered_payload() {
        let auth = SessionAuthenticator::new("process-wide-secret".into());
        let token = auth.mint(&Wallet::from("0xabc"));
        let (_, sig) = token.split_once('.').unwrap();
        let forged = format!("{}.{sig}", base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            br#"{"sub":"0xdead","iat":0,"exp":99999999999}"#,
        ));
        assert!(matches!(auth.verify(&forged), Err(SessionError::BadSignature)));
    }

    #[test]
    fn rejects_tokens_from_a_different_secret() {
        let minted = SessionAuthenticator::new("secret-a".into()).mint(&Wallet::from("0xabc"));
        let verifier = SessionAuthenticator::new("secret-b".into());
        assert!(matches!(verifier.verify(&minted), Err(SessionError::BadSignature)));
    }

    #[test]
    fn replay_token_round_trips_and_binds_wallet_room_and_segment() {
        let auth = SessionAuthenticator::new("process-wide-secret".into());
        let wallet = Wallet::from("0xabc");
        let token = auth.mint_replay_token(&wallet, "room-1", "segment-1", 3600);
        let claims = auth.verify_replay_token(&token).unwrap();
        assert_eq!(claims.wallet, "0xabc");
        assert_eq!(claims.room_id, "room-1");
        assert_eq!(claims.segment_id, "segment-1");
    }

    #[test]
    fn replay_token_never_carries_the_blob_reference() {
        let auth = SessionAuthenticator::new("process-wide-secret".into());
        let token = auth.mint_replay_token(&Wallet::from("0xabc"), "room-1", "segment-1", 3600);
        assert!(!token.contains("blob"));
    }
}
