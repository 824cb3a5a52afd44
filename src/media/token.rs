//! Media-Token Minter (C3, spec §4.3). Builds vendor (Agora) access tokens:
//! an HMAC-SHA256 signature over a versioned envelope of
//! `{app_id, channel, uid, role, salt, expire_at}`, CRC32-salted against
//! replay across deployments, base64-encoded. The vendor's real token
//! format is proprietary; this is the shape this crate's one caller (the
//! Room Actor) needs, and the minter is the sole place that builds it.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;

use crate::config;
use crate::domain::now;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Broadcaster,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaToken {
    pub token: String,
    pub expires_in_seconds: u64,
}

#[derive(Serialize)]
struct Envelope<'a> {
    app_id: &'a str,
    channel: &'a str,
    uid: u32,
    role: u8,
    salt: u32,
    expire_at: i64,
}

pub struct MediaTokenMinter {
    app_id: String,
    app_certificate: String,
}

impl MediaTokenMinter {
    pub fn new(app_id: String, app_certificate: String) -> Self {
        MediaTokenMinter { app_id, app_certificate }
    }

    /// Free-room grant, renewed by the caller before it lapses.
    pub fn short_token(&self, channel: &str, vendor_uid: u32) -> MediaToken {
        self.build(channel, vendor_uid, Role::Broadcaster, config::TOKEN_TTL_SHORT_SECONDS)
    }

    /// Paid-room grant, single issuance per segment.
    pub fn booked_token(&self, channel: &str, vendor_uid: u32) -> MediaToken {
        self.build(channel, vendor_uid, Role::Broadcaster, config::TOKEN_TTL_BOOKED_SECONDS)
    }

    pub fn broadcaster_token(&self, channel: &str, vendor_uid: u32) -> MediaToken {
        self.build(channel, vendor_uid, Role::Broadcaster, config::TOKEN_TTL_BOOKED_SECONDS)
    }

    pub fn viewer_token(&self, channel: &str, vendor_uid: u32) -> MediaToken {
        self.build(channel, vendor_uid, Role::Viewer, config::TOKEN_TTL_BOOKED_SECONDS)
    }

    fn build(&self, channel: &str, vendor_uid: u32, role: Role, ttl_seconds: u64) -> MediaToken {
        let salt = rand::rng().next_u32();
        let expire_at = now() + ttl_seconds as i64;

        let envelope = Envelope {
            app_id: &self.app_id,
            channel,
            uid: vendor_uid,
            role: match role {
                Role::Broadcaster => 1,
                Role::Viewer => 2,
            },
            salt,
            expire_at,
        };
        let payload = serde_json::to_vec(&envelope).expect("envelope always serializes");

        let mut crc = crc32fast::Hasher::new();
        crc.update(channel.as_bytes());
        let checksum = crc.finalize();

        let mut mac = HmacSha256::new_from_slice(self.app_certificate.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(&payload);
        mac.update(&checksum.to_be_bytes());
        let signature = mac.finalize().into_bytes();

        let mut framed = Vec::with_capacity(1 + 4 + payload.len() + signature.len());
        framed.push(TOKEN_VERSION);
        framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        framed.extend_from_slice(&payload);
        framed.extend_from_slice(&signature);

        MediaToken {
            token: base64::engine::general_purpose::STANDARD.encode(framed),
            expires_in_seconds: ttl_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_token_reports_the_spec_ttl() {
        let minter = MediaTokenMinter::new("app-id".into(), "app-cert".into());
        let token = minter.short_token("room-1", 42);
        assert_eq!(token.expires_in_seconds, config::TOKEN_TTL_SHORT_SECONDS);
        assert!(!token.token.is_empty());
    }

    #[test]
    fn booked_token_reports_the_spec_ttl() {
        let minter = MediaTokenMinter::new("app-id".into(), "app-cert".into());
        let token = minter.booked_token("room-1", 42);
        assert_eq!(token.expires_in_seconds, config::TOKEN_TTL_BOOKED_SECONDS);
    }

    #[test]
    fn broadcaster_and_viewer_tokens_differ() {
        let minter = MediaTokenMinter::new("app-id".into(), "app-cert".into());
        let a = minter.broadcaster_token("room-1", 1);
        let b = minter.viewer_token("room-1", 1);
        assert_ne!(a.token, b.token);
    }
}
