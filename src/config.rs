//! Process-wide configuration, resolved once at startup from the environment
//! and threaded through `AppState` as an `Arc<Config>`. Nothing here is a
//! mutable global — every component that needs a setting receives this value
//! at construction time.

use anyhow::{Context, Result, bail};

/// Timing constants from the spec (`§6 Timing constants`).
pub const HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
pub const TOKEN_TTL_SHORT_SECONDS: u64 = 90;
pub const TOKEN_TTL_BOOKED_SECONDS: u64 = 3600;
pub const TOKEN_RENEW_AFTER_SECONDS: u64 = TOKEN_TTL_SHORT_SECONDS - 15;
pub const RENEW_MIN_SECONDS: i64 = 10;
pub const CREDITS_LOW_THRESHOLD: i64 = 60;
/// A participant is evicted once its last metering tick is this many
/// heartbeat intervals old.
pub const EVICTION_INTERVALS: u64 = 3;
/// A broadcaster is considered offline after this many missed heartbeats.
pub const BROADCASTER_OFFLINE_INTERVALS: u64 = 3;
/// How often the in-process attestation sweeper runs while serving (spec
/// §4.6 "every few minutes"); operators who prefer external cron instead
/// use the `sweep` CLI subcommand.
pub const SWEEP_INTERVAL_SECONDS: u64 = 180;

#[derive(Clone)]
pub struct Config {
    /// HMAC key for session tokens and media tokens.
    pub jwt_secret: String,
    pub agora_app_id: String,
    pub agora_app_certificate: String,
    /// Attestation sweeper no-ops when unset, per spec §6.
    pub oracle_private_key: Option<String>,
    pub song_registry_admin_token: String,
    pub data_dir: std::path::PathBuf,
}

impl Config {
    /// Resolve configuration from the environment. Mirrors the teacher's
    /// `RuntimeConfig::from_cli` resolution-order pattern, generalized from
    /// CLI-arg-or-env to env-var-with-default.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (use `voice-control-plane gen-secret` to create one)")?;
        if jwt_secret.len() < 16 {
            bail!("JWT_SECRET must be at least 16 bytes");
        }

        // A dummy all-zero value is a valid placeholder per spec §9.
        let agora_app_id =
            std::env::var("AGORA_APP_ID").unwrap_or_else(|_| "0".repeat(32));
        let agora_app_certificate =
            std::env::var("AGORA_APP_CERTIFICATE").unwrap_or_else(|_| "0".repeat(32));

        let oracle_private_key = std::env::var("ORACLE_PRIVATE_KEY").ok().filter(|s| !s.is_empty());
        let song_registry_admin_token =
            std::env::var("SONG_REGISTRY_ADMIN_TOKEN").unwrap_or_default();

        let data_dir = std::env::var("VCP_DATA_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("./data"));

        Ok(Config {
            jwt_secret,
            agora_app_id,
            agora_app_certificate,
            oracle_private_key,
            song_registry_admin_token,
            data_dir,
        })
    }
}
