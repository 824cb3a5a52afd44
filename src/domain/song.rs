use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongRegistryEntry {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub upstream_ip_id: String,
    pub controller_wallet: String,
    pub payout_chain: String,
    pub payout_address: String,
    pub upstream_royalty_bps: u16,
    pub attestation_signature: String,
    pub license_preset: Option<String>,
}
