use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementScope {
    Live,
    Replay,
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub room_id: String,
    pub segment_id: String,
    pub wallet: String,
    pub scope: EntitlementScope,
    pub granted_at: i64,
    pub expires_at: i64,
}
