pub mod entitlement;
pub mod ledger;
pub mod room;
pub mod song;
pub mod wallet;

pub use wallet::Wallet;

/// Current unix timestamp in seconds. Centralized so tests can see where
/// wall-clock time enters the system.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
