//! Nonce issuance and consumption (spec §4.1). One unconsumed nonce per
//! wallet, most-recent wins, bounded TTL, consumed only after the signature
//! check passes.

use anyhow::{Context, Result};
use rand::RngCore;
use rusqlite::OptionalExtension;

use crate::db::Db;
use crate::domain::{Wallet, now};

/// A nonce older than this is rejected even if still present in the table.
pub const NONCE_TTL_SECONDS: i64 = 300;

pub struct NonceStore {
    db: Db,
}

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("nonce_expired")]
    Expired,
    #[error("nonce_unknown")]
    Unknown,
}

impl NonceStore {
    pub fn new(db: Db) -> Self {
        NonceStore { db }
    }

    /// Generates a fresh nonce for `wallet`, superseding any prior one.
    pub async fn request(&self, wallet: &Wallet) -> Result<String> {
        let value = random_hex(32);
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO nonces (wallet, value, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(wallet) DO UPDATE SET value = excluded.value, created_at = excluded.created_at",
            rusqlite::params![wallet.as_str(), value, now()],
        )
        .context("storing nonce")?;
        Ok(value)
    }

    /// Looks up the current nonce for `wallet` without consuming it, so the
    /// caller can verify the signature before mutating any state.
    pub async fn peek(&self, wallet: &Wallet) -> Result<Option<(String, i64)>, NonceError> {
        let conn = self.db.lock().await;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, created_at FROM nonces WHERE wallet = ?1",
                rusqlite::params![wallet.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|_| NonceError::Unknown)?;
        Ok(row)
    }

    /// Validates `submitted` is the live nonce for `wallet`, unexpired, then
    /// deletes it. Call only after the signature over `submitted` verifies.
    pub async fn consume(&self, wallet: &Wallet, submitted: &str) -> Result<(), NonceError> {
        let conn = self.db.lock().await;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, created_at FROM nonces WHERE wallet = ?1",
                rusqlite::params![wallet.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|_| NonceError::Unknown)?;

        let (value, created_at) = row.ok_or(NonceError::Unknown)?;
        if value != submitted {
            return Err(NonceError::Unknown);
        }
        if now() - created_at > NONCE_TTL_SECONDS {
            conn.execute("DELETE FROM nonces WHERE wallet = ?1", rusqlite::params![wallet.as_str()])
                .ok();
            return Err(NonceError::Expired);
        }

        conn.execute("DELETE FROM nonces WHERE wallet = ?1", rusqlite::params![wallet.as_str()])
            .map_err(|_| NonceError::Unknown)?;
        Ok(())
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn most_recent_nonce_wins() {
        let db = crate::db::open_in_memory().unwrap();
        let store = NonceStore::new(db);
        let wallet = Wallet::from("0xabc");

        let first = store.request(&wallet).await.unwrap();
        let second = store.request(&wallet).await.unwrap();
        assert_ne!(first, second);

        assert!(store.consume(&wallet, &first).await.is_err());
        assert!(store.consume(&wallet, &second).await.is_ok());
    }

    #[tokio::test]
    async fn consumed_nonce_cannot_be_reused() {
        let db = crate::db::open_in_memory().unwrap();
        let store = NonceStore::new(db);
        let wallet = Wallet::from("0xabc");

        let nonce = store.request(&wallet).await.unwrap();
        store.consume(&wallet, &nonce).await.unwrap();
        assert!(matches!(
            store.consume(&wallet, &nonce).await.unwrap_err(),
            NonceError::Unknown
        ));
    }
}
