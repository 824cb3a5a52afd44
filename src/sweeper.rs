//! Attestation Sweeper (C6, spec §4.6). Scheduled reconciliation of ended,
//! unattested paid rooms: assemble a session summary, sign it with the
//! oracle key, submit to the external settlement path, and mark the room
//! attested on success. Idempotent — a room already marked attested is
//! never resubmitted, and a failed submit is retried on the next pass.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rusqlite::OptionalExtension;
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::db::Db;
use crate::domain::now;
use crate::domain::room::DuetRoomExtra;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub room_id: String,
    pub host: String,
    pub guest: Option<String>,
    pub total_live_entitlements: u64,
    pub total_replay_entitlements: u64,
    pub blob_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attestation {
    pub summary: SessionSummary,
    pub signature: String,
}

/// The external settlement path. No-ops gracefully when no oracle key is
/// configured (spec SPEC_FULL §2 "Config"), so a deployment can run without
/// on-chain settlement wired up yet.
pub trait SettlementSubmitter: Send + Sync {
    fn submit(&self, attestation: &Attestation) -> Result<()>;
}

pub struct NoopSettlementSubmitter;

impl SettlementSubmitter for NoopSettlementSubmitter {
    fn submit(&self, attestation: &Attestation) -> Result<()> {
        info!(room_id = %attestation.summary.room_id, "no settlement submitter configured, treating as submitted");
        Ok(())
    }
}

pub struct AttestationSweeper {
    db: Db,
    oracle_key: Option<String>,
    submitter: Box<dyn SettlementSubmitter>,
}

impl AttestationSweeper {
    pub fn new(db: Db, oracle_key: Option<String>, submitter: Box<dyn SettlementSubmitter>) -> Self {
        AttestationSweeper { db, oracle_key, submitter }
    }

    /// One sweep pass. Returns the number of rooms successfully attested.
    pub async fn sweep(&self) -> Result<u64> {
        let Some(oracle_key) = &self.oracle_key else {
            info!("attestation sweep skipped: no oracle key configured");
            return Ok(0);
        };

        let candidates = self.ended_unattested_rooms().await?;
        let mut attested = 0;

        for room_id in candidates {
            match self.attest_one(&room_id, oracle_key).await {
                Ok(()) => {
                    attested += 1;
                    info!(room_id, "attestation submitted");
                }
                Err(err) => {
                    warn!(room_id, %err, "attestation submission failed, will retry next sweep");
                    self.record_failure(&room_id, &err.to_string()).await.ok();
                }
            }
        }
        Ok(attested)
    }

    async fn ended_unattested_rooms(&self) -> Result<Vec<String>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT room_id FROM rooms WHERE kind = 'duet' AND status = 'ended'
             AND (extra_json IS NULL OR json_extract(extra_json, '$.attested_at') IS NULL)",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("scanning for unattested rooms")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    async fn attest_one(&self, room_id: &str, oracle_key: &str) -> Result<()> {
        let (host, extra_json): (String, Option<String>) = {
            let conn = self.db.lock().await;
            conn.query_row(
                "SELECT host_wallet, extra_json FROM rooms WHERE room_id = ?1",
                rusqlite::params![room_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("loading room for attestation")?
            .context("room disappeared mid-sweep")?
        };

        let mut extra: DuetRoomExtra = match &extra_json {
            Some(json) => serde_json::from_str(json).context("parsing room extra state")?,
            None => DuetRoomExtra::default(),
        };

        let (total_live, total_replay) = self.entitlement_counts(room_id).await?;
        let summary = SessionSummary {
            room_id: room_id.to_string(),
            host,
            guest: extra.guest_wallet.as_ref().map(|w| w.as_str().to_string()),
            total_live_entitlements: total_live,
            total_replay_entitlements: total_replay,
            blob_ref: extra.replay_blob_ref.clone(),
        };

        let signature = sign_summary(&summary, oracle_key)?;
        let attestation = Attestation { summary, signature };
        self.submitter.submit(&attestation)?;

        extra.attested_at = Some(now());
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE rooms SET extra_json = ?1 WHERE room_id = ?2",
            rusqlite::params![serde_json::to_string(&extra)?, room_id],
        )?;
        Ok(())
    }

    async fn entitlement_counts(&self, room_id: &str) -> Result<(u64, u64)> {
        let conn = self.db.lock().await;
        let live: u64 = conn.query_row(
            "SELECT COUNT(*) FROM entitlements WHERE room_id = ?1 AND scope = 'live'",
            rusqlite::params![room_id],
            |row| row.get(0),
        )?;
        let replay: u64 = conn.query_row(
            "SELECT COUNT(*) FROM entitlements WHERE room_id = ?1 AND scope = 'replay'",
            rusqlite::params![room_id],
            |row| row.get(0),
        )?;
        Ok((live, replay))
    }

    async fn record_failure(&self, room_id: &str, reason: &str) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO sweep_failures (room_id, reason, attempted_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(room_id) DO UPDATE SET reason = excluded.reason, attempted_at = excluded.attempted_at",
            rusqlite::params![room_id, reason, now()],
        )?;
        Ok(())
    }
}

fn sign_summary(summary: &SessionSummary, oracle_key: &str) -> Result<String> {
    let payload = serde_json::to_vec(summary)?;
    let mut mac = HmacSha256::new_from_slice(oracle_key.as_bytes()).context("building oracle HMAC")?;
    mac.update(&payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSubmitter(Arc<AtomicUsize>);
    impl SettlementSubmitter for CountingSubmitter {
        fn submit(&self, _attestation: &Attestation) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn skips_when_no_oracle_key_configured() {
        let db = crate::db::open_in_memory().unwrap();
        let sweeper = AttestationSweeper::new(db, None, Box::new(NoopSettlementSubmitter));
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn attests_ended_duet_rooms_exactly_once() {
        let db = crate::db::open_in_memory().unwrap();
        {
            let conn = db.lock().await;
            conn.execute(
                "INSERT INTO rooms (room_id, kind, host_wallet, status, channel, capacity, created_at, closed_at, extra_json)
                 VALUES ('room-1', 'duet', '0xhost', 'ended', 'chan-1', 2, 0, 100, NULL)",
                [],
            ).unwrap();
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let sweeper = AttestationSweeper::new(db, Some("oracle-secret".into()), Box::new(CountingSubmitter(counter.clone())));

        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Idempotent: second pass finds nothing left to attest.
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
