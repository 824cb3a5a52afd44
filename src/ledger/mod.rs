//! Credit Ledger (C2, spec §4.2): an append-only accounting log with atomic,
//! per-wallet debits. The ledger decides nothing about rooms or thresholds —
//! it is a pure accountant over its own log.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::db::Db;
use crate::domain::ledger::{Balance, LedgerReason};
use crate::domain::{Wallet, now};

/// One lock per wallet so unrelated wallets' debits never contend with each
/// other (spec §5: "serialises per wallet, not per room").
pub struct CreditLedger {
    db: Db,
    wallet_locks: DashMap<Wallet, Arc<Mutex<()>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebitOutcome {
    pub debited: i64,
    pub remaining: i64,
}

impl CreditLedger {
    pub fn new(db: Db) -> Self {
        CreditLedger {
            db,
            wallet_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, wallet: &Wallet) -> Arc<Mutex<()>> {
        self.wallet_locks
            .entry(wallet.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn topup(&self, wallet: &Wallet, seconds: i64, source_id: &str) -> Result<()> {
        let guard = self.lock_for(wallet);
        let _permit = guard.lock().await;
        self.append(wallet, seconds, LedgerReason::Topup, source_id).await
    }

    /// Atomically debits up to `seconds` from `wallet`'s balance. Never
    /// drives the balance negative; the shortfall is silently discarded,
    /// per spec (`debited < seconds` is a valid, non-error outcome).
    pub async fn debit(&self, wallet: &Wallet, seconds: i64, source_id: &str) -> Result<DebitOutcome> {
        let guard = self.lock_for(wallet);
        let _permit = guard.lock().await;

        let before = self.projection(wallet).await?.remaining_seconds.max(0);
        let debited = seconds.min(before);
        if debited > 0 {
            self.append(wallet, -debited, LedgerReason::Debit, source_id).await?;
        }
        Ok(DebitOutcome {
            debited,
            remaining: before - debited,
        })
    }

    pub async fn refund(&self, wallet: &Wallet, seconds: i64, source_id: &str) -> Result<()> {
        let guard = self.lock_for(wallet);
        let _permit = guard.lock().await;
        self.append(wallet, seconds, LedgerReason::Refund, source_id).await
    }

    pub async fn get_balance(&self, wallet: &Wallet) -> Result<Balance> {
        self.projection(wallet).await
    }

    async fn projection(&self, wallet: &Wallet) -> Result<Balance> {
        let conn = self.db.lock().await;
        let (remaining, total_debited): (i64, i64) = conn
            .query_row(
                "SELECT
                    COALESCE(SUM(delta_seconds), 0),
                    COALESCE(SUM(CASE WHEN delta_seconds < 0 THEN -delta_seconds ELSE 0 END), 0)
                 FROM ledger_entries WHERE wallet = ?1",
                rusqlite::params![wallet.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("projecting ledger balance")?;
        Ok(Balance {
            remaining_seconds: remaining,
            total_debited_seconds: total_debited,
        })
    }

    async fn append(&self, wallet: &Wallet, delta_seconds: i64, reason: LedgerReason, source_id: &str) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO ledger_entries (wallet, delta_seconds, reason, source_id, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                wallet.as_str(),
                delta_seconds,
                reason.as_str(),
                source_id,
                now(),
            ],
        )
        .context("appending ledger entry")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debit_never_goes_negative() {
        let db = crate::db::open_in_memory().unwrap();
        let ledger = CreditLedger::new(db);
        let wallet = Wallet::from("0xabc");

        ledger.topup(&wallet, 80, "topup-1").await.unwrap();
        let outcome = ledger.debit(&wallet, 120, "conn-1").await.unwrap();
        assert_eq!(outcome.debited, 80);
        assert_eq!(outcome.remaining, 0);

        let balance = ledger.get_balance(&wallet).await.unwrap();
        assert_eq!(balance.remaining_seconds, 0);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let db = crate::db::open_in_memory().unwrap();
        let ledger = Arc::new(CreditLedger::new(db));
        let wallet = Wallet::from("0xabc");
        ledger.topup(&wallet, 80, "topup-1").await.unwrap();

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
        assert_eq!(a.remaining.min(b.remaining), 0);
        let balance = ledger.get_balance(&wallet).await.unwrap();
        assert_eq!(balance.remaining_seconds, 0);
    }
}
