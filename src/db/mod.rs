//! The tabular store (spec §6 "External collaborators: Tabular store"):
//! append-only ledger plus structured tables for rooms, participants,
//! entitlements, nonces, and the song registry. One SQLite connection,
//! guarded by an async mutex since handlers hold it across awaits.

use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

pub type Db = Arc<Mutex<Connection>>;

pub fn open(path: &std::path::Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating data directory")?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite at {}", path.display()))?;

    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nonces (
            wallet     TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            wallet        TEXT NOT NULL,
            delta_seconds INTEGER NOT NULL,
            reason        TEXT NOT NULL,
            source_id     TEXT NOT NULL,
            at            INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_wallet ON ledger_entries(wallet);

        CREATE TABLE IF NOT EXISTS rooms (
            room_id      TEXT PRIMARY KEY,
            kind         TEXT NOT NULL,
            host_wallet  TEXT NOT NULL,
            status       TEXT NOT NULL,
            channel      TEXT NOT NULL,
            capacity     INTEGER NOT NULL,
            created_at   INTEGER NOT NULL,
            closed_at    INTEGER,
            extra_json   TEXT
        );

        CREATE TABLE IF NOT EXISTS participants (
            room_id          TEXT NOT NULL,
            connection_id    TEXT NOT NULL,
            wallet           TEXT NOT NULL,
            vendor_uid       INTEGER NOT NULL,
            joined_at        INTEGER NOT NULL,
            last_metered_at  INTEGER NOT NULL,
            debited_seconds  INTEGER NOT NULL,
            warned_low       INTEGER NOT NULL,
            exhausted        INTEGER NOT NULL,
            left_at          INTEGER,
            PRIMARY KEY (room_id, connection_id)
        );

        CREATE TABLE IF NOT EXISTS entitlements (
            room_id      TEXT NOT NULL,
            segment_id   TEXT NOT NULL,
            wallet       TEXT NOT NULL,
            scope        TEXT NOT NULL,
            granted_at   INTEGER NOT NULL,
            expires_at   INTEGER NOT NULL,
            PRIMARY KEY (room_id, segment_id, wallet, scope)
        );

        CREATE TABLE IF NOT EXISTS payment_signatures (
            challenge_resource TEXT NOT NULL,
            wallet             TEXT NOT NULL,
            received_at        INTEGER NOT NULL,
            PRIMARY KEY (challenge_resource, wallet)
        );

        CREATE TABLE IF NOT EXISTS song_registry (
            song_id                TEXT PRIMARY KEY,
            title                  TEXT NOT NULL,
            artist                 TEXT NOT NULL,
            upstream_ip_id         TEXT NOT NULL,
            controller_wallet      TEXT NOT NULL,
            payout_chain           TEXT NOT NULL,
            payout_address         TEXT NOT NULL,
            upstream_royalty_bps   INTEGER NOT NULL,
            attestation_signature  TEXT NOT NULL,
            license_preset         TEXT
        );

        CREATE TABLE IF NOT EXISTS sweep_failures (
            room_id      TEXT PRIMARY KEY,
            reason       TEXT NOT NULL,
            attempted_at INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}
