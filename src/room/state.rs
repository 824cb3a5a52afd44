//! The durable, in-memory state a Room Actor owns: the `Room` record, its
//! `Participants` map, and — for duet rooms — the extra paid-room fields.
//! Mutated exclusively by the owning actor (spec §4.5); mirrored to the
//! tabular store on every change that matters for crash recovery.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use rusqlite::OptionalExtension;

use crate::db::Db;
use crate::domain::room::{
    ConnectionId, DuetRoomExtra, Participant, RoomId, RoomKind, RoomRecord, RoomStatus,
};
use crate::domain::{Wallet, now};
use crate::ledger::CreditLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    CreditsLow,
    CreditsExhausted,
}

pub struct RoomDescriptor {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub host_wallet: Wallet,
    pub channel: String,
    pub capacity: u32,
    pub duet_extra: Option<DuetRoomExtra>,
}

pub struct Room {
    pub record: RoomRecord,
    pub participants: HashMap<ConnectionId, Participant>,
    pub duet: Option<DuetRoomExtra>,
    /// Set while the AI-agent sidecar is running for this room (spec §4.5
    /// "Triggers AI-agent start ... on the transition 0 → 1 participants").
    /// Runtime-only: the orchestrator is an external, contract-only
    /// collaborator (spec §1), so there is nothing durable to recover here
    /// across a process restart — a fresh `start` call is idempotent anyway.
    pub agent_id: Option<String>,
}

impl Room {
    pub fn new(descriptor: RoomDescriptor) -> Self {
        Room {
            record: RoomRecord {
                room_id: descriptor.room_id,
                kind: descriptor.kind,
                host_wallet: descriptor.host_wallet,
                status: RoomStatus::Pending,
                channel: descriptor.channel,
                capacity: descriptor.capacity,
                created_at: now(),
                closed_at: None,
            },
            participants: HashMap::new(),
            duet: descriptor.duet_extra,
            agent_id: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.record.capacity
    }

    /// Meters a single participant against the Credit Ledger (spec §4.5
    /// "Metering"). Free rooms only; paid rooms have no per-second billing.
    pub async fn meter(
        &mut self,
        ledger: &CreditLedger,
        connection_id: &str,
        credits_low_threshold: i64,
    ) -> Result<(i64, i64, Vec<Event>)> {
        let participant = self
            .participants
            .get_mut(connection_id)
            .context("unknown connection")?;

        let elapsed = now() - participant.last_metered_at;
        if elapsed <= 0 {
            let balance = ledger.get_balance(&participant.wallet).await?;
            return Ok((0, balance.remaining_seconds, Vec::new()));
        }

        let outcome = ledger.debit(&participant.wallet, elapsed, connection_id).await?;
        // Only advance the clock once the debit is durably recorded, so a
        // failed append does not lose time (spec §4.5 "Failure semantics").
        participant.last_metered_at = now();
        participant.debited_seconds += outcome.debited;

        let mut events = Vec::new();
        if outcome.remaining <= credits_low_threshold && !participant.warned_low {
            participant.warned_low = true;
            events.push(Event::CreditsLow);
        }
        if outcome.remaining <= 0 && !participant.exhausted {
            participant.exhausted = true;
            events.push(Event::CreditsExhausted);
        }

        Ok((outcome.debited, outcome.remaining, events))
    }

    pub fn mark_left(&mut self, connection_id: &str) -> Option<Participant> {
        self.participants.remove(connection_id)
    }

    /// Mirrors the current record/participant snapshot into the shared
    /// tabular store (spec §4.5 "Persist participant state ... to the
    /// shared tabular store").
    pub async fn persist(&self, db: &crate::db::Db) -> Result<()> {
        let conn = db.lock().await;
        let extra_json = match &self.duet {
            Some(extra) => Some(serde_json::to_string(extra)?),
            None => None,
        };
        conn.execute(
            "INSERT INTO rooms (room_id, kind, host_wallet, status, channel, capacity, created_at, closed_at, extra_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(room_id) DO UPDATE SET
                status = excluded.status, closed_at = excluded.closed_at, extra_json = excluded.extra_json",
            rusqlite::params![
                self.record.room_id,
                kind_str(self.record.kind),
                self.record.host_wallet.as_str(),
                status_str(self.record.status),
                self.record.channel,
                self.record.capacity,
                self.record.created_at,
                self.record.closed_at,
                extra_json,
            ],
        )?;

        for participant in self.participants.values() {
            conn.execute(
                "INSERT INTO participants
                    (room_id, connection_id, wallet, vendor_uid, joined_at, last_metered_at, debited_seconds, warned_low, exhausted, left_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)
                 ON CONFLICT(room_id, connection_id) DO UPDATE SET
                    last_metered_at = excluded.last_metered_at,
                    debited_seconds = excluded.debited_seconds,
                    warned_low = excluded.warned_low,
                    exhausted = excluded.exhausted",
                rusqlite::params![
                    self.record.room_id,
                    participant.connection_id,
                    participant.wallet.as_str(),
                    participant.vendor_uid,
                    participant.joined_at,
                    participant.last_metered_at,
                    participant.debited_seconds,
                    participant.warned_low,
                    participant.exhausted,
                ],
            )?;
        }
        Ok(())
    }

    pub async fn mark_participant_left_in_store(&self, db: &crate::db::Db, connection_id: &str) -> Result<()> {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE participants SET left_at = ?1 WHERE room_id = ?2 AND connection_id = ?3",
            rusqlite::params![now(), self.record.room_id, connection_id],
        )?;
        Ok(())
    }

    /// Rehydrates a `Room` from the tabular store (spec SPEC_FULL §3: "the
    /// tables exist for durability across process restarts"). Reconstructs
    /// the still-present (not-`left_at`) participant set and, for duet
    /// rooms, `DuetRoomExtra` from `extra_json`. Returns `None` if no row
    /// exists for `room_id`.
    pub async fn load(db: &Db, room_id: &str) -> Result<Option<Room>> {
        let row: Option<(String, String, String, String, u32, i64, Option<i64>, Option<String>)> = {
            let conn = db.lock().await;
            conn.query_row(
                "SELECT kind, host_wallet, status, channel, capacity, created_at, closed_at, extra_json
                 FROM rooms WHERE room_id = ?1",
                rusqlite::params![room_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .context("loading room for rehydration")?
        };

        let Some((kind_s, host_wallet, status_s, channel, capacity, created_at, closed_at, extra_json)) = row else {
            return Ok(None);
        };

        let record = RoomRecord {
            room_id: room_id.to_string(),
            kind: parse_kind(&kind_s)?,
            host_wallet: Wallet::from(host_wallet),
            status: parse_status(&status_s)?,
            channel,
            capacity,
            created_at,
            closed_at,
        };

        let duet = match extra_json {
            Some(json) => Some(serde_json::from_str::<DuetRoomExtra>(&json).context("parsing persisted duet extra state")?),
            None => None,
        };

        let participants = load_participants(db, room_id).await?;

        Ok(Some(Room {
            record,
            participants,
            duet,
            agent_id: None,
        }))
    }
}

async fn load_participants(db: &Db, room_id: &str) -> Result<HashMap<ConnectionId, Participant>> {
    let conn = db.lock().await;
    let mut stmt = conn.prepare(
        "SELECT connection_id, wallet, vendor_uid, joined_at, last_metered_at, debited_seconds, warned_low, exhausted
         FROM participants WHERE room_id = ?1 AND left_at IS NULL",
    )?;
    let rows = stmt.query_map(rusqlite::params![room_id], |row| {
        Ok(Participant {
            connection_id: row.get(0)?,
            wallet: Wallet::from(row.get::<_, String>(1)?),
            vendor_uid: row.get(2)?,
            joined_at: row.get(3)?,
            last_metered_at: row.get(4)?,
            debited_seconds: row.get(5)?,
            warned_low: row.get(6)?,
            exhausted: row.get(7)?,
        })
    })?;

    let mut participants = HashMap::new();
    for row in rows {
        let participant = row.context("reading persisted participant row")?;
        participants.insert(participant.connection_id.clone(), participant);
    }
    Ok(participants)
}

fn parse_kind(s: &str) -> Result<RoomKind> {
    match s {
        "free" => Ok(RoomKind::Free),
        "duet" => Ok(RoomKind::Duet),
        other => bail!("unknown persisted room kind: {other}"),
    }
}

fn parse_status(s: &str) -> Result<RoomStatus> {
    match s {
        "pending" => Ok(RoomStatus::Pending),
        "active" => Ok(RoomStatus::Active),
        "closed" => Ok(RoomStatus::Closed),
        "ended" => Ok(RoomStatus::Ended),
        other => bail!("unknown persisted room status: {other}"),
    }
}

pub fn kind_str(kind: RoomKind) -> &'static str {
    match kind {
        RoomKind::Free => "free",
        RoomKind::Duet => "duet",
    }
}

pub fn status_str(status: RoomStatus) -> &'static str {
    match status {
        RoomStatus::Pending => "pending",
        RoomStatus::Active => "active",
        RoomStatus::Closed => "closed",
        RoomStatus::Ended => "ended",
    }
}
