use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agent::AgentOrchestrator;
use crate::auth::Authenticator;
use crate::config::Config;
use crate::db::Db;
use crate::ledger::CreditLedger;
use crate::media::MediaTokenMinter;
use crate::payment::PaymentGate;
use crate::room::{self, RoomRegistry, RoomServices};
use crate::sweeper::AttestationSweeper;

use super::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
}

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub db: Db,
    pub auth: Arc<Authenticator>,
    pub ledger: Arc<CreditLedger>,
    pub media: Arc<MediaTokenMinter>,
    pub payment: Arc<PaymentGate>,
    pub rooms: RoomRegistry,
    pub sweeper: Arc<AttestationSweeper>,
    pub agent: Arc<dyn AgentOrchestrator>,
    pub last_sweep_at: Option<i64>,
}

impl AppStateInner {
    /// The shared collaborators a Room Actor needs, bundled cheaply (every
    /// field is an `Arc`) so handlers can hand them to `room::actor` calls
    /// without holding the `AppState` lock across an actor's own lock.
    pub fn room_services(&self) -> RoomServices {
        RoomServices {
            db: self.db.clone(),
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            media: self.media.clone(),
            payment: self.payment.clone(),
            agent: self.agent.clone(),
        }
    }

    /// Looks up a room handle, rehydrating it from the tabular store on a
    /// registry miss (e.g. after a process restart) instead of reporting
    /// `room_not_initialized` for a room that genuinely exists durably.
    /// Resumes the free-room heartbeat alarm if the rehydrated room still
    /// has live participants.
    pub async fn lookup_room(&self, room_id: &str) -> Result<Arc<room::RoomHandle>, ApiError> {
        let handle = self
            .rooms
            .get_or_rehydrate(&self.db, room_id)
            .await?
            .ok_or(ApiError::RoomNotInitialized)?;
        room::actor::resume_if_needed(&handle, &self.room_services()).await;
        Ok(handle)
    }
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: Db,
        auth: Arc<Authenticator>,
        ledger: Arc<CreditLedger>,
        media: Arc<MediaTokenMinter>,
        payment: Arc<PaymentGate>,
        sweeper: Arc<AttestationSweeper>,
        agent: Arc<dyn AgentOrchestrator>,
    ) -> Self {
        AppState {
            inner: Arc::new(RwLock::new(AppStateInner {
                config,
                db,
                auth,
                ledger,
                media,
                payment,
                rooms: RoomRegistry::new(),
                sweeper,
                agent,
                last_sweep_at: None,
            })),
        }
    }
}
