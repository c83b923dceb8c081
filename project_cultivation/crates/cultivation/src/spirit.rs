//! Passive spirit accrual for online players.
//!
//! The accrual tick is the only writer of `spirit` during accrual: the new
//! value and its anchor timestamp are persisted in one statement, so a
//! failed write leaves the anchor alone and the next tick retries the window.

use std::sync::Arc;

use cache::{Clock, SharedClock};
use engine_core::{JobOutcome, TickJob};
use net::protocol::{PushEvent, PushMessage, SpiritGrow};
use net::PushHub;
use presence::{PlayerId, PresenceStatus, PresenceTracker};

use crate::db::{with_db, SharedDb};
use crate::error::GameError;
use crate::round1;

/// Accruals closer together than this are skipped.
const MIN_ELAPSED_MILLIS: i64 = 1_000;

pub struct SpiritEngine {
    presence: Arc<PresenceTracker>,
    db: SharedDb,
    hub: Arc<PushHub>,
    clock: SharedClock,
    base_rate: f64,
}

impl SpiritEngine {
    pub fn new(
        presence: Arc<PresenceTracker>,
        db: SharedDb,
        hub: Arc<PushHub>,
        clock: SharedClock,
        base_rate: f64,
    ) -> Self {
        Self {
            presence,
            db,
            hub,
            clock,
            base_rate,
        }
    }

    /// Accrue for one player. `None` when the player went offline or less
    /// than a second has elapsed.
    pub fn accrue(&self, player_id: PlayerId) -> Result<Option<SpiritGrow>, GameError> {
        // A racing timeout may have removed the entry since the online scan.
        match self.presence.entry(player_id)? {
            Some(entry) if entry.status == PresenceStatus::Online => {}
            _ => return Ok(None),
        }

        let now = self.clock.now_millis();
        let base_rate = self.base_rate;
        let grow = with_db(&self.db, |db| {
            let player = db.player().load(player_id)?;
            let elapsed_ms = now - player.last_spirit_gain_time;
            if elapsed_ms < MIN_ELAPSED_MILLIS {
                return Ok(None);
            }
            let elapsed_seconds = elapsed_ms as f64 / 1000.0;
            let gain = round1(base_rate * player.spirit_rate * elapsed_seconds);
            let new_spirit = round1(player.spirit + gain);
            db.player().update_spirit(player_id, new_spirit, now)?;
            Ok(Some(SpiritGrow {
                user_id: player_id,
                old_spirit: round1(player.spirit),
                new_spirit,
                gain_amount: gain,
                spirit_rate: player.spirit_rate,
                elapsed_seconds: round1(elapsed_seconds),
                timestamp: now,
            }))
        })?;

        if let Some(grow) = &grow {
            self.push(grow.clone());
        }
        Ok(grow)
    }

    /// One pass over the online set.
    pub fn tick(&self) -> JobOutcome {
        let mut outcome = JobOutcome::default();
        let online = match self.presence.list_online() {
            Ok(online) => online,
            Err(e) => {
                tracing::error!("spirit tick: failed to list online players: {}", e);
                outcome.record(false);
                return outcome;
            }
        };

        for player_id in online {
            match self.accrue(player_id) {
                Ok(_) => outcome.record(true),
                Err(e) => {
                    tracing::error!(player_id, "spirit accrual failed, retrying next tick: {}", e);
                    outcome.record(false);
                }
            }
        }
        outcome
    }

    /// Anchor accrual at "now" so offline time is never credited.
    pub fn refresh_anchor(&self, player_id: PlayerId) -> Result<(), GameError> {
        let now = self.clock.now_millis();
        with_db(&self.db, |db| db.player().set_spirit_anchor(player_id, now))
    }

    /// Credit spirit outside the accrual tick (items, rewards). The amount is
    /// rounded to one decimal before it is stored, so the push matches the
    /// durable value.
    pub fn apply_gain(&self, player_id: PlayerId, amount: f64) -> Result<SpiritGrow, GameError> {
        let amount = round1(amount);
        if !amount.is_finite() || amount <= 0.0 {
            return Err(GameError::InvalidRequest("gain must be positive".into()));
        }
        let now = self.clock.now_millis();
        let (old_spirit, new_spirit, spirit_rate) = with_db(&self.db, |db| {
            let (old, new) = db.player().add_spirit(player_id, amount)?;
            let rate = db.player().load(player_id)?.spirit_rate;
            Ok((old, new, rate))
        })?;

        let grow = SpiritGrow {
            user_id: player_id,
            old_spirit: round1(old_spirit),
            new_spirit: round1(new_spirit),
            gain_amount: amount,
            spirit_rate,
            elapsed_seconds: 0.0,
            timestamp: now,
        };
        self.push(grow.clone());
        Ok(grow)
    }

    fn push(&self, grow: SpiritGrow) {
        let player_id = grow.user_id;
        let timestamp = grow.timestamp;
        self.hub
            .send(player_id, PushMessage::new(player_id, timestamp, PushEvent::SpiritGrow(grow)));
    }
}

/// Drives [`SpiritEngine::tick`] from a tick thread.
pub struct SpiritAccrualJob {
    engine: Arc<SpiritEngine>,
}

impl SpiritAccrualJob {
    pub fn new(engine: Arc<SpiritEngine>) -> Self {
        Self { engine }
    }
}

impl TickJob for SpiritAccrualJob {
    fn name(&self) -> &'static str {
        "spirit-accrual"
    }

    fn run_tick(&mut self, _tick: u64) -> JobOutcome {
        self.engine.tick()
    }
}
