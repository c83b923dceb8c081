//! Game core for the cultivation server: reference catalog, resource
//! write-back cache, spirit accrual, battles, progression, equipment and
//! pets, and the offline cleanup pipeline.

pub mod attributes;
pub mod battle;
pub mod catalog;
pub mod cleanup;
pub mod db;
pub mod equipment;
pub mod error;
pub mod keys;
pub mod pets;
pub mod progression;
pub mod purge;
pub mod resources;
pub mod service;
pub mod spirit;
pub mod stats;

pub use attributes::CombatBundle;
pub use battle::{BattleConfig, BattleEngine, RoundData, SessionKey};
pub use catalog::Catalog;
pub use cleanup::CleanupWorker;
pub use error::{ErrorCategory, GameError};
pub use purge::CachePurgeJob;
pub use resources::{ResourceCache, ResourceSyncJob};
pub use service::{BattleRecordView, GameServices, PlayerView, ServicesConfig};
pub use spirit::{SpiritAccrualJob, SpiritEngine};

/// Round to one decimal place, as every pushed amount is.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::ops::Deref;
    use std::sync::Arc;

    use cache::{CacheStore, Clock, ManualClock};
    use player_db::PlayerDb;
    use presence::{OfflineRx, PlayerId};

    use crate::catalog::Catalog;
    use crate::db::with_db;
    use crate::service::{GameServices, ServicesConfig};

    pub const T0: i64 = 1_700_000_000_000;

    /// In-memory services on a manual clock.
    pub struct TestWorld {
        pub clock: Arc<ManualClock>,
        pub services: GameServices,
        pub offline_rx: OfflineRx,
    }

    impl TestWorld {
        pub fn new() -> Self {
            Self::with_catalog(Catalog::default())
        }

        pub fn with_catalog(catalog: Catalog) -> Self {
            let clock = ManualClock::new(T0);
            let cache = Arc::new(CacheStore::new(clock.clone()));
            let db = PlayerDb::open_memory().expect("in-memory db");
            let (services, offline_rx) = GameServices::new(&ServicesConfig::default(), cache, db, catalog);
            Self {
                clock,
                services,
                offline_rx,
            }
        }
    }

    impl Deref for TestWorld {
        type Target = GameServices;

        fn deref(&self) -> &GameServices {
            &self.services
        }
    }

    /// Create a player row directly, bypassing validation.
    pub fn register_player(world: &TestWorld, name: &str, catalog: &Catalog) -> PlayerId {
        let starter = catalog.new_player(world.clock.now_millis());
        with_db(&world.db, |db| db.player().create(name, "secret", &starter))
            .expect("register")
            .id
    }
}
