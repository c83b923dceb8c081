//! Turn-based PvP and PvE fights persisted in the cache between steps.

pub mod engine;
pub mod formula;
pub mod rewards;
pub mod session;

pub use engine::{day_start_millis, BattleConfig, BattleEngine, RoundData};
pub use rewards::{RewardItem, RewardKind, VictoryRewards};
pub use session::{BattleSession, Combatant, SessionKey};
