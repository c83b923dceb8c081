pub mod battle_record;
pub mod db;
pub mod equipment;
pub mod error;
pub mod inventory;
pub mod pet;
pub mod player;
mod schema;

pub use battle_record::{BattleKind, BattleRecord, BattleRecordRepo, BattleResult, NewBattleRecord};
pub use db::{Loot, PlayerDb, VictoryGrant, VictoryOutcome};
pub use equipment::{EquipmentRecord, EquipmentRepo, NewEquipment};
pub use error::PlayerDbError;
pub use inventory::{HerbRepo, HerbStack, PillFragmentRepo};
pub use pet::{NewPet, PetRecord, PetRepo};
pub use player::{NewPlayer, PlayerRecord, PlayerRepo};
