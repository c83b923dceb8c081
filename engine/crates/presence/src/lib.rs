//! Online presence: who is connected, heartbeat liveness, and the
//! "player-went-offline" notifications that drive cleanup.

pub mod error;
pub mod keys;
pub mod sweep;
pub mod tracker;

/// Opaque numeric player identity shared by every layer.
pub type PlayerId = i64;

pub use error::PresenceError;
pub use keys::{presence_key, ONLINE_SET_KEY};
pub use sweep::PresenceSweepJob;
pub use tracker::{
    offline_channel, OfflineEvent, OfflineReason, OfflineRx, OfflineTx, PresenceConfig, PresenceEntry,
    PresenceStatus, PresenceTracker,
};
