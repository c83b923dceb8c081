use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cache::CacheStore;
use tokio::sync::mpsc;

use crate::error::PresenceError;
use crate::keys::{presence_key, ONLINE_SET_KEY};
use crate::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Snapshot of a `presence:{pid}` hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub player_id: PlayerId,
    pub login_time: i64,
    pub last_heartbeat: i64,
    pub status: PresenceStatus,
    pub addr: String,
}

impl PresenceEntry {
    fn from_hash(player_id: PlayerId, map: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            player_id,
            login_time: map.get("loginTime")?.parse().ok()?,
            last_heartbeat: map.get("lastHeartbeat")?.parse().ok()?,
            status: PresenceStatus::parse(map.get("status")?)?,
            addr: map.get("ip").cloned().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Silence longer than this marks a player offline.
    pub heartbeat_timeout: Duration,
    /// Sliding lifetime of the presence hash, refreshed on every heartbeat.
    pub entry_ttl: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(10),
            entry_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineReason {
    Logout,
    HeartbeatTimeout,
    /// The push transport went silent or closed.
    Disconnected,
}

/// "player-went-offline" notification consumed by the cleanup worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineEvent {
    pub player_id: PlayerId,
    pub reason: OfflineReason,
    pub at: i64,
}

pub type OfflineTx = mpsc::UnboundedSender<OfflineEvent>;
pub type OfflineRx = mpsc::UnboundedReceiver<OfflineEvent>;

pub fn offline_channel() -> (OfflineTx, OfflineRx) {
    mpsc::unbounded_channel()
}

/// Tracks who is connected.
///
/// State lives in the shared cache: one hash per player plus the global
/// `online-players` set. The set is only mutated through SADD/SREM so the
/// sweep, logins and logouts never clobber each other.
#[derive(Debug)]
pub struct PresenceTracker {
    cache: Arc<CacheStore>,
    config: PresenceConfig,
    offline_tx: Option<OfflineTx>,
}

impl PresenceTracker {
    pub fn new(cache: Arc<CacheStore>, config: PresenceConfig) -> Self {
        Self {
            cache,
            config,
            offline_tx: None,
        }
    }

    /// Attach the channel that receives offline notifications.
    pub fn with_offline_tx(mut self, tx: OfflineTx) -> Self {
        self.offline_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Mark a player online. Re-login of an online player refreshes the
    /// timestamps and address.
    pub fn login(&self, player_id: PlayerId, addr: &str) -> Result<PresenceEntry, PresenceError> {
        let now = self.cache.now_millis();
        let key = presence_key(player_id);
        self.cache.hset_many(
            &key,
            &[
                ("loginTime", now.to_string()),
                ("lastHeartbeat", now.to_string()),
                ("ip", addr.to_string()),
                ("status", PresenceStatus::Online.as_str().to_string()),
            ],
        )?;
        self.cache.expire(&key, self.config.entry_ttl)?;
        self.cache.sadd(ONLINE_SET_KEY, player_id.to_string())?;

        tracing::info!(player_id, addr, "player logged in");
        Ok(PresenceEntry {
            player_id,
            login_time: now,
            last_heartbeat: now,
            status: PresenceStatus::Online,
            addr: addr.to_string(),
        })
    }

    /// Record liveness. Fails with `NotOnline` when the entry is gone or
    /// already marked offline; the client must log in again.
    pub fn heartbeat(&self, player_id: PlayerId) -> Result<(), PresenceError> {
        let key = presence_key(player_id);
        match self.entry(player_id)? {
            Some(entry) if entry.status == PresenceStatus::Online => {}
            _ => return Err(PresenceError::NotOnline(player_id)),
        }
        let now = self.cache.now_millis();
        self.cache.hset(&key, "lastHeartbeat", now.to_string())?;
        self.cache.expire(&key, self.config.entry_ttl)?;
        tracing::trace!(player_id, "heartbeat");
        Ok(())
    }

    /// Explicit logout. Returns whether the player was online.
    pub fn logout(&self, player_id: PlayerId) -> Result<bool, PresenceError> {
        self.mark_offline(player_id, OfflineReason::Logout)
    }

    /// The push transport for this player closed or went silent.
    pub fn disconnect(&self, player_id: PlayerId) -> Result<bool, PresenceError> {
        self.mark_offline(player_id, OfflineReason::Disconnected)
    }

    fn mark_offline(&self, player_id: PlayerId, reason: OfflineReason) -> Result<bool, PresenceError> {
        let key = presence_key(player_id);
        let was_member = self.cache.srem(ONLINE_SET_KEY, &player_id.to_string())?;
        self.cache
            .hset_existing(&key, "status", PresenceStatus::Offline.as_str())?;
        if was_member {
            tracing::info!(player_id, ?reason, "player went offline");
            self.publish(player_id, reason);
        }
        Ok(was_member)
    }

    pub fn is_online(&self, player_id: PlayerId) -> Result<bool, PresenceError> {
        if !self.cache.sismember(ONLINE_SET_KEY, &player_id.to_string())? {
            return Ok(false);
        }
        Ok(matches!(
            self.entry(player_id)?,
            Some(PresenceEntry {
                status: PresenceStatus::Online,
                ..
            })
        ))
    }

    /// Members of `online-players`, ascending.
    pub fn list_online(&self) -> Result<Vec<PlayerId>, PresenceError> {
        let mut ids: Vec<PlayerId> = self
            .cache
            .smembers(ONLINE_SET_KEY)?
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn entry(&self, player_id: PlayerId) -> Result<Option<PresenceEntry>, PresenceError> {
        Ok(self
            .cache
            .hgetall(&presence_key(player_id))?
            .and_then(|map| PresenceEntry::from_hash(player_id, &map)))
    }

    /// Whether the player is online again through a login at or after `at`.
    /// An offline notification stamped `at` is stale in that case.
    pub fn relogged_since(&self, player_id: PlayerId, at: i64) -> Result<bool, PresenceError> {
        Ok(matches!(
            self.entry(player_id)?,
            Some(entry) if entry.status == PresenceStatus::Online && entry.login_time >= at
        ))
    }

    /// Drop the presence hash and set membership entirely (last cleanup step).
    pub fn remove_entry(&self, player_id: PlayerId) -> Result<(), PresenceError> {
        self.cache.srem(ONLINE_SET_KEY, &player_id.to_string())?;
        self.cache.del(&presence_key(player_id))?;
        Ok(())
    }

    /// Scan the online set and time out every player whose last heartbeat is
    /// older than the heartbeat timeout. Returns the players timed out.
    ///
    /// A member whose hash already vanished (a racing cleanup or logout) is
    /// simply dropped from the set.
    pub fn sweep(&self) -> Result<Vec<PlayerId>, PresenceError> {
        let now = self.cache.now_millis();
        let timeout_ms = self.config.heartbeat_timeout.as_millis() as i64;
        let mut timed_out = Vec::new();

        for player_id in self.list_online()? {
            let entry = match self.entry(player_id)? {
                Some(entry) => entry,
                None => {
                    self.cache.srem(ONLINE_SET_KEY, &player_id.to_string())?;
                    tracing::debug!(player_id, "presence entry missing during sweep");
                    continue;
                }
            };

            let silent_for = now - entry.last_heartbeat;
            if silent_for > timeout_ms {
                // The entry may vanish between the read and here; never revive it.
                self.cache
                    .hset_existing(&presence_key(player_id), "status", PresenceStatus::Offline.as_str())?;
                if self.cache.srem(ONLINE_SET_KEY, &player_id.to_string())? {
                    tracing::info!(player_id, silent_ms = silent_for, "heartbeat timeout");
                    self.publish(player_id, OfflineReason::HeartbeatTimeout);
                    timed_out.push(player_id);
                }
            }
        }

        Ok(timed_out)
    }

    fn publish(&self, player_id: PlayerId, reason: OfflineReason) {
        if let Some(tx) = &self.offline_tx {
            let event = OfflineEvent {
                player_id,
                reason,
                at: self.cache.now_millis(),
            };
            if tx.send(event).is_err() {
                tracing::warn!(player_id, "offline channel closed, notification dropped");
            }
        }
    }
}
